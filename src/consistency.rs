use crate::extract::extract_structured;
use crate::models::MetricsRecord;
use serde_json::Value;
use std::collections::HashSet;

/// Metric key carried by every aggregated result
pub const CONSISTENCY_METRIC: &str = "consistency";

/// Fields whose values must agree across repeated runs
const CORE_FIELDS: [&str; 3] = ["name", "allergies", "preferred_food_categories"];

/// Bucket for responses that could not be parsed. Real keys are JSON arrays,
/// so this can never collide with one.
const ERROR_BUCKET: &str = "error";

/// Score how repeatable a set of responses to the same input is.
///
/// Each response is reduced to a bucket key built from its core fields; the
/// score is one over the number of distinct keys.
pub fn compute_consistency<S: AsRef<str>>(responses: &[S]) -> MetricsRecord {
    let score = match responses.len() {
        0 => 0.0,
        1 => 1.0,
        _ => {
            let buckets: HashSet<String> = responses
                .iter()
                .map(|response| bucket_key(response.as_ref()))
                .collect();
            1.0 / buckets.len() as f64
        }
    };

    let mut record = MetricsRecord::default();
    record.set(CONSISTENCY_METRIC, score);
    record
}

fn bucket_key(response: &str) -> String {
    match extract_structured(response) {
        Some(data) => {
            let core: Vec<Value> = CORE_FIELDS
                .iter()
                .map(|field| data.get(*field).cloned().unwrap_or(Value::Null))
                .collect();
            Value::Array(core).to_string()
        }
        None => ERROR_BUCKET.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consistency(responses: &[&str]) -> f64 {
        compute_consistency(responses).get("consistency").unwrap()
    }

    #[test]
    fn test_empty_is_zero() {
        let empty: [&str; 0] = [];
        assert_eq!(consistency(&empty), 0.0);
    }

    #[test]
    fn test_single_response_is_one() {
        assert_eq!(consistency(&["not even json"]), 1.0);
    }

    #[test]
    fn test_identical_core_fields() {
        let a = r#"{"name": "Kim", "allergies": ["게"], "preferred_food_categories": ["한식"], "description": "one"}"#;
        let b = r#"Sure: {"name": "Kim", "allergies": ["게"], "preferred_food_categories": ["한식"], "description": "two"}"#;
        assert_eq!(consistency(&[a, b]), 1.0);
    }

    #[test]
    fn test_differing_names_halve() {
        let a = r#"{"name": "Kim", "allergies": []}"#;
        let b = r#"{"name": "Lee", "allergies": []}"#;
        assert_eq!(consistency(&[a, b]), 0.5);
    }

    #[test]
    fn test_order_of_allergies_matters() {
        let a = r#"{"name": "Kim", "allergies": ["새우", "게"]}"#;
        let b = r#"{"name": "Kim", "allergies": ["게", "새우"]}"#;
        assert_eq!(consistency(&[a, b]), 0.5);
    }

    #[test]
    fn test_parse_failure_is_its_own_bucket() {
        let ok = r#"{"name": "Kim"}"#;
        assert_eq!(consistency(&[ok, ok, ""]), 0.5);
        assert_eq!(consistency(&["", "garbage"]), 1.0);
    }

    #[test]
    fn test_three_way_divergence() {
        let a = r#"{"name": "A"}"#;
        let b = r#"{"name": "B"}"#;
        let c = r#"{"name": "C"}"#;
        assert!((consistency(&[a, b, c]) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_object_joins_error_bucket() {
        assert_eq!(consistency(&["{}", "not json"]), 1.0);
        assert_eq!(consistency(&["{}", r#"{"name": "Kim"}"#]), 0.5);
    }
}
