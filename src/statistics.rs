use crate::consistency::CONSISTENCY_METRIC;
use crate::models::{EvaluationResult, ModelTaskSummary, Statistics, TaskKind};
use std::collections::{BTreeMap, HashMap};

/// Group results by (model, task kind) and summarize each group
pub fn summarize(results: &[EvaluationResult]) -> Vec<ModelTaskSummary> {
    let mut groups: BTreeMap<(&str, TaskKind), Vec<&EvaluationResult>> = BTreeMap::new();
    for result in results {
        groups
            .entry((result.model_identifier.as_str(), result.task_kind))
            .or_default()
            .push(result);
    }

    groups
        .into_iter()
        .map(|((model, task_kind), group)| {
            let statistics = calculate_statistics(&group, &summary_metrics(task_kind));
            let successes = group.iter().filter(|r| r.success).count();
            let parsing_error_rate = statistics.mean.get("json_validity").map(|validity| 1.0 - validity);

            ModelTaskSummary {
                model_identifier: model.to_string(),
                task_kind,
                pairs: group.len(),
                success_rate: successes as f64 / group.len() as f64,
                statistics,
                parsing_error_rate,
            }
        })
        .collect()
}

fn summary_metrics(task_kind: TaskKind) -> Vec<&'static str> {
    let mut names = task_kind.metric_names().to_vec();
    names.push(CONSISTENCY_METRIC);
    names
}

/// Mean, median, and mode per metric. Metrics nobody reported are zeroed.
pub fn calculate_statistics(results: &[&EvaluationResult], metrics: &[&str]) -> Statistics {
    let mut mean = HashMap::new();
    let mut median = HashMap::new();
    let mut mode = HashMap::new();

    for metric in metrics {
        let scores = collect_metric_scores(results, metric);

        if scores.is_empty() {
            insert_zero_stats(metric, &mut mean, &mut median, &mut mode);
            continue;
        }

        mean.insert(metric.to_string(), calculate_mean(&scores));
        median.insert(metric.to_string(), calculate_median(&scores));
        mode.insert(metric.to_string(), calculate_mode(&scores));
    }

    Statistics { mean, median, mode }
}

fn collect_metric_scores(results: &[&EvaluationResult], metric: &str) -> Vec<f64> {
    results
        .iter()
        .filter_map(|result| result.metrics.get(metric))
        .collect()
}

fn insert_zero_stats(
    metric: &str,
    mean: &mut HashMap<String, f64>,
    median: &mut HashMap<String, f64>,
    mode: &mut HashMap<String, f64>,
) {
    mean.insert(metric.to_string(), 0.0);
    median.insert(metric.to_string(), 0.0);
    mode.insert(metric.to_string(), 0.0);
}

pub fn calculate_mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: f64 = scores.iter().sum();
    sum / scores.len() as f64
}

pub fn calculate_median(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted_scores = scores.to_vec();
    sorted_scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted_scores.len() / 2;
    if sorted_scores.len() % 2 == 0 {
        (sorted_scores[mid - 1] + sorted_scores[mid]) / 2.0
    } else {
        sorted_scores[mid]
    }
}

/// Most frequent score after rounding to one decimal. Ties go to the lower value.
pub fn calculate_mode(scores: &[f64]) -> f64 {
    let mut frequency: BTreeMap<i64, usize> = BTreeMap::new();

    for &score in scores {
        *frequency.entry((score * 10.0).round() as i64).or_insert(0) += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for (tenths, count) in frequency {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((tenths, count));
        }
    }

    best.map(|(tenths, _)| tenths as f64 / 10.0).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricsRecord;

    fn result(model: &str, task_kind: TaskKind, metrics: &[(&str, f64)], success: bool) -> EvaluationResult {
        let mut record = MetricsRecord::default();
        for (name, value) in metrics {
            record.set(name, *value);
        }
        EvaluationResult {
            task_kind,
            case_id: "case".to_string(),
            model_identifier: model.to_string(),
            response_text: String::new(),
            metrics: record,
            success,
            error: None,
            run_count: 3,
        }
    }

    #[test]
    fn test_calculate_statistics() {
        let results = [
            result("m", TaskKind::PersonaRating, &[("rating_validity", 0.8)], true),
            result("m", TaskKind::PersonaRating, &[("rating_validity", 0.6)], true),
            result("m", TaskKind::PersonaRating, &[("rating_validity", 0.8)], true),
        ];
        let refs: Vec<&EvaluationResult> = results.iter().collect();
        let stats = calculate_statistics(&refs, &["rating_validity", "allergy_safety"]);

        assert!((stats.mean["rating_validity"] - 0.7333).abs() < 0.001);
        assert_eq!(stats.median["rating_validity"], 0.8);
        assert_eq!(stats.mode["rating_validity"], 0.8);
        // Metric nobody reported
        assert_eq!(stats.mean["allergy_safety"], 0.0);
        assert_eq!(stats.mode["allergy_safety"], 0.0);
    }

    #[test]
    fn test_calculate_mode_rounding() {
        assert_eq!(calculate_mode(&[0.75]), 0.8);
        assert_eq!(calculate_mode(&[0.3, 0.7, 0.3]), 0.3);
        assert_eq!(calculate_mode(&[0.9, 0.2]), 0.2);
        assert_eq!(calculate_mode(&[]), 0.0);
    }

    #[test]
    fn test_calculate_median_even() {
        assert!((calculate_median(&[0.6, 0.7, 0.8, 0.9]) - 0.75).abs() < 1e-9);
        assert_eq!(calculate_median(&[]), 0.0);
    }

    #[test]
    fn test_summarize_groups_by_model_and_task() {
        let results = vec![
            result("gpt-4o-mini", TaskKind::PersonaGeneration, &[("json_validity", 1.0), ("consistency", 1.0)], true),
            result("gpt-4o-mini", TaskKind::PersonaGeneration, &[("json_validity", 0.0), ("consistency", 0.5)], false),
            result("gpt-4o-mini", TaskKind::MenuRecommendation, &[("coverage", 1.0)], true),
            result("qwen2.5-14b", TaskKind::PersonaGeneration, &[("json_validity", 1.0)], true),
        ];

        let summaries = summarize(&results);
        assert_eq!(summaries.len(), 3);

        let first = &summaries[0];
        assert_eq!(first.model_identifier, "gpt-4o-mini");
        assert_eq!(first.task_kind, TaskKind::PersonaGeneration);
        assert_eq!(first.pairs, 2);
        assert_eq!(first.success_rate, 0.5);
        assert_eq!(first.parsing_error_rate, Some(0.5));
        assert_eq!(first.statistics.mean["consistency"], 0.75);

        let menu = &summaries[1];
        assert_eq!(menu.task_kind, TaskKind::MenuRecommendation);
        assert_eq!(menu.parsing_error_rate, None);
        assert_eq!(menu.statistics.mean.len(), TaskKind::MenuRecommendation.metric_names().len() + 1);

        assert_eq!(summaries[2].model_identifier, "qwen2.5-14b");
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(&[]).is_empty());
    }
}
