use crate::extract::extract_structured;
use crate::models::{EvaluationCase, MetricsRecord, TaskKind};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const PERSONA_REQUIRED_FIELDS: [&str; 8] = [
    "reasoning",
    "name",
    "gender",
    "age_group",
    "allergies",
    "preferred_food_categories",
    "preferred_ingredients",
    "description",
];

const LIFESTYLE_KEYWORDS: [&str; 12] = [
    "퇴근", "주말", "스트레스", "혼밥", "데이트", "회식", "다이어트", "건강", "가성비", "분위기",
    "조용한", "시끄러운",
];

const LOGIC_CONNECTORS: [&str; 9] = [
    "때문에", "위해", "하므로", "따라서", "추론", "생각", "고려", "based on", "implies",
];

const ALLERGY_WARNING_TERMS: [&str; 9] = [
    "allergy", "allergic", "allergen", "unsafe", "danger", "알러지", "알레르기", "위험", "안전하지",
];

const REASONING_KEYWORDS: [&str; 11] = [
    "because", "since", "therefore", "preference", "budget", "때문", "취향", "선호", "예산",
    "고려", "따라서",
];

const GROUP_KEYWORDS: [&str; 8] = [
    "group", "budget", "balance", "그룹", "단체", "예산", "균형", "인원",
];

const MITIGATION_TERMS: [&str; 8] = [
    "allergy", "safe", "exclude", "remove", "알러지", "알레르기", "안전", "제외",
];

/// Budget overrun tolerated before a menu counts as impractical
const BUDGET_TOLERANCE: f64 = 1.10;

/// Placeholder until menu diversity is derived from the items themselves
const DIVERSITY_PLACEHOLDER: f64 = 0.5;

/// Expected direction of a persona rating case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
    Critical,
}

impl Polarity {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "positive" => Some(Polarity::Positive),
            "negative" => Some(Polarity::Negative),
            "critical" => Some(Polarity::Critical),
            _ => None,
        }
    }

    fn accepts(self, score: f64) -> bool {
        match self {
            Polarity::Positive => score >= 7.0,
            Polarity::Negative => score <= 5.0,
            Polarity::Critical => score <= 3.0,
        }
    }
}

/// Score a raw response against the rubric of the case's task kind
pub fn score_response(case: &EvaluationCase, response_text: &str) -> MetricsRecord {
    let extracted = extract_structured(response_text);
    match case.task_kind {
        TaskKind::PersonaGeneration => score_persona_generation(&case.payload, extracted.as_ref()),
        TaskKind::PersonaRating => score_persona_rating(case, extracted.as_ref()),
        TaskKind::MenuRecommendation => score_menu_recommendation(&case.payload, extracted.as_ref()),
    }
}

/// Persona synthesis rubric; `input` is the user profile the persona was built from
pub fn score_persona_generation(input: &Value, output: Option<&Map<String, Value>>) -> MetricsRecord {
    let mut metrics = MetricsRecord::zeroed(TaskKind::PersonaGeneration);
    let Some(data) = output else {
        return metrics;
    };

    metrics.set("json_validity", 1.0);

    let present = PERSONA_REQUIRED_FIELDS
        .iter()
        .filter(|field| data.contains_key(**field))
        .count();
    let completeness = present as f64 / PERSONA_REQUIRED_FIELDS.len() as f64;
    metrics.set("field_completeness", completeness);

    let allergies_typed = data.get("allergies").is_none_or(Value::is_array);
    let compliant = allergies_typed && completeness == 1.0;
    metrics.set("schema_compliance", if compliant { 1.0 } else { 0.0 });

    if input.get("name") == data.get("name") {
        metrics.set("value_accuracy", 1.0);
    }

    metrics.set("safety_consistency", safety_consistency(input, data));
    metrics.set("persona_specificity", persona_specificity(text_field(data, "description")));
    metrics.set("cot_depth_score", cot_depth(text_field(data, "reasoning")));

    metrics
}

/// 1.0 when every declared allergen survives, 0.5 when the persona then
/// prefers something it is allergic to, 0.0 when any allergen was dropped
fn safety_consistency(input: &Value, data: &Map<String, Value>) -> f64 {
    let declared = string_set(input.get("allergies"));
    let produced = string_set(data.get("allergies"));

    if !declared.is_subset(&produced) {
        return 0.0;
    }

    let preferences = string_list(data.get("preferred_food_categories"))
        .into_iter()
        .chain(string_list(data.get("preferred_ingredients")))
        .collect::<Vec<_>>()
        .join(" ");
    let contradicted = produced
        .iter()
        .any(|allergen| !allergen.is_empty() && preferences.contains(allergen.as_str()));

    if contradicted { 0.5 } else { 1.0 }
}

fn persona_specificity(description: &str) -> f64 {
    let mut score = 0.0;
    if description.len() > 30 {
        score += 0.4;
    }
    let matched = LIFESTYLE_KEYWORDS
        .iter()
        .filter(|keyword| description.contains(**keyword))
        .count();
    score += (matched as f64 * 0.2).min(0.6);

    score.min(1.0)
}

fn cot_depth(reasoning: &str) -> f64 {
    let mut score = 0.0;
    if reasoning.len() > 50 {
        score += 0.3;
    }
    if contains_any(reasoning, &LOGIC_CONNECTORS) {
        score += 0.4;
    }
    if reasoning.len() > 100 {
        score += 0.3;
    }

    f64::min(1.0, score)
}

/// Persona/restaurant fit rubric; the case tag carries the expected polarity
pub fn score_persona_rating(case: &EvaluationCase, output: Option<&Map<String, Value>>) -> MetricsRecord {
    let mut metrics = MetricsRecord::zeroed(TaskKind::PersonaRating);
    let polarity = Polarity::from_tag(&case.tag);
    let critical = polarity == Some(Polarity::Critical);

    let Some(data) = output else {
        metrics.set("allergy_safety", if critical { 0.0 } else { 1.0 });
        return metrics;
    };

    let score = data.get("score").and_then(Value::as_f64);
    let reason = text_field(data, "reason");

    if score.is_some_and(|s| (0.0..=10.0).contains(&s)) {
        metrics.set("rating_validity", 1.0);
    }

    if let (Some(polarity), Some(score)) = (polarity, score) {
        if polarity.accepts(score) {
            metrics.set("rating_appropriateness", 1.0);
        }
    }

    let allergy_safety = if critical {
        let flagged = contains_any(reason, &ALLERGY_WARNING_TERMS);
        if flagged || score.is_some_and(|s| s < 2.0) { 1.0 } else { 0.0 }
    } else {
        1.0
    };
    metrics.set("allergy_safety", allergy_safety);

    metrics.set("reasoning_quality", explanation_score(reason, 20, &REASONING_KEYWORDS));

    metrics
}

/// Group menu rubric; `payload` holds the group, restaurant and event
pub fn score_menu_recommendation(payload: &Value, output: Option<&Map<String, Value>>) -> MetricsRecord {
    let mut metrics = MetricsRecord::zeroed(TaskKind::MenuRecommendation);
    let at_risk = allergen_overlap(payload);

    let Some(data) = output else {
        metrics.set("safety", menu_safety(at_risk, ""));
        return metrics;
    };

    let has_items = data
        .get("menu_items")
        .and_then(Value::as_array)
        .is_some_and(|items| !items.is_empty());
    if has_items {
        metrics.set("coverage", 1.0);
    }

    let budget = group_budget(payload);
    let price = data.get("total_price_estimate").and_then(Value::as_f64);
    if price.is_some_and(|p| p > 0.0 && p <= budget * BUDGET_TOLERANCE) {
        metrics.set("practicality", 1.0);
    }

    let explanation = text_field(data, "explanation");
    metrics.set("explanation_quality", explanation_score(explanation, 30, &GROUP_KEYWORDS));
    metrics.set("safety", menu_safety(at_risk, explanation));
    metrics.set("diversity", DIVERSITY_PLACEHOLDER);

    metrics
}

/// True when the restaurant declares an allergen some member is allergic to
fn allergen_overlap(payload: &Value) -> bool {
    let declared = string_set(payload.pointer("/restaurant/allergens"));
    let members = payload
        .pointer("/group/members")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    members
        .iter()
        .flat_map(|member| string_set(member.get("allergies")))
        .any(|allergy| declared.contains(&allergy))
}

fn menu_safety(at_risk: bool, explanation: &str) -> f64 {
    if !at_risk || contains_any(explanation, &MITIGATION_TERMS) {
        1.0
    } else {
        0.5
    }
}

/// Per-person budget times head count
fn group_budget(payload: &Value) -> f64 {
    let per_person = payload
        .pointer("/group/budget_per_person")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let members = payload
        .pointer("/group/members")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);

    per_person * members as f64
}

/// 0.0 when too short, 1.0 with a keyword hit, 0.5 otherwise
fn explanation_score(text: &str, min_len: usize, keywords: &[&str]) -> f64 {
    if text.len() <= min_len {
        0.0
    } else if contains_any(text, keywords) {
        1.0
    } else {
        0.5
    }
}

fn text_field<'a>(data: &'a Map<String, Value>, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Array items as strings; non-arrays yield nothing
fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    string_list(value).into_iter().collect()
}

/// Case-insensitive substring match against any keyword
fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    keywords.iter().any(|keyword| lowered.contains(keyword))
}
