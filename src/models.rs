use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Task kinds exercised by the benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum TaskKind {
    PersonaGeneration,
    PersonaRating,
    MenuRecommendation,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::PersonaGeneration,
        TaskKind::PersonaRating,
        TaskKind::MenuRecommendation,
    ];

    /// Metric keys always present in a record of this kind
    pub fn metric_names(self) -> &'static [&'static str] {
        match self {
            TaskKind::PersonaGeneration => &[
                "json_validity",
                "field_completeness",
                "value_accuracy",
                "schema_compliance",
                "cot_depth_score",
                "persona_specificity",
                "safety_consistency",
            ],
            TaskKind::PersonaRating => &[
                "rating_validity",
                "rating_appropriateness",
                "allergy_safety",
                "reasoning_quality",
            ],
            TaskKind::MenuRecommendation => &[
                "coverage",
                "practicality",
                "explanation_quality",
                "safety",
                "diversity",
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::PersonaGeneration => "persona_generation",
            TaskKind::PersonaRating => "persona_rating",
            TaskKind::MenuRecommendation => "menu_recommendation",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling options passed to every backend call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: 1000,
        }
    }
}

/// Outcome of a single backend call. `error` is set iff the call failed,
/// in which case `content` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub model_identifier: String,
    pub input_token_count: u64,
    pub output_token_count: u64,
    pub latency_ms: f64,
    pub cost_usd: f64,
    pub resource_memory_mb: f64,
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn failure(model_identifier: &str, error: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            content: String::new(),
            model_identifier: model_identifier.to_string(),
            input_token_count: 0,
            output_token_count: 0,
            latency_ms,
            cost_usd: 0.0,
            resource_memory_mb: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One fixed input scenario, shared read-only across every model and run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCase {
    pub id: String,
    pub task_kind: TaskKind,
    /// Difficulty for persona generation, expected polarity for rating
    pub tag: String,
    pub payload: serde_json::Value,
}

/// Metric name to score, scoped to one task kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsRecord(BTreeMap<String, f64>);

impl MetricsRecord {
    /// Every metric defined for `kind`, set to 0.0
    pub fn zeroed(kind: TaskKind) -> Self {
        Self(
            kind.metric_names()
                .iter()
                .map(|name| (name.to_string(), 0.0))
                .collect(),
        )
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn merge(&mut self, other: MetricsRecord) {
        self.0.extend(other.0);
    }
}

/// Aggregated result for one (model, case) pair over all of its runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub task_kind: TaskKind,
    pub case_id: String,
    pub model_identifier: String,
    pub response_text: String,
    pub metrics: MetricsRecord,
    pub success: bool,
    pub error: Option<String>,
    pub run_count: usize,
}

/// Ledger row, one per backend call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLogEntry {
    pub model_identifier: String,
    pub task_kind: TaskKind,
    pub input_token_count: u64,
    pub output_token_count: u64,
    pub latency_ms: f64,
    pub cost_usd: f64,
    pub resource_memory_mb: f64,
    pub success: bool,
    pub error: Option<String>,
}

impl CostLogEntry {
    pub fn from_generation(result: &GenerationResult, task_kind: TaskKind) -> Self {
        Self {
            model_identifier: result.model_identifier.clone(),
            task_kind,
            input_token_count: result.input_token_count,
            output_token_count: result.output_token_count,
            latency_ms: result.latency_ms,
            cost_usd: result.cost_usd,
            resource_memory_mb: result.resource_memory_mb,
            success: result.error.is_none(),
            error: result.error.clone(),
        }
    }
}

/// Statistics calculated across multiple results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Mean scores for each metric
    pub mean: HashMap<String, f64>,
    /// Median scores for each metric
    pub median: HashMap<String, f64>,
    /// Mode scores for each metric (most frequent score)
    pub mode: HashMap<String, f64>,
}

/// Quality statistics for one model on one task kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTaskSummary {
    pub model_identifier: String,
    pub task_kind: TaskKind,
    pub pairs: usize,
    pub success_rate: f64,
    pub statistics: Statistics,
    /// `1 - mean(json_validity)` for tasks that score JSON validity
    pub parsing_error_rate: Option<f64>,
}

/// Latency and cost figures for one model, derived from the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCostSummary {
    pub model_identifier: String,
    pub requests: usize,
    pub failures: usize,
    pub avg_latency_ms: f64,
    pub avg_cost_per_request: f64,
    pub monthly_projection_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Input tokens per output token; `None` when nothing was generated
    pub io_token_ratio: Option<f64>,
}

/// Everything a report consumer needs from one evaluation session
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalReport {
    pub generated_at: String,
    pub summaries: Vec<ModelTaskSummary>,
    pub costs: Vec<ModelCostSummary>,
    pub total_cost_usd: f64,
    pub results: Vec<EvaluationResult>,
}
