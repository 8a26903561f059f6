use crate::backend::Backend;
use crate::config::Config;
use crate::consistency::{CONSISTENCY_METRIC, compute_consistency};
use crate::evaluation::score_response;
use crate::ledger::CostLedger;
use crate::models::{
    CostLogEntry, EvaluationCase, EvaluationResult, GenerationOptions, GenerationResult, MetricsRecord,
};
use crate::prompts::{SystemPrompts, build_user_prompt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Knobs that shape one evaluation session
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Sequential repetitions per (model, case) pair
    pub n_runs: usize,
    /// Pairs allowed in flight at once
    pub max_workers: usize,
    pub options: GenerationOptions,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            n_runs: config.n_runs,
            max_workers: config.max_workers,
            options: config.generation_options(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            n_runs: 3,
            max_workers: 5,
            options: GenerationOptions::default(),
        }
    }
}

/// Main runner that fans (model, case) pairs out over a bounded worker pool
pub struct Runner {
    backends: Vec<Arc<dyn Backend>>,
    cases: Vec<Arc<EvaluationCase>>,
    prompts: Arc<SystemPrompts>,
    ledger: Arc<CostLedger>,
    settings: RunSettings,
}

impl Runner {
    pub fn new(
        backends: Vec<Arc<dyn Backend>>,
        cases: Vec<EvaluationCase>,
        prompts: SystemPrompts,
        ledger: Arc<CostLedger>,
        settings: RunSettings,
    ) -> Self {
        Self {
            backends,
            cases: cases.into_iter().map(Arc::new).collect(),
            prompts: Arc::new(prompts),
            ledger,
            settings,
        }
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    /// Evaluate every pair and return one result per pair, in completion order
    pub async fn run_evaluations(&self) -> Vec<EvaluationResult> {
        let total_pairs = self.backends.len() * self.cases.len();
        info!(
            models = self.backends.len(),
            cases = self.cases.len(),
            n_runs = self.settings.n_runs,
            max_workers = self.settings.max_workers,
            "Starting evaluation"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.max_workers));
        let mut join_set = JoinSet::new();

        for backend in &self.backends {
            for case in &self.cases {
                let pair = PairJob {
                    backend: Arc::clone(backend),
                    case: Arc::clone(case),
                    prompts: Arc::clone(&self.prompts),
                    ledger: Arc::clone(&self.ledger),
                    options: self.settings.options,
                    n_runs: self.settings.n_runs,
                };
                let sem = Arc::clone(&semaphore);

                join_set.spawn(async move {
                    // The permit is held for the pair's whole run sequence
                    let _permit = sem.acquire_owned().await.ok();
                    pair.run_guarded().await
                });
            }
        }

        let mut results = Vec::with_capacity(total_pairs);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    info!(
                        model = %result.model_identifier,
                        case = %result.case_id,
                        success = result.success,
                        "Completed pair {}/{}",
                        results.len() + 1,
                        total_pairs
                    );
                    results.push(result);
                }
                Err(e) => error!(error = %e, "Pair task did not complete"),
            }
        }

        info!(pairs = results.len(), calls = self.ledger.len(), "Evaluation session finished");
        results
    }
}

/// Everything one worker needs for its (model, case) pair
struct PairJob {
    backend: Arc<dyn Backend>,
    case: Arc<EvaluationCase>,
    prompts: Arc<SystemPrompts>,
    ledger: Arc<CostLedger>,
    options: GenerationOptions,
    n_runs: usize,
}

impl PairJob {
    /// Run the pair, turning a panic anywhere inside it into a failed result
    async fn run_guarded(self) -> EvaluationResult {
        match AssertUnwindSafe(self.run()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    model = %self.backend.model_name(),
                    case = %self.case.id,
                    panic = %message,
                    "Pair evaluation panicked"
                );
                self.panicked(message)
            }
        }
    }

    async fn run(&self) -> EvaluationResult {
        let model = self.backend.model_name();
        let system_prompt = self.prompts.for_task(self.case.task_kind);
        let user_prompt = build_user_prompt(&self.case);

        let mut runs = Vec::with_capacity(self.n_runs);
        for run_index in 0..self.n_runs {
            debug!(model = %model, case = %self.case.id, run = run_index, "Generating response");
            let generation = self
                .backend
                .generate(system_prompt, &user_prompt, &self.options)
                .await;

            self.ledger
                .record(CostLogEntry::from_generation(&generation, self.case.task_kind));

            if let Some(err) = &generation.error {
                warn!(model = %model, case = %self.case.id, run = run_index, error = %err, "Generation failed");
            }
            runs.push(generation);
        }

        aggregate_runs(&self.case, model, runs)
    }

    fn panicked(&self, message: String) -> EvaluationResult {
        let mut metrics = MetricsRecord::zeroed(self.case.task_kind);
        metrics.set(CONSISTENCY_METRIC, 0.0);
        EvaluationResult {
            task_kind: self.case.task_kind,
            case_id: self.case.id.clone(),
            model_identifier: self.backend.model_name().to_string(),
            response_text: String::new(),
            metrics,
            success: false,
            error: Some(format!("pair evaluation panicked: {}", message)),
            run_count: self.n_runs,
        }
    }
}

/// Fold N runs into one result: the first clean run is representative and
/// consistency is measured over every run, failed ones included.
pub fn aggregate_runs(case: &EvaluationCase, model: &str, runs: Vec<GenerationResult>) -> EvaluationResult {
    let contents: Vec<&str> = runs.iter().map(|run| run.content.as_str()).collect();
    let consistency = compute_consistency(&contents);
    let run_count = runs.len();

    let (mut metrics, response_text, success, error) = match runs.iter().find(|run| !run.is_error()) {
        Some(representative) => (
            score_response(case, &representative.content),
            representative.content.clone(),
            true,
            None,
        ),
        None => (
            MetricsRecord::zeroed(case.task_kind),
            String::new(),
            false,
            runs.first().and_then(|run| run.error.clone()),
        ),
    };
    metrics.merge(consistency);

    EvaluationResult {
        task_kind: case.task_kind,
        case_id: case.id.clone(),
        model_identifier: model.to_string(),
        response_text,
        metrics,
        success,
        error,
        run_count,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
