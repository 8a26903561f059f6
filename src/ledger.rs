use crate::models::{CostLogEntry, ModelCostSummary};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Request volume used for the monthly cost projection
pub const MONTHLY_REQUEST_VOLUME: f64 = 10_000.0;

/// Append-only log of every backend call made during one session.
///
/// Workers append concurrently; readers get snapshots.
#[derive(Debug, Default)]
pub struct CostLedger {
    entries: Mutex<Vec<CostLogEntry>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: CostLogEntry) {
        self.lock().push(entry);
    }

    /// Snapshot of all entries in append order
    pub fn entries(&self) -> Vec<CostLogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn total_cost(&self) -> f64 {
        self.lock().iter().map(|entry| entry.cost_usd).sum()
    }

    /// Latency and cost figures per model, ordered by model identifier
    pub fn model_summaries(&self) -> Vec<ModelCostSummary> {
        let entries = self.lock();
        let mut by_model: BTreeMap<&str, Vec<&CostLogEntry>> = BTreeMap::new();
        for entry in entries.iter() {
            by_model
                .entry(entry.model_identifier.as_str())
                .or_default()
                .push(entry);
        }

        by_model
            .into_iter()
            .map(|(model, rows)| summarize_model(model, &rows))
            .collect()
    }

    // A panicking writer cannot leave a half-pushed entry behind, so the
    // data is still valid after poisoning.
    fn lock(&self) -> MutexGuard<'_, Vec<CostLogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn summarize_model(model: &str, rows: &[&CostLogEntry]) -> ModelCostSummary {
    let requests = rows.len();
    let count = requests.max(1) as f64;
    let avg_latency_ms = rows.iter().map(|r| r.latency_ms).sum::<f64>() / count;
    let avg_cost_per_request = rows.iter().map(|r| r.cost_usd).sum::<f64>() / count;
    let total_input_tokens: u64 = rows.iter().map(|r| r.input_token_count).sum();
    let total_output_tokens: u64 = rows.iter().map(|r| r.output_token_count).sum();

    let io_token_ratio = if total_output_tokens > 0 {
        Some(total_input_tokens as f64 / total_output_tokens as f64)
    } else {
        None
    };

    ModelCostSummary {
        model_identifier: model.to_string(),
        requests,
        failures: rows.iter().filter(|r| !r.success).count(),
        avg_latency_ms,
        avg_cost_per_request,
        monthly_projection_usd: avg_cost_per_request * MONTHLY_REQUEST_VOLUME,
        total_input_tokens,
        total_output_tokens,
        io_token_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskKind;
    use std::sync::Arc;

    fn entry(model: &str, input: u64, output: u64, latency_ms: f64, cost: f64, success: bool) -> CostLogEntry {
        CostLogEntry {
            model_identifier: model.to_string(),
            task_kind: TaskKind::PersonaGeneration,
            input_token_count: input,
            output_token_count: output,
            latency_ms,
            cost_usd: cost,
            resource_memory_mb: 0.0,
            success,
            error: if success { None } else { Some("timeout".to_string()) },
        }
    }

    #[test]
    fn test_empty_ledger() {
        let ledger = CostLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.total_cost(), 0.0);
        assert!(ledger.model_summaries().is_empty());
    }

    #[test]
    fn test_total_cost_sums_entries() {
        let ledger = CostLedger::new();
        ledger.record(entry("gpt-4o-mini", 100, 50, 300.0, 0.002, true));
        ledger.record(entry("gpt-4o-mini", 100, 50, 500.0, 0.003, true));
        ledger.record(entry("gemma-2-9b", 80, 40, 900.0, 0.0, true));

        assert_eq!(ledger.len(), 3);
        assert!((ledger.total_cost() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_model_summaries() {
        let ledger = CostLedger::new();
        ledger.record(entry("gpt-4o-mini", 300, 100, 200.0, 0.002, true));
        ledger.record(entry("gpt-4o-mini", 0, 0, 400.0, 0.0, false));
        ledger.record(entry("gemma-2-9b", 0, 0, 50.0, 0.0, false));

        let summaries = ledger.model_summaries();
        assert_eq!(summaries.len(), 2);

        let gemma = &summaries[0];
        assert_eq!(gemma.model_identifier, "gemma-2-9b");
        assert_eq!(gemma.failures, 1);
        assert!(gemma.io_token_ratio.is_none());

        let gpt = &summaries[1];
        assert_eq!(gpt.requests, 2);
        assert_eq!(gpt.failures, 1);
        assert!((gpt.avg_latency_ms - 300.0).abs() < 1e-9);
        assert!((gpt.avg_cost_per_request - 0.001).abs() < 1e-12);
        assert!((gpt.monthly_projection_usd - 10.0).abs() < 1e-9);
        assert_eq!(gpt.io_token_ratio, Some(3.0));
    }

    #[test]
    fn test_concurrent_appends() {
        let ledger = Arc::new(CostLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        ledger.record(entry("gpt-4o-mini", 1, 1, 1.0, 0.001, true));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 200);
        assert!((ledger.total_cost() - 0.2).abs() < 1e-9);
    }
}
