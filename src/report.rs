use crate::ledger::CostLedger;
use crate::models::{CostLogEntry, EvaluationResult, FinalReport, ModelCostSummary};
use crate::output::format_io_ratio;
use crate::pricing::PricingTable;
use crate::statistics::{calculate_mean, summarize};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

const STRUCTURAL_METRICS: [&str; 4] = ["json_validity", "field_completeness", "schema_compliance", "value_accuracy"];
const PERSONA_QUALITY_METRICS: [&str; 3] = ["cot_depth_score", "persona_specificity", "safety_consistency"];

/// Timestamp format shared by every artifact of one session
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Files written for one session
#[derive(Debug)]
pub struct ReportPaths {
    pub raw_results: PathBuf,
    pub cost_log: PathBuf,
    pub report: PathBuf,
}

pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Combine the result collection with the ledger into one report
pub fn assemble(results: Vec<EvaluationResult>, ledger: &CostLedger, generated_at: String) -> FinalReport {
    FinalReport {
        generated_at,
        summaries: summarize(&results),
        costs: ledger.model_summaries(),
        total_cost_usd: ledger.total_cost(),
        results,
    }
}

/// Persist raw results, the cost log and the Markdown report under `dir`
pub fn store_report(
    report: &FinalReport,
    cost_log: &[CostLogEntry],
    pricing: &PricingTable,
    dir: &Path,
) -> Result<ReportPaths> {
    ensure_directory_exists(dir)?;
    let stamp = &report.generated_at;

    let paths = ReportPaths {
        raw_results: dir.join(format!("raw_results_{}.json", stamp)),
        cost_log: dir.join(format!("cost_log_{}.json", stamp)),
        report: dir.join(format!("report_{}.md", stamp)),
    };

    write_json(&paths.raw_results, &report.results)?;
    write_json(&paths.cost_log, cost_log)?;
    std::fs::write(&paths.report, render_markdown(report, pricing))
        .with_context(|| format!("Failed to write report to: {}", paths.report.display()))?;

    tracing::info!(
        raw_results = %paths.raw_results.display(),
        cost_log = %paths.cost_log.display(),
        report = %paths.report.display(),
        "Reports stored"
    );
    Ok(paths)
}

fn ensure_directory_exists(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("Failed to serialize results to JSON")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write results to: {}", path.display()))
}

/// Markdown report: structural health, persona quality, consistency, latency and cost
pub fn render_markdown(report: &FinalReport, pricing: &PricingTable) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Restaurant LLM Evaluation Report\n");
    let _ = writeln!(md, "**Generated**: {}\n", report.generated_at);

    let _ = writeln!(md, "## Quality Metrics\n");

    let _ = writeln!(md, "### Structural Health\n");
    let _ = writeln!(md, "- **Parsing Error Rate**: share of responses with no extractable JSON (lower is better)");
    let _ = writeln!(md, "- **Field Completeness**: required persona fields present (1.0 = all)");
    let _ = writeln!(md, "- **Schema Compliance**: list and text fields have the right types (1.0 = compliant)\n");
    let mut structural = metric_table(&report.results, &STRUCTURAL_METRICS);
    if !structural.rows.is_empty() {
        structural.headers.push("parsing_error_rate".to_string());
        for row in structural.rows.values_mut() {
            let error_rate = row[0].map(|validity| 1.0 - validity);
            row.push(error_rate);
        }
    }
    structural.write(&mut md, 4);

    let _ = writeln!(md, "### Persona Quality\n");
    let _ = writeln!(md, "- **CoT Depth Score**: depth of the reasoning behind inferred preferences (0.0 to 1.0)");
    let _ = writeln!(md, "- **Persona Specificity**: concrete lifestyle context in the description (0.0 to 1.0)");
    let _ = writeln!(md, "- **Safety Consistency**: declared allergies kept and never preferred (1.0 = safe)\n");
    metric_table(&report.results, &PERSONA_QUALITY_METRICS).write(&mut md, 4);

    let _ = writeln!(md, "### Consistency\n");
    let _ = writeln!(md, "- **Consistency**: core persona fields agree across repeated runs (1.0 = identical)\n");
    metric_table(&report.results, &["consistency"]).write(&mut md, 4);

    let _ = writeln!(md, "## Practical Constraints\n");
    if report.costs.is_empty() {
        let _ = writeln!(md, "No cost data.\n");
        return md;
    }

    let _ = writeln!(md, "### Latency\n");
    let _ = writeln!(md, "| model | avg_latency_ms |");
    let _ = writeln!(md, "|---|---|");
    for cost in &report.costs {
        let _ = writeln!(md, "| {} | {:.2} |", cost.model_identifier, cost.avg_latency_ms);
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "### Cost\n");
    let _ = writeln!(
        md,
        "| model | avg_cost_per_req | monthly_projection(10k) | token_price_1M | io_token_ratio_input_output |"
    );
    let _ = writeln!(md, "|---|---|---|---|---|");
    for cost in &report.costs {
        write_cost_row(&mut md, cost, pricing);
    }
    let _ = writeln!(md, "\n**Total cost**: ${:.6}", report.total_cost_usd);

    md
}

fn write_cost_row(md: &mut String, cost: &ModelCostSummary, pricing: &PricingTable) {
    let price = match pricing.get(&cost.model_identifier) {
        Some(price) => format!("In:${}/Out:${}", price.input, price.output),
        None => "N/A".to_string(),
    };
    let _ = writeln!(
        md,
        "| {} | {:.6} | {:.6} | {} | {} |",
        cost.model_identifier,
        cost.avg_cost_per_request,
        cost.monthly_projection_usd,
        price,
        format_io_ratio(cost.io_token_ratio)
    );
}

/// Per-model means; a cell is empty when no result of that model carries the metric
struct MetricTable {
    headers: Vec<String>,
    rows: BTreeMap<String, Vec<Option<f64>>>,
}

impl MetricTable {
    fn write(&self, md: &mut String, precision: usize) {
        if self.rows.is_empty() {
            let _ = writeln!(md, "No data.\n");
            return;
        }

        let _ = writeln!(md, "| model | {} |", self.headers.join(" | "));
        let _ = writeln!(md, "|---|{}", "---|".repeat(self.headers.len()));
        for (model, cells) in &self.rows {
            let cells: Vec<String> = cells
                .iter()
                .map(|cell| match cell {
                    Some(value) => format!("{:.*}", precision, value),
                    None => String::new(),
                })
                .collect();
            let _ = writeln!(md, "| {} | {} |", model, cells.join(" | "));
        }
        let _ = writeln!(md);
    }
}

fn metric_table(results: &[EvaluationResult], metrics: &[&str]) -> MetricTable {
    let mut by_model: BTreeMap<&str, Vec<&EvaluationResult>> = BTreeMap::new();
    for result in results {
        by_model.entry(result.model_identifier.as_str()).or_default().push(result);
    }

    let mut rows = BTreeMap::new();
    for (model, group) in by_model {
        let cells: Vec<Option<f64>> = metrics
            .iter()
            .map(|metric| {
                let scores: Vec<f64> = group.iter().filter_map(|r| r.metrics.get(metric)).collect();
                (!scores.is_empty()).then(|| calculate_mean(&scores))
            })
            .collect();
        // Models that never ran a task with these metrics get no row
        if cells.iter().any(Option::is_some) {
            rows.insert(model.to_string(), cells);
        }
    }

    MetricTable {
        headers: metrics.iter().map(|m| m.to_string()).collect(),
        rows,
    }
}
