use crate::consistency::CONSISTENCY_METRIC;
use crate::models::{FinalReport, ModelCostSummary, ModelTaskSummary};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print the session report in the specified format
pub fn print_results(report: &FinalReport, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", format_plain(report)),
        OutputFormat::Json => print_json(report),
    }
}

/// Render the report as plain text tables
pub fn format_plain(report: &FinalReport) -> String {
    let mut out = String::new();

    for (i, summary) in report.summaries.iter().enumerate() {
        let _ = writeln!(out, "=== {} / {} ===", summary.model_identifier, summary.task_kind);
        let _ = writeln!(out);
        write_summary_header(&mut out, summary);
        let _ = writeln!(out);

        let _ = writeln!(out, "📊 STATISTICS");
        let _ = writeln!(out, "-------------");
        write_statistics_plain(&mut out, summary);
        let _ = writeln!(out);

        if i < report.summaries.len() - 1 {
            let _ = writeln!(out, "{}", "=".repeat(50));
            let _ = writeln!(out);
        }
    }

    if report.summaries.is_empty() {
        let _ = writeln!(out, "No results.");
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "💰 COST");
    let _ = writeln!(out, "-------");
    write_costs_plain(&mut out, &report.costs);
    let _ = writeln!(out, "Total cost: ${:.6}", report.total_cost_usd);

    out
}

fn write_summary_header(out: &mut String, summary: &ModelTaskSummary) {
    let _ = write!(
        out,
        "Pairs: {}  Success rate: {:.1}%",
        summary.pairs,
        summary.success_rate * 100.0
    );
    if let Some(rate) = summary.parsing_error_rate {
        let _ = write!(out, "  Parsing error rate: {:.1}%", rate * 100.0);
    }
    let _ = writeln!(out);
}

/// Metrics in rubric order, consistency last
fn write_statistics_plain(out: &mut String, summary: &ModelTaskSummary) {
    let stats = &summary.statistics;
    if stats.mean.is_empty() {
        let _ = writeln!(out, "No statistics available.");
        return;
    }

    let _ = writeln!(out, "{:<24} {:<8} {:<8} {:<8}", "Metric", "Mean", "Median", "Mode");
    let _ = writeln!(out, "{}", "-".repeat(51));

    let metrics = summary
        .task_kind
        .metric_names()
        .iter()
        .copied()
        .chain(std::iter::once(CONSISTENCY_METRIC));

    for metric in metrics {
        let Some(mean) = stats.mean.get(metric) else {
            continue;
        };
        let median = stats.median.get(metric).unwrap_or(&0.0);
        let mode = stats.mode.get(metric).unwrap_or(&0.0);

        let _ = writeln!(out, "{:<24} {:<8.3} {:<8.3} {:<8.3}", metric, mean, median, mode);
    }
}

fn write_costs_plain(out: &mut String, costs: &[ModelCostSummary]) {
    if costs.is_empty() {
        let _ = writeln!(out, "No cost data.");
        return;
    }

    let _ = writeln!(
        out,
        "{:<20} {:<9} {:<9} {:<12} {:<12} {:<14} {:<8}",
        "Model", "Requests", "Failures", "Latency ms", "Avg $/req", "Monthly (10k)", "In:Out"
    );
    let _ = writeln!(out, "{}", "-".repeat(90));

    for cost in costs {
        let _ = writeln!(
            out,
            "{:<20} {:<9} {:<9} {:<12.2} {:<12.6} {:<14.4} {:<8}",
            cost.model_identifier,
            cost.requests,
            cost.failures,
            cost.avg_latency_ms,
            cost.avg_cost_per_request,
            cost.monthly_projection_usd,
            format_io_ratio(cost.io_token_ratio)
        );
    }
}

pub fn format_io_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(ratio) => format!("{:.1}:1", ratio),
        None => "N/A".to_string(),
    }
}

/// Print the report in JSON format
fn print_json(report: &FinalReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "Failed to serialize report to JSON"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Statistics, TaskKind};
    use std::collections::HashMap;

    fn create_test_report() -> FinalReport {
        let mut mean = HashMap::new();
        mean.insert("json_validity".to_string(), 0.9);
        mean.insert("consistency".to_string(), 0.75);
        let mut median = HashMap::new();
        median.insert("json_validity".to_string(), 1.0);
        let mut mode = HashMap::new();
        mode.insert("json_validity".to_string(), 1.0);

        FinalReport {
            generated_at: "20261019_101500".to_string(),
            summaries: vec![ModelTaskSummary {
                model_identifier: "gpt-4o-mini".to_string(),
                task_kind: TaskKind::PersonaGeneration,
                pairs: 10,
                success_rate: 0.9,
                statistics: Statistics { mean, median, mode },
                parsing_error_rate: Some(0.1),
            }],
            costs: vec![ModelCostSummary {
                model_identifier: "gpt-4o-mini".to_string(),
                requests: 30,
                failures: 3,
                avg_latency_ms: 812.5,
                avg_cost_per_request: 0.00045,
                monthly_projection_usd: 4.5,
                total_input_tokens: 30000,
                total_output_tokens: 15000,
                io_token_ratio: Some(2.0),
            }],
            total_cost_usd: 0.0135,
            results: vec![],
        }
    }

    #[test]
    fn test_plain_output_contains_tables() {
        let text = format_plain(&create_test_report());

        assert!(text.contains("=== gpt-4o-mini / persona_generation ==="));
        assert!(text.contains("Success rate: 90.0%"));
        assert!(text.contains("Parsing error rate: 10.0%"));
        assert!(text.contains("json_validity"));
        assert!(text.contains("2.0:1"));
        assert!(text.contains("Total cost: $0.013500"));
    }

    #[test]
    fn test_plain_output_orders_consistency_last() {
        let text = format_plain(&create_test_report());
        let validity = text.find("json_validity").unwrap();
        let consistency = text.find("consistency").unwrap();
        assert!(validity < consistency);
    }

    #[test]
    fn test_plain_output_empty_report() {
        let report = FinalReport {
            generated_at: String::new(),
            summaries: vec![],
            costs: vec![],
            total_cost_usd: 0.0,
            results: vec![],
        };
        let text = format_plain(&report);
        assert!(text.contains("No results."));
        assert!(text.contains("No cost data."));
    }

    #[test]
    fn test_io_ratio_formatting() {
        assert_eq!(format_io_ratio(Some(2.34)), "2.3:1");
        assert_eq!(format_io_ratio(None), "N/A");
    }

    #[test]
    fn test_json_output() {
        // Ensures serialization does not panic
        print_json(&create_test_report());
    }
}
