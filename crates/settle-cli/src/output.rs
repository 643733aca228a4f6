//! Report rendering

use crate::error::CliResult;
use console::style;
use settle::{SettleReport, StageOutcome};

/// Human-readable report for `url`
#[must_use]
pub fn render_report_text(url: &str, report: &SettleReport) -> String {
    let mut out = String::new();
    let verdict = if report.is_settled() {
        style("settled").green().bold()
    } else if report.hit_deadline() {
        style("timed out, proceeding").yellow().bold()
    } else {
        style("degraded, proceeding").yellow().bold()
    };
    out.push_str(&format!(
        "{} {} in {}ms (budget {}ms)\n",
        style(url).cyan(),
        verdict,
        report.elapsed_ms,
        report.timeout_ms
    ));
    for stage in &report.stages {
        let status = match &stage.outcome {
            StageOutcome::Settled => style("ok".to_string()).green(),
            StageOutcome::DeadlineReached => style("deadline".to_string()).yellow(),
            StageOutcome::Degraded { reason } => style(format!("degraded: {reason}")).red(),
        };
        out.push_str(&format!(
            "  {:<20} {:>7}ms  {}\n",
            stage.stage.as_str(),
            stage.elapsed_ms,
            status
        ));
    }
    out
}

/// Pretty JSON report
pub fn render_report_json(url: &str, report: &SettleReport) -> CliResult<String> {
    let value = serde_json::json!({
        "url": url,
        "settled": report.is_settled(),
        "report": report,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}
