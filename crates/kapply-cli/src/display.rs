//! Report output

use console::{StyledObject, style};
use kapply_kube::{Outcome, ReconcileReport};

use crate::commands::OutputFormat;
use crate::error::{CliError, Result};

/// Print a report in the requested format
pub fn print_report(report: &ReconcileReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            print_text(report);
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).map_err(|e| CliError::Other {
                message: format!("cannot serialize report: {}", e),
            })?;
            println!("{}", json);
            Ok(())
        }
    }
}

fn print_text(report: &ReconcileReport) {
    for result in &report.results {
        println!(
            "{} {}",
            style(result.display_name()).bold(),
            styled_outcome(&result.outcome)
        );
    }

    for failure in &report.source_failures {
        eprintln!(
            "{} {}: {}",
            style("✗").red().bold(),
            style(&failure.source).cyan(),
            failure.error
        );
    }

    if report.results.len() + report.source_failures.len() > 1 {
        let icon = if report.is_success() {
            style("✓").green().bold()
        } else {
            style("✗").red().bold()
        };
        println!("{} {}", icon, report.summary());
    }
}

fn styled_outcome(outcome: &Outcome) -> StyledObject<String> {
    let text = outcome.to_string();
    match outcome {
        Outcome::Created | Outcome::Updated => style(text).green(),
        Outcome::Unchanged | Outcome::AlreadyAbsent => style(text).dim(),
        Outcome::Deleted => style(text).yellow(),
        Outcome::Failed(_) => style(text).red(),
    }
}
