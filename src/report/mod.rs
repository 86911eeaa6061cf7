pub mod types;

pub use types::{CycleReport, RepoOutcome, SkipReason};

use colored::Colorize;
use tracing::info;

/// Log a one-line summary of a finished cycle.
pub fn log_summary(cycle: u64, report: &CycleReport) {
    info!(
        cycle,
        repos = report.outcomes.len(),
        notified = report.notified_count(),
        skipped = report.skipped_count(),
        delivery_failures = report.failed_deliveries(),
        persistence_failed = report.persistence_failed,
        "cycle complete"
    );
}

/// Print a per-repository summary to the terminal with colors.
///
/// acme/widgets  notified #42, #44 (last seen #44)
/// acme/gadgets  up to date (last seen #7)
/// acme/tools    skipped: transient error
pub fn print_terminal_summary(report: &CycleReport) {
    println!();
    let width = report
        .outcomes
        .iter()
        .map(|(repo, _)| repo.key().len())
        .max()
        .unwrap_or(0);

    for (repo, outcome) in &report.outcomes {
        println!("{:width$}  {}", repo.key(), describe(outcome), width = width);
    }

    println!();
    println!(
        "{} notified, {} skipped, {} delivery failures",
        report.notified_count(),
        report.skipped_count(),
        report.failed_deliveries()
    );
    if report.persistence_failed {
        println!("{}", "state file could not be written".red().bold());
    }
    println!();
}

fn describe(outcome: &RepoOutcome) -> colored::ColoredString {
    match outcome {
        RepoOutcome::NoOpenIssues => "no open issues".dimmed(),
        RepoOutcome::UpToDate { highest_seen } => {
            format!("up to date (last seen #{})", highest_seen).normal()
        }
        RepoOutcome::Baselined { highest_seen } => {
            format!("baselined at #{}", highest_seen).cyan()
        }
        RepoOutcome::Notified {
            issues,
            highest_seen,
        } => format!(
            "notified {} (last seen #{})",
            issue_list(issues),
            highest_seen
        )
        .green()
        .bold(),
        RepoOutcome::DeliveryFailed {
            issues,
            failed_issue,
            highest_seen,
        } => {
            let sent = if issues.is_empty() {
                String::new()
            } else {
                format!("notified {}, ", issue_list(issues))
            };
            format!(
                "{}delivery failed at #{} (last seen #{})",
                sent, failed_issue, highest_seen
            )
            .red()
            .bold()
        }
        RepoOutcome::Skipped(reason) => format!("skipped: {}", reason).yellow(),
    }
}

fn issue_list(issues: &[u64]) -> String {
    issues
        .iter()
        .map(|n| format!("#{}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::RepoRef;

    #[test]
    fn test_issue_list() {
        assert_eq!(issue_list(&[42, 44]), "#42, #44");
        assert_eq!(issue_list(&[]), "");
    }

    #[test]
    fn test_describe_outcomes() {
        colored::control::set_override(false);
        assert_eq!(
            describe(&RepoOutcome::Notified {
                issues: vec![42, 44],
                highest_seen: 44
            })
            .to_string(),
            "notified #42, #44 (last seen #44)"
        );
        assert_eq!(
            describe(&RepoOutcome::DeliveryFailed {
                issues: vec![],
                failed_issue: 44,
                highest_seen: 41
            })
            .to_string(),
            "delivery failed at #44 (last seen #41)"
        );
        assert_eq!(
            describe(&RepoOutcome::Skipped(SkipReason::Transient)).to_string(),
            "skipped: transient error"
        );
    }

    #[test]
    fn test_terminal_summary_does_not_panic() {
        let report = CycleReport {
            outcomes: vec![(
                RepoRef::new("acme", "widgets"),
                RepoOutcome::UpToDate { highest_seen: 3 },
            )],
            persistence_failed: true,
        };
        print_terminal_summary(&report);
    }
}
