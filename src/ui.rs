use colored::Colorize;
use declarative::{ApplyResult, Event, ExecuteSummary, TransactionReport};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Run Reports
// ============================================================================

/// One-line label for a resource outcome
pub fn outcome_label(result: &ApplyResult) -> String {
    match result {
        ApplyResult::NoChange => "unchanged".dimmed().to_string(),
        ApplyResult::Changed => "changed".green().to_string(),
        ApplyResult::Noop => "would change".yellow().to_string(),
        ApplyResult::Failed { .. } => "failed".red().bold().to_string(),
        ApplyResult::Skipped { .. } => "skipped".yellow().to_string(),
        ApplyResult::Filtered => "filtered".dimmed().to_string(),
    }
}

/// Summary counts in one line, leaving out zeroes
pub fn summary_line(summary: &ExecuteSummary) -> String {
    let parts = [
        (summary.changed, "changed"),
        (summary.noop, "would change"),
        (summary.refreshed, "refreshed"),
        (summary.failed, "failed"),
        (summary.skipped, "skipped"),
        (summary.filtered, "filtered"),
        (summary.no_change, "unchanged"),
    ];
    let described: Vec<String> = parts
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect();
    if described.is_empty() {
        "nothing to do".to_string()
    } else {
        described.join(", ")
    }
}

fn print_event(event: &Event) {
    let line = event.to_string();
    match event {
        Event::Changed { .. } | Event::Refreshed { .. } => println!("  {} {line}", "→".green()),
        Event::Noop { .. } => println!("  {} {line}", "~".yellow()),
        Event::Failed { .. } => println!("  {} {}", "✗".red(), line.red()),
        Event::Skipped { .. } => println!("  {} {}", "-".yellow(), line.dimmed()),
        Event::RolledBack { .. } => println!("  {} {line}", "↺".yellow()),
    }
}

/// Print the events and summary of a finished transaction
pub fn print_report(report: &TransactionReport, verbose: bool) {
    if !report.events.is_empty() {
        section("Events");
        for event in &report.events {
            print_event(event);
        }
    }

    if verbose {
        section("Resources");
        for (reference, result) in &report.outcomes {
            println!("  {:<50} {}", reference, outcome_label(result));
        }
    }

    println!();
    let line = summary_line(&report.summary);
    if report.is_success() {
        success(&line);
    } else {
        error(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line_skips_zeroes() {
        let summary = ExecuteSummary {
            changed: 2,
            failed: 1,
            ..ExecuteSummary::default()
        };
        assert_eq!(summary_line(&summary), "2 changed, 1 failed");
    }

    #[test]
    fn test_summary_line_empty() {
        assert_eq!(summary_line(&ExecuteSummary::default()), "nothing to do");
    }

    #[test]
    fn test_outcome_labels() {
        colored::control::set_override(false);
        assert_eq!(outcome_label(&ApplyResult::Changed), "changed");
        assert_eq!(
            outcome_label(&ApplyResult::Failed {
                error: "boom".into()
            }),
            "failed"
        );
        assert_eq!(outcome_label(&ApplyResult::Noop), "would change");
    }
}
