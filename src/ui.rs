use colored::Colorize;
use cook::run::{RunOutcome, SkipReason};

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

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print one node's outcome, with a hint when there is something to do about it
pub fn outcome(node: &str, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Succeeded => println!("  {} {}", "✓".green(), node),
        RunOutcome::Skipped(SkipReason::Dummy) => {
            println!("  {} {} {}", "-".dimmed(), node, "(dummy)".dimmed());
        }
        RunOutcome::Skipped(reason) => {
            println!("  {} {} {}", "⚠".yellow(), node, format!("({reason})").yellow());
        }
        RunOutcome::Failed(e) => {
            println!("  {} {} ({})", "✗".red(), node, e);
            if let Some(hint) = hint(e) {
                println!("    {} {}", "try:".dimmed(), hint);
            }
        }
    }
}

/// What to do about a failed node: a command to run, or advice for
/// transport failures
pub fn hint(e: &cook::Error) -> Option<String> {
    e.remediation().or_else(|| match e {
        cook::Error::Transport(inner) => Some(inner.category().advice().to_string()),
        _ => None,
    })
}

/// Plural suffix for counts in summaries
pub fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_prefers_remediation_command() {
        let missing = cook::Error::AgentMissing {
            node: "web1".into(),
        };
        assert_eq!(hint(&missing).as_deref(), Some("sous deploy-agent web1"));
    }

    #[test]
    fn test_hint_gives_transport_advice() {
        let denied = cook::Error::Transport(remote::Error::Permission {
            host: "web1".into(),
            message: "sudo: a password is required".into(),
        });
        assert!(hint(&denied).unwrap().contains("passwordless sudo"));

        let failed = cook::Error::RemoteExecution {
            node: "web1".into(),
            message: "boom".into(),
        };
        assert_eq!(hint(&failed), None);
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(0), "s");
        assert_eq!(plural(1), "");
        assert_eq!(plural(3), "s");
    }
}
