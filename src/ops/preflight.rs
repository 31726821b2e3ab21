use std::time::Duration;

use crate::config::Config;
use crate::jitter::JitterWindow;
use crate::logicmonitor::is_filter_safe;
use crate::ops::cli::{Command, ExitError, FailoverArgs, GroupSelector};

/// Argument checks that need no network access.
pub fn preflight(config: &Config, command: &Command) -> Result<(), ExitError> {
    config
        .credentials()
        .map_err(|e| ExitError::new(2, format!("invalid_args: {e}")))?;
    config
        .base_url()
        .map_err(|e| ExitError::new(2, format!("invalid_args: {e}")))?;

    match command {
        Command::Failover(args) => {
            preflight_group(&args.group)?;
            jitter_window(args)?;
            Ok(())
        }
        Command::AutoBalance(args) => preflight_group(&args.group),
        Command::EscalationChain(args) => preflight_name("--ec-name", &args.chain_name),
    }
}

fn preflight_group(group: &GroupSelector) -> Result<(), ExitError> {
    match &group.name {
        Some(name) => preflight_name("--cg-name", name),
        None => Ok(()),
    }
}

/// Names end up inside a quoted API filter value.
fn preflight_name(flag: &str, name: &str) -> Result<(), ExitError> {
    if name.trim().is_empty() {
        return Err(ExitError::new(2, format!("invalid_args: {flag} is empty")));
    }
    if !is_filter_safe(name) {
        return Err(ExitError::new(
            2,
            format!("invalid_args: {flag} must not contain '\"', ',' or '\\'"),
        ));
    }
    Ok(())
}

pub fn jitter_window(args: &FailoverArgs) -> Result<JitterWindow, ExitError> {
    JitterWindow::new(
        Duration::from_secs(args.jitter_min_secs),
        Duration::from_secs(args.jitter_max_secs),
    )
    .map_err(|e| ExitError::new(2, format!("invalid_args: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_with_filter_characters_are_rejected() {
        let err = preflight_name("--cg-name", "edge\",dc2").unwrap_err();
        assert_eq!(err.code, 2);
        assert!(err.message.contains("--cg-name"), "{}", err.message);
        assert_eq!(preflight_name("--ec-name", "a,b").unwrap_err().code, 2);
        assert_eq!(preflight_name("--ec-name", "  ").unwrap_err().code, 2);
        assert!(preflight_name("--ec-name", "Collector Down").is_ok());
    }
}
