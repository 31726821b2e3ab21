use std::future::Future;

use crate::cancel::Cancellation;
use crate::config::Config;
use crate::fleet::RemoteError;
use crate::logicmonitor::LogicMonitorClient;
use crate::ops::cli::ExitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DryRun,
    Real,
}

impl Mode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { Self::DryRun } else { Self::Real }
    }
}

pub fn connect(config: &Config) -> Result<LogicMonitorClient, ExitError> {
    let credentials = config
        .credentials()
        .map_err(|e| ExitError::new(2, format!("invalid_args: {e}")))?;
    let base = config
        .base_url()
        .map_err(|e| ExitError::new(2, format!("invalid_args: {e}")))?;
    LogicMonitorClient::new(base, credentials, config.request_timeout())
        .map_err(|e| ExitError::new(2, format!("invalid_args: http client: {e}")))
}

/// Not-found answers are lookup failures (exit 3); anything else is an API error (exit 4).
pub fn remote_exit(context: &str, err: RemoteError) -> ExitError {
    match err {
        RemoteError::NotFound { .. } => ExitError::new(3, format!("lookup_failed: {context}: {err}")),
        err => ExitError::new(4, format!("remote_api_error: {context}: {err}")),
    }
}

/// Runs a lookup unless cancellation fires first; nothing has been changed at that point.
pub async fn unless_cancelled<T>(
    cancel: &Cancellation,
    stage: &str,
    fut: impl Future<Output = Result<T, ExitError>>,
) -> Result<T, ExitError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExitError::new(
            7,
            format!("cancelled: interrupted during {stage}; nothing was changed"),
        )),
        res = fut => res,
    }
}
