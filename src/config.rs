use std::{path::PathBuf, time::Duration};

use clap::Args;

use crate::logicmonitor::{Credentials, portal_base_url};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Connection and logging settings shared by every command.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Portal (company) name, as in `https://<portal>.logicmonitor.com`.
    #[arg(long, global = true, env = "LM_PORTAL", value_name = "NAME")]
    pub portal: Option<String>,

    #[arg(long, global = true, env = "LM_ACCESS_ID", value_name = "ID")]
    pub access_id: Option<String>,

    #[arg(
        long,
        global = true,
        env = "LM_ACCESS_KEY",
        value_name = "KEY",
        hide_env_values = true
    )]
    pub access_key: Option<String>,

    /// Override the REST base URL (defaults to the portal URL).
    #[arg(
        long,
        global = true,
        env = "LM_API_BASE_URL",
        value_name = "URL",
        hide = true
    )]
    pub api_base_url: Option<String>,

    #[arg(
        long = "request-timeout-secs",
        global = true,
        env = "LM_REQUEST_TIMEOUT_SECS",
        value_name = "SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..=300)
    )]
    pub request_timeout_secs: u64,

    /// `RUST_LOG` takes precedence when set.
    #[arg(
        long,
        global = true,
        value_enum,
        value_name = "LEVEL",
        default_value = "info"
    )]
    pub log_level: LogLevel,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true, env = "LM_LOG_FILE", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing { flag: &'static str, env: &'static str },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { flag, env } => write!(f, "missing {flag} (or {env})"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let access_id = non_empty(&self.access_id).ok_or(ConfigError::Missing {
            flag: "--access-id",
            env: "LM_ACCESS_ID",
        })?;
        let access_key = non_empty(&self.access_key).ok_or(ConfigError::Missing {
            flag: "--access-key",
            env: "LM_ACCESS_KEY",
        })?;
        Ok(Credentials {
            access_id: access_id.to_string(),
            access_key: access_key.to_string(),
        })
    }

    pub fn base_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = non_empty(&self.api_base_url) {
            return Ok(url.to_string());
        }
        non_empty(&self.portal)
            .map(portal_base_url)
            .ok_or(ConfigError::Missing {
                flag: "--portal",
                env: "LM_PORTAL",
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
