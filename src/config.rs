//! Operator configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `MSO_`-prefixed environment variables, then command line flags. The
//! result is validated once into an immutable [`OperatorConfig`].

mod loader;

pub use loader::ConfigLoader;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_INSTANCE_SELECTOR: &str = "app.kubernetes.io/managed-by=observability-operator";
pub const DEFAULT_NAMESPACE: &str = "monitoring-stack-operator";

/// Label pair attached to every metrics and alerting instance so that the
/// downstream operator instance only picks up objects created here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSelector {
    key: String,
    value: String,
}

impl InstanceSelector {
    /// Parses `key=value`. Exactly one `=` and a non-empty key are required.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.trim().is_empty() => Ok(Self {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(Error::InvalidConfiguration(format!(
                "invalid instance selector: {raw:?}, expected key=value"
            ))),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(self.key.clone(), self.value.clone())])
    }
}

impl FromStr for InstanceSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for InstanceSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogSettings {
    /// `EnvFilter` directives, e.g. `info,kube=warn`
    pub level: String,
    pub format: LogFormat,
    /// Also write logs to daily rolling files in this directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
        }
    }
}

/// Raw settings as read from the configuration layers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    pub instance_selector: String,
    /// Namespace the Grafana operator and shared data sources live in
    pub namespace: String,
    /// Workers per controller; the bootstrap controller always uses one
    pub workers: u64,
    /// Periodic resync of the bootstrap sequence
    pub resync_interval_secs: u64,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instance_selector: DEFAULT_INSTANCE_SELECTOR.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            workers: 2,
            resync_interval_secs: 30 * 60,
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn validate(self) -> Result<OperatorConfig> {
        if self.namespace.is_empty() {
            return Err(Error::InvalidConfiguration("namespace must not be empty".into()));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfiguration("workers must be at least 1".into()));
        }
        if self.resync_interval_secs == 0 {
            return Err(Error::InvalidConfiguration(
                "resync interval must be at least one second".into(),
            ));
        }
        Ok(OperatorConfig {
            instance_selector: InstanceSelector::parse(&self.instance_selector)?,
            namespace: self.namespace,
            workers: self.workers as usize,
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            log: self.log,
        })
    }
}

/// Validated configuration, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    pub instance_selector: InstanceSelector,
    pub namespace: String,
    pub workers: usize,
    pub resync_interval: Duration,
    pub log: LogSettings,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            instance_selector: InstanceSelector {
                key: "app.kubernetes.io/managed-by".into(),
                value: "observability-operator".into(),
            },
            namespace: DEFAULT_NAMESPACE.to_string(),
            workers: 2,
            resync_interval: Duration::from_secs(30 * 60),
            log: LogSettings::default(),
        }
    }
}

/// Command line flags. Anything left unset falls through to the lower layers.
#[derive(Debug, Default, Parser)]
#[command(name = "monitoring-stack-operator", version, about)]
pub struct Args {
    /// TOML configuration file
    #[arg(long, env = "MSO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Label `key=value` attached to managed instances
    #[arg(long)]
    pub instance_selector: Option<String>,

    /// Namespace for the Grafana operator and shared data sources
    #[arg(long)]
    pub namespace: Option<String>,

    /// Concurrent reconciles per controller
    #[arg(long)]
    pub workers: Option<u64>,

    /// Seconds between bootstrap resyncs
    #[arg(long)]
    pub resync_interval_secs: Option<u64>,

    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Directory for rolling log files
    #[arg(long)]
    pub log_directory: Option<PathBuf>,

    /// Print the CustomResourceDefinitions as YAML and exit
    #[arg(long)]
    pub print_crds: bool,
}
