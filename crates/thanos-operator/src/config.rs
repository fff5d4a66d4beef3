//! Operator configuration

use crate::hashring::PreservationPolicy;
use clap::{Args, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// Output format of the operator's own logs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogOutput {
    #[default]
    Text,
    Json,
}

/// Settings for the `run` subcommand.
#[derive(Clone, Debug, Args)]
pub struct OperatorConfig {
    /// Address the Prometheus metrics endpoint listens on
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: SocketAddr,

    /// Seconds between periodic reconciliations of a healthy resource
    #[arg(long, env = "REQUEUE_AFTER_SECS", default_value_t = 300)]
    pub requeue_after_secs: u64,

    /// Seconds before a failed reconciliation is retried
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 60)]
    pub error_requeue_secs: u64,

    /// How hashrings without ready ingesters are published
    #[arg(long, env = "HASHRING_POLICY", value_enum, default_value_t = PreservationPolicy::PreservePersisted)]
    pub hashring_policy: PreservationPolicy,

    /// Field manager and event reporter name
    #[arg(long, env = "FIELD_MANAGER", default_value = "thanos-operator")]
    pub field_manager: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogOutput::Text)]
    pub log_format: LogOutput,
}

impl OperatorConfig {
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            requeue_after_secs: 300,
            error_requeue_secs: 60,
            hashring_policy: PreservationPolicy::default(),
            field_manager: "thanos-operator".to_string(),
            log_format: LogOutput::default(),
        }
    }
}
