//! Shared controller context

use crate::client::ClusterClient;
use crate::config::OperatorConfig;
use crate::observability::Metrics;
use std::sync::Arc;

/// Shared context for all controllers.
pub struct Context {
    pub client: Arc<dyn ClusterClient>,
    pub metrics: Metrics,
    pub config: OperatorConfig,
}

impl Context {
    pub fn new(client: Arc<dyn ClusterClient>, metrics: Metrics, config: OperatorConfig) -> Self {
        Self {
            client,
            metrics,
            config,
        }
    }
}
