//! Application state and service initialization
//!
//! Centralizes service construction and dependency injection so handlers
//! and tests wire up the same graph.

use std::sync::Arc;

use crate::model::Config;
use crate::service::{EvidenceClient, GraveyardClient, PremortemPipeline};

/// Application state containing all services and shared resources
pub struct AppState {
    /// Analysis pipeline orchestrator, owning both external boundaries
    pub pipeline: Arc<PremortemPipeline>,
}

impl AppState {
    /// Build the service dependency graph from configuration.
    ///
    /// Missing generation-service credentials are not an error here:
    /// the evidence client raises a configuration error at first use
    /// and the pipeline degrades to its heuristic paths.
    pub fn new(config: &Config) -> Self {
        let evidence = Arc::new(EvidenceClient::new(config.evidence.clone()));
        let graveyard = Arc::new(GraveyardClient::new(config.graveyard.clone()));
        let pipeline = Arc::new(PremortemPipeline::new(evidence, graveyard));

        Self { pipeline }
    }
}
