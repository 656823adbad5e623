use std::sync::Arc;

use crate::workflow::Workflow;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Built once at startup; owns the context store, the LLM client and
    /// through it the pricing cache.
    pub workflow: Arc<Workflow>,
}
