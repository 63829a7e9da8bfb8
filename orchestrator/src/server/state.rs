//! Server state

use std::sync::Arc;

use crate::app::state::ActivityTracker;
use crate::deploy::orchestrator::Orchestrator;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub activity_tracker: Arc<ActivityTracker>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, activity_tracker: Arc<ActivityTracker>) -> Self {
        Self {
            orchestrator,
            activity_tracker,
        }
    }
}
