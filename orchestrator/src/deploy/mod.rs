//! Deployment orchestration module

pub mod lifecycle;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod retry;
