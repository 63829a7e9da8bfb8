//! Nodeup Orchestrator Library
//!
//! Core modules for the nodeup deployment orchestrator.

pub mod app;
pub mod cloud;
pub mod deploy;
pub mod errors;
pub mod hub;
pub mod inspect;
pub mod logs;
pub mod models;
pub mod server;
pub mod settings;
pub mod telemetry;
pub mod utils;
