//! Cloud control-plane integration

pub mod client;
pub mod models;
pub mod script;
