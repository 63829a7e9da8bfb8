//! Application lifecycle module

pub mod options;
pub mod run;
pub mod state;
