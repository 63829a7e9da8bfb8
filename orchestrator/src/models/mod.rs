//! Data models module

pub mod deployment;
