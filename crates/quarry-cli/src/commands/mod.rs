//! CLI command handlers

pub mod get;
pub mod index;
pub mod mirror;
pub mod remove;
pub mod search;
pub mod stats;
