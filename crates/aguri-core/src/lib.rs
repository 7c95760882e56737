//! Core of the aguri relay: aggregates messages from many chat workspaces into
//! `aggr-<workspace>` channels of one aggregation workspace and routes thread
//! replies back to their source.
//!
//! Vendor APIs live behind ports (traits) implemented in adapter crates.

pub mod alerts;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod events;
pub mod formatting;
pub mod logging;
pub mod ports;
pub mod relay;
pub mod retry;
pub mod store;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
