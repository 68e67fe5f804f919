//! Resolves the remote destination a host application opens on cold start.
//!
//! The destination is reassembled from fragments served by a remote gate,
//! which is itself located through two fields in a remote key-value store.
//! The first successful result is cached and reused on every later launch.

pub mod cache;
pub mod config;
pub mod errors;
pub mod fragments;
pub mod identity;
pub mod launch;
pub mod metrics_defs;
pub mod payload;
pub mod redirect;
pub mod remote_config;
pub mod reporter;
pub mod resolver;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutils;

pub use errors::ConfigError;
pub use launch::{LaunchController, LaunchOutcome};
