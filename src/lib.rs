// Keywarden: Library root
//
// SSH deploy-key lifecycle: generation, encrypted storage, signed
// distribution to a remote execution environment, scheduled rotation and
// a watchdog that re-installs the active key when the remote side loses it.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod distributor;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod metrics;
pub mod scheduler;
pub mod store;

pub use error::{KeywardenError, Result};
