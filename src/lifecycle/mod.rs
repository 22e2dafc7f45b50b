// Keywarden: Lifecycle Module
//
// The key state machine and the single writer lock it runs under.
//
//   pending --activate--> active --activate(other)--> deprecated --purge--> (deleted)
//                           |
//                           +--revoke--> revoked

mod lock;
mod outcome;
mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use lock::{OpLock, DEFAULT_LOCK_MAX_ATTEMPTS, DEFAULT_LOCK_POLL_INTERVAL};
pub use outcome::{
    ActivationReport, GeneratedKey, ProvisionReport, ProvisionStep, Redistribution,
    RotationOutcome, WatchdogOutcome,
};
pub use service::{KeyLifecycle, LifecyclePolicy};
