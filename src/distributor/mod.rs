// Keywarden: Distributor Module
//
// Delivers private key material to the remote execution environment in an
// HMAC-signed payload, and runs the remote status and connectivity probes.

mod error;
mod remote;
mod service;

pub use error::DistributionError;
pub use remote::{HttpRemoteEnvironment, InstallPayload, InstallStatus, RemoteEnvironment};
pub use service::Distributor;

#[cfg(test)]
pub use remote::mock;
