// Keywarden: Gateway Module
//
// Local control plane for a running daemon: JSON-RPC 2.0 over a Unix
// domain socket, plus the client half used by `keywarden call`.

mod client;
mod protocol;
mod uds;

pub use client::call;
pub use protocol::{error_code, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use uds::{ControlServer, METHODS};
