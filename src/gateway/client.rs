// Keywarden: Control Socket Client
//
// One-shot JSON-RPC call against a running daemon. Used by `keywarden call`.

use std::path::Path;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::error::{KeywardenError, Result};

use super::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Send `method` with `params` and return the `result` member.
pub async fn call(socket_path: &Path, method: &str, params: Value) -> Result<Value> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| {
        KeywardenError::Other(format!(
            "Cannot reach daemon at {} ({}). Is `keywarden serve` running?",
            socket_path.display(),
            e
        ))
    })?;

    let (reader, mut writer) = stream.into_split();
    let request = JsonRpcRequest::new(method, params, 1);
    let mut line =
        serde_json::to_string(&request).map_err(|e| KeywardenError::Other(e.to_string()))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let reply = BufReader::new(reader)
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| KeywardenError::Other("Daemon closed the connection".to_string()))?;

    let response: JsonRpcResponse = serde_json::from_str(&reply)
        .map_err(|e| KeywardenError::Other(format!("Malformed daemon response: {}", e)))?;

    match (response.result, response.error) {
        (_, Some(err)) => Err(KeywardenError::Other(format!(
            "{} (code {})",
            err.message, err.code
        ))),
        (Some(result), None) => Ok(result),
        (None, None) => Ok(Value::Null),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
