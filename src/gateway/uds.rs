// Keywarden: Control Socket Server
//
// Listens on a Unix domain socket for newline-delimited JSON-RPC 2.0
// requests and dispatches them to the lifecycle service. Each connection
// is handled in its own task. The socket is owner-only (0600) and removed
// on shutdown.
//
// No method returns private key material.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

use crate::error::Result;
use crate::lifecycle::KeyLifecycle;

use super::protocol::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};

/// Methods served on the control socket.
pub const METHODS: &[&str] = &[
    "generate",
    "activate",
    "revoke",
    "redistribute",
    "rotate_if_due",
    "watchdog_check",
    "test_connection",
    "provision",
    "active",
    "list",
    "audit",
    "metrics",
];

pub struct ControlServer {
    lifecycle: Arc<KeyLifecycle>,
    socket_path: PathBuf,
    /// Threshold used by `rotate_if_due` when the caller passes none.
    rotation_days: u32,
}

impl ControlServer {
    pub fn new(lifecycle: Arc<KeyLifecycle>, socket_path: PathBuf, rotation_days: u32) -> Self {
        Self {
            lifecycle,
            socket_path,
            rotation_days,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket and serve until `stop` flips to true.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if self.socket_path.exists() {
            tokio::fs::remove_file(&self.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(socket = %self.socket_path.display(), "Control socket listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept control connection");
                            continue;
                        }
                    };
                    let lifecycle = self.lifecycle.clone();
                    let rotation_days = self.rotation_days;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &lifecycle, rotation_days).await {
                            tracing::warn!(error = %e, "Control connection error");
                        }
                    });
                }
                _ = stop.changed() => break,
            }
        }

        if let Err(e) = tokio::fs::remove_file(&self.socket_path).await {
            tracing::debug!(error = %e, "Socket file already gone");
        }
        tracing::info!("Control socket closed");
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    lifecycle: &KeyLifecycle,
    rotation_days: u32,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_request(&line, lifecycle, rotation_days).await;
        let mut json = serde_json::to_string(&response)
            .map_err(|e| crate::error::KeywardenError::Other(e.to_string()))?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Parse and dispatch one JSON-RPC request.
pub(crate) async fn process_request(
    raw: &str,
    lifecycle: &KeyLifecycle,
    rotation_days: u32,
) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(req) => req,
        Err(e) => return JsonRpcResponse::parse_error(format!("Parse error: {}", e)),
    };
    if let Err(e) = request.validate() {
        return JsonRpcResponse::error(request.id, INVALID_REQUEST, e);
    }

    tracing::debug!(method = %request.method, "Control request");

    let id = request.id.clone();
    let result: Result<Value> = match request.method.as_str() {
        "generate" => lifecycle.generate_and_persist().await.map(|generated| {
            json!({
                "fingerprint": generated.fingerprint(),
                "public_key": generated.public_key(),
                "status": generated.record.status,
            })
        }),
        "activate" => match request.str_param("fingerprint") {
            Ok(fp) => lifecycle.activate_and_distribute(fp).await.map(|r| to_json(&r)),
            Err(msg) => return JsonRpcResponse::error(id, INVALID_PARAMS, msg),
        },
        "revoke" => match request.str_param("fingerprint") {
            Ok(fp) => lifecycle.revoke_key(fp).await.map(|k| to_json(&k)),
            Err(msg) => return JsonRpcResponse::error(id, INVALID_PARAMS, msg),
        },
        "redistribute" => {
            let redistribution = match request.params.get("fingerprint") {
                None | Some(Value::Null) => lifecycle.redistribute_active_key().await,
                Some(_) => match request.str_param("fingerprint") {
                    Ok(fp) => lifecycle.redistribute_fingerprint(fp).await,
                    Err(msg) => return JsonRpcResponse::error(id, INVALID_PARAMS, msg),
                },
            };
            redistribution.map(|r| to_json(&r))
        }
        "rotate_if_due" => {
            let days = match request.params.get("max_age_days") {
                None | Some(Value::Null) => rotation_days,
                Some(v) => match v.as_u64().and_then(|d| u32::try_from(d).ok()) {
                    Some(d) => d,
                    None => {
                        return JsonRpcResponse::error(
                            id,
                            INVALID_PARAMS,
                            "'max_age_days' must be a non-negative integer",
                        )
                    }
                },
            };
            lifecycle.rotate_if_due(days).await.map(|o| to_json(&o))
        }
        "watchdog_check" => Ok(to_json(&lifecycle.watchdog_check().await)),
        "test_connection" => lifecycle.test_connectivity().await,
        "provision" => lifecycle.provision().await.map(|r| to_json(&r)),
        "active" => lifecycle.active_key().map(|k| to_json(&k)),
        "list" => lifecycle.list_keys().map(|keys| to_json(&keys)),
        "audit" => match request.str_param("fingerprint") {
            Ok(fp) => lifecycle.audit_log(fp).map(|events| to_json(&events)),
            Err(msg) => return JsonRpcResponse::error(id, INVALID_PARAMS, msg),
        },
        "metrics" => lifecycle.export_metrics().map(Value::String),
        other => {
            return JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Unknown method: {} (expected one of: {})", other, METHODS.join(", ")),
            )
        }
    };

    match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            tracing::warn!(method = %request.method, error = %e, "Control request failed");
            JsonRpcResponse::from_error(id, &e)
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
