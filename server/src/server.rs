//! The stdio serve loop and idle-shutdown supervisor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use anvil_config::AnvilConfig;
use anvil_workspace::Workspace;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND, PARSE_ERROR};
use crate::tools;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// MCP server over line-delimited JSON-RPC on stdio.
pub struct Server {
    workspace: Arc<dyn Workspace>,
    config: watch::Receiver<AnvilConfig>,
    last_activity: Arc<AtomicU64>,
}

impl Server {
    #[must_use]
    pub fn new(workspace: Arc<dyn Workspace>, config: watch::Receiver<AnvilConfig>) -> Self {
        Self {
            workspace,
            config,
            last_activity: Arc::new(AtomicU64::new(unix_now_secs())),
        }
    }

    /// Serve until stdin closes, `shutdown` fires, or the idle timeout hits.
    ///
    /// Requests are handled sequentially in arrival order; each handled call
    /// stamps the activity clock the supervisor watches.
    pub async fn run_stdio(&self, shutdown: CancellationToken) -> std::io::Result<()> {
        let supervisor = tokio::spawn(idle_supervisor(
            self.config.clone(),
            Arc::clone(&self.last_activity),
            shutdown.clone(),
        ));

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut stdout = tokio::io::stdout();

        loop {
            let line = tokio::select! {
                () = shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                tracing::info!("stdin closed, shutting down");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            self.last_activity.store(unix_now_secs(), Ordering::Relaxed);

            if let Some(response) = self.handle_line(line, &shutdown).await {
                let mut payload = serde_json::to_vec(&response)?;
                payload.push(b'\n');
                stdout.write_all(&payload).await?;
                stdout.flush().await?;
            }
        }

        shutdown.cancel();
        supervisor.abort();
        Ok(())
    }

    /// Parse and handle one incoming line. Notifications yield no response.
    pub async fn handle_line(
        &self,
        line: &str,
        shutdown: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("invalid request: {e}"),
                ));
            }
        };
        let id = request.id.clone()?; // notification: nothing to send back
        Some(self.handle_request(id, &request, shutdown).await)
    }

    async fn handle_request(
        &self,
        id: Value,
        request: &JsonRpcRequest,
        shutdown: &CancellationToken,
    ) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => JsonRpcResponse::result(
                id,
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "serverInfo": {
                        "name": "anvil",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": { "tools": {} },
                }),
            ),
            "ping" => JsonRpcResponse::result(id, json!({})),
            "tools/list" => {
                JsonRpcResponse::result(id, json!({ "tools": tools::tool_descriptors() }))
            }
            "tools/call" => {
                let Some(name) = request.params.get("name").and_then(Value::as_str) else {
                    return JsonRpcResponse::error(
                        id,
                        crate::protocol::INVALID_PARAMS,
                        "tools/call requires a tool name",
                    );
                };
                let arguments = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| json!({}));

                tracing::debug!(tool = name, "tool call");
                // Tool failures are results, not transport errors: the
                // taxonomy message goes back as an isError content block the
                // model can read and react to.
                let cancel = shutdown.child_token();
                match tools::dispatch(self.workspace.as_ref(), &cancel, name, &arguments).await {
                    Ok(text) => JsonRpcResponse::result(
                        id,
                        json!({
                            "content": [{ "type": "text", "text": text }],
                            "isError": false,
                        }),
                    ),
                    Err(e) => {
                        tracing::warn!(tool = name, "tool call failed: {e}");
                        JsonRpcResponse::result(
                            id,
                            json!({
                                "content": [{ "type": "text", "text": e.to_string() }],
                                "isError": true,
                            }),
                        )
                    }
                }
            }
            other => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            ),
        }
    }

}

/// Periodically compare the activity clock against the configured idle
/// timeout and cancel the serve loop when it goes stale. Reads the timeout
/// from the live config snapshot, so a hot reload adjusts it on the fly.
async fn idle_supervisor(
    config: watch::Receiver<AnvilConfig>,
    last_activity: Arc<AtomicU64>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }
        let idle_timeout = config.borrow().server.idle_timeout_secs;
        let idle_for = unix_now_secs().saturating_sub(last_activity.load(Ordering::Relaxed));
        if idle_for >= idle_timeout {
            tracing::info!(idle_for, idle_timeout, "idle timeout reached, shutting down");
            shutdown.cancel();
            return;
        }
    }
}
