//! JSON-lines ingress
//!
//! The engine speaks a line-oriented protocol on stdin/stdout: one
//! request envelope per line in, one reply per line out, in order.
//! stdout belongs to the protocol, which is why all logging goes to
//! stderr. EOF on stdin is a clean shutdown.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::OffloadRequest;

// ─────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────

/// How a request wants to be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngressMode {
    Sync,
    Async,
    Status,
    Metrics,
}

/// One request line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub mode: IngressMode,

    #[serde(default)]
    pub payload: JsonValue,

    /// Echoed back verbatim so the caller can correlate replies
    #[serde(default)]
    pub request_id: String,
}

/// One reply line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub request_id: String,

    /// HTTP-style status code
    pub code: u16,

    /// Response body on success, error description otherwise
    pub message: JsonValue,
}

// ─────────────────────────────────────────────────────────────────
// Request handling
// ─────────────────────────────────────────────────────────────────

/// Handle one raw input line and build its reply
pub async fn process_line(engine: &Engine, line: &str) -> Reply {
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "Malformed ingress line");
            return Reply {
                request_id: String::new(),
                code: 400,
                message: json!(format!("Malformed request: {}", e)),
            };
        }
    };

    let request_id = envelope.request_id.clone();
    debug!(mode = ?envelope.mode, request_id = %request_id, "Handling request");

    match dispatch(engine, envelope).await {
        Ok(message) => Reply {
            request_id,
            code: 200,
            message,
        },
        Err(e) => {
            let code = e.ingress_code();
            warn!(request_id = %request_id, code = code, error = %e, "Request rejected");
            Reply {
                request_id,
                code,
                message: json!(e.to_string()),
            }
        }
    }
}

async fn dispatch(engine: &Engine, envelope: Envelope) -> Result<JsonValue> {
    match envelope.mode {
        IngressMode::Sync => {
            let request: OffloadRequest = parse_payload(envelope.payload)?;
            let response = engine.exec_sync(&request).await?;
            to_json(response)
        }
        IngressMode::Async => {
            let request: OffloadRequest = parse_payload(envelope.payload)?;
            let response = engine.exec_async(&request)?;
            to_json(response)
        }
        IngressMode::Status => {
            let id = parse_task_id(&envelope.payload)?;
            let response = engine.status(id)?;
            to_json(response)
        }
        IngressMode::Metrics => {
            let snapshot = engine.metrics();
            debug!(
                executed = snapshot.counters.executed,
                succeeded = snapshot.counters.succeeded,
                failed = snapshot.counters.failed,
                "Metrics requested"
            );
            to_json(snapshot)
        }
    }
}

fn parse_payload<T: DeserializeOwned>(payload: JsonValue) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| Error::decode("request payload", e.to_string()))
}

/// Accept the task id flat, wrapped, or under its historical name
fn parse_task_id(payload: &JsonValue) -> Result<Uuid> {
    let node = payload.get("exec_id").unwrap_or(payload);
    let raw = match node {
        JsonValue::String(s) => s.as_str(),
        JsonValue::Object(_) => node
            .get("faas_task_uuid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::decode("status payload", "missing task id"))?,
        _ => return Err(Error::decode("status payload", "missing task id")),
    };
    Uuid::parse_str(raw)
        .map_err(|e| Error::decode("status payload", format!("invalid task id '{}': {}", raw, e)))
}

fn to_json<T: Serialize>(value: T) -> Result<JsonValue> {
    Ok(serde_json::to_value(value)?)
}

// ─────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────

/// Serve the protocol until stdin reaches EOF
pub async fn run(engine: Arc<Engine>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    info!("Ingress loop started");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = process_line(&engine, &line).await;
        let mut body = serde_json::to_vec(&reply)?;
        body.push(b'\n');
        stdout.write_all(&body).await?;
        stdout.flush().await?;
    }
    info!("Ingress reached EOF, shutting down");

    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
