//! Engine facade
//!
//! Validates offload requests into prepared calls and routes them to
//! an execution path. Sync runs hold the process-wide gate, so at most
//! one of them touches the interpreter at a time; async runs go to the
//! task pool and are polled by id.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::{self, Value};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{self, CCall, Interpreter, PreparedCall, PyCall};
use crate::manager::{TaskManager, TaskState};
use crate::metrics::{CallLog, ExecutionCounters, MetricsSnapshot};
use crate::types::{AsyncExecResponse, CParam, ExecResponse, Language, OffloadRequest};

/// The function offload engine
pub struct Engine {
    counters: Arc<ExecutionCounters>,
    calls: Arc<CallLog>,
    manager: TaskManager,
    interpreter: Arc<Interpreter>,
    /// Held for the whole duration of every sync execution
    sync_gate: Mutex<()>,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        let counters = Arc::new(ExecutionCounters::new());
        let calls = Arc::new(CallLog::new(config.engine.call_log_size));
        let manager = TaskManager::new(
            config.engine.effective_concurrency(),
            config.engine.max_finished_tasks,
            counters.clone(),
            calls.clone(),
        );
        let interpreter = Arc::new(Interpreter::new(
            config.interpreter.command.clone(),
            config.interpreter.args.clone(),
        ));

        Self {
            counters,
            calls,
            manager,
            interpreter,
            sync_gate: Mutex::new(()),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────

    /// Validate a request into a prepared call
    ///
    /// Failures here reject the request outright; no counter moves and
    /// no record is written. Everything past this point is captured
    /// into the execution's own record instead.
    pub fn prepare(&self, request: &OffloadRequest) -> Result<PreparedCall> {
        let language = Language::from_tag(&request.lang)
            .ok_or_else(|| Error::unsupported_language(&request.lang))?;

        self.check_hash(request);

        match language {
            Language::Py => {
                let value = codec::decode(&request.fc).map_err(|e| relabel(e, "function"))?;
                let closure = match value {
                    Value::Closure(c) => c,
                    other => return Err(Error::not_callable(other.type_name())),
                };

                let mut args = Vec::with_capacity(request.params.len());
                for (i, blob) in request.params.iter().enumerate() {
                    let arg = codec::decode(blob)
                        .map_err(|e| relabel(e, format!("argument {}", i)))?;
                    args.push(arg);
                }

                Ok(PreparedCall::Py(PyCall::new(closure, args)))
            }
            Language::C => {
                let source =
                    codec::decode_text(&request.fc).map_err(|e| relabel(e, "function source"))?;
                let params = request
                    .params
                    .iter()
                    .map(|blob| CParam::from_encoded(blob))
                    .collect::<Result<Vec<_>>>()?;

                Ok(PreparedCall::C(CCall::new(
                    source,
                    params,
                    self.interpreter.clone(),
                )))
            }
        }
    }

    /// Devices send whatever they like in `fc_hash`, so a mismatch is
    /// advisory only
    fn check_hash(&self, request: &OffloadRequest) {
        if request.fc_hash.is_empty() {
            return;
        }
        let mut hasher = Sha256::new();
        hasher.update(request.fc.as_bytes());
        let digest = hex::encode(hasher.finalize());
        if digest == request.fc_hash {
            debug!(fc_hash = %request.fc_hash, "Function hash verified");
        } else {
            warn!(fc_hash = %request.fc_hash, "Function hash does not match payload");
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Execution paths
    // ─────────────────────────────────────────────────────────────

    /// Run one request to completion, serialized with every other sync
    /// run in the process
    pub async fn exec_sync(&self, request: &OffloadRequest) -> Result<ExecResponse> {
        let call = self.prepare(request)?;

        let _gate = self.sync_gate.lock().await;
        debug!(language = %call.language(), "Sync execution acquired the gate");

        let counters = self.counters.clone();
        let calls = self.calls.clone();
        let app_req_id = request.app_req_id;
        let response = tokio::task::spawn_blocking(move || {
            executor::execute(&call, &counters, &calls, app_req_id)
        })
        .await
        .map_err(|e| Error::Internal(format!("sync execution aborted: {}", e)))?;

        Ok(response)
    }

    /// Queue one request for background execution
    pub fn exec_async(&self, request: &OffloadRequest) -> Result<AsyncExecResponse> {
        let call = self.prepare(request)?;
        let id = self.manager.submit(call, request.app_req_id);
        Ok(AsyncExecResponse::working(id))
    }

    /// Poll a task by id
    ///
    /// READY covers every run that produced a response, including runs
    /// whose record carries `ret_code` -1. FAILED means the run itself
    /// was lost and no response exists.
    pub fn status(&self, id: Uuid) -> Result<AsyncExecResponse> {
        match self.manager.status(id) {
            Some(TaskState::Working) => Ok(AsyncExecResponse::working(id)),
            Some(TaskState::Ready(response)) => Ok(AsyncExecResponse::ready(id, response)),
            Some(TaskState::Failed(message)) => {
                warn!(task_id = %id, error = %message, "Polled task had failed");
                Ok(AsyncExecResponse::failed(id))
            }
            None => Err(Error::task_not_found(id.to_string())),
        }
    }

    /// Counters and the recent-call log
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.snapshot(),
            recent_calls: self.calls.recent(),
        }
    }
}

/// Replace the generic decode label with the request field being read
fn relabel(err: Error, what: impl Into<String>) -> Error {
    match err {
        Error::Decode { message, .. } => Error::decode(what, message),
        other => other,
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
