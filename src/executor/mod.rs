//! Function executors
//!
//! One executor per supported language, plus the shared execution
//! path. Every run flows through [`execute`], which owns the record
//! lifecycle and the counters: whatever the function does, the outcome
//! is captured into an [`ExecResponse`], never surfaced as a transport
//! error.

mod c;
mod python;

pub use c::{CCall, Interpreter};
pub use python::PyCall;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::codec::{self, Value};
use crate::error::Result;
use crate::metrics::{CallLog, CallRecord, ExecutionCounters};
use crate::types::{ExecResponse, Language, ReturnCode};

// ─────────────────────────────────────────────────────────────────
// Execution record
// ─────────────────────────────────────────────────────────────────

/// Mutable record of one execution's lifecycle
///
/// The outcome fields are written exactly once; whichever of
/// [`succeed`](ExecRecord::succeed) or [`fail`](ExecRecord::fail) runs
/// first wins and later writes are ignored. The end timestamp behaves
/// the same way.
#[derive(Debug)]
pub struct ExecRecord {
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    ret_code: Option<ReturnCode>,
    res: Option<String>,
    err: Option<String>,
}

impl ExecRecord {
    /// Open a record stamped with the start time
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            ret_code: None,
            res: None,
            err: None,
        }
    }

    pub fn succeed(&mut self, res: String) {
        if self.ret_code.is_none() {
            self.ret_code = Some(ReturnCode::Success);
            self.res = Some(res);
        }
    }

    /// Record a captured failure; the result slot carries armored Null
    pub fn fail(&mut self, err: impl Into<String>) {
        if self.ret_code.is_none() {
            self.ret_code = Some(ReturnCode::Error);
            self.res = Some(codec::encoded_null());
            self.err = Some(err.into());
        }
    }

    /// Stamp the end time; the first stamp wins
    pub fn finish(&mut self) -> DateTime<Utc> {
        *self.finished_at.get_or_insert_with(Utc::now)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ret_code(&self) -> Option<ReturnCode> {
        self.ret_code
    }

    pub fn into_response(self) -> ExecResponse {
        ExecResponse {
            ret_code: self.ret_code.unwrap_or(ReturnCode::Error),
            res: self.res,
            err: self.err,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Prepared calls
// ─────────────────────────────────────────────────────────────────

/// A validated call, ready to run on a blocking thread
#[derive(Debug, Clone)]
pub enum PreparedCall {
    Py(PyCall),
    C(CCall),
}

impl PreparedCall {
    pub fn language(&self) -> Language {
        match self {
            PreparedCall::Py(_) => Language::Py,
            PreparedCall::C(_) => Language::C,
        }
    }

    fn invoke(&self) -> Result<Value> {
        match self {
            PreparedCall::Py(call) => call.invoke(),
            PreparedCall::C(call) => call.invoke(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────

/// Run a prepared call to completion
///
/// Counters are bumped before the run starts so in-flight work is
/// visible. The returned response always carries an outcome; errors
/// raised by the function land in `err` with `ret_code` -1, exactly as
/// the device runtime expects.
pub fn execute(
    call: &PreparedCall,
    counters: &ExecutionCounters,
    calls: &CallLog,
    app_req_id: Option<i64>,
) -> ExecResponse {
    counters.record_start();
    let mut record = ExecRecord::start();
    debug!(language = %call.language(), "Execution starting");

    match call.invoke().and_then(|value| codec::encode(&value)) {
        Ok(res) => {
            record.succeed(res);
            counters.record_success();
        }
        Err(e) => {
            warn!(language = %call.language(), error = %e, "Execution failed");
            record.fail(format!("Error executing function: {}", e));
            counters.record_failure();
        }
    }

    let finished = record.finish();
    let outcome = record.ret_code().unwrap_or(ReturnCode::Error);
    calls.push(CallRecord::new(
        call.language(),
        outcome,
        record.started_at(),
        finished,
        app_req_id,
    ));
    debug!(language = %call.language(), outcome = ?outcome, "Execution finished");

    record.into_response()
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
