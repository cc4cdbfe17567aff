//! Wire types for offload requests and responses
//!
//! Field names and value shapes follow the device-runtime protocol:
//! `ret_code` is numeric 0/-1, async statuses are uppercase words, and
//! the task id travels wrapped as `{"faas_task_uuid": ...}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────
// Language
// ─────────────────────────────────────────────────────────────────

/// Offloaded function language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "PY")]
    Py,
    C,
}

impl Language {
    /// Parse the request's `lang` tag; anything unknown is `None`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "PY" => Some(Language::Py),
            "C" => Some(Language::C),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Py => "PY",
            Language::C => "C",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Offload Request
// ─────────────────────────────────────────────────────────────────

/// An offload request as received from a device runtime
///
/// `lang` stays a raw string here; the engine validates it so that an
/// unknown language is a proper rejection instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadRequest {
    /// Language of the offloaded function
    pub lang: String,

    /// Armored function payload (closure form for PY, source text for C)
    pub fc: String,

    /// Advisory hash of the function payload; empty means absent
    #[serde(default)]
    pub fc_hash: String,

    /// Armored parameters, positional
    #[serde(default)]
    pub params: Vec<String>,

    /// Application requirement id this function belongs to
    #[serde(default)]
    pub app_req_id: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────

/// Outcome code of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ReturnCode {
    Success,
    Error,
}

impl From<ReturnCode> for i32 {
    fn from(rc: ReturnCode) -> i32 {
        match rc {
            ReturnCode::Success => 0,
            ReturnCode::Error => -1,
        }
    }
}

impl TryFrom<i32> for ReturnCode {
    type Error = String;

    fn try_from(v: i32) -> Result<Self, String> {
        match v {
            0 => Ok(ReturnCode::Success),
            -1 => Ok(ReturnCode::Error),
            other => Err(format!("invalid return code: {}", other)),
        }
    }
}

/// Result of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResponse {
    /// 0 if the function finished successfully, -1 if not
    pub ret_code: ReturnCode,

    /// Armored result value; armored Null on executor error
    #[serde(default)]
    pub res: Option<String>,

    /// Execution error description, None on success
    #[serde(default)]
    pub err: Option<String>,
}

impl ExecResponse {
    /// Successful execution carrying an armored result
    pub fn success(res: String) -> Self {
        Self {
            ret_code: ReturnCode::Success,
            res: Some(res),
            err: None,
        }
    }

    /// Failed execution; `res` carries the armored Null placeholder
    pub fn error(res: String, err: impl Into<String>) -> Self {
        Self {
            ret_code: ReturnCode::Error,
            res: Some(res),
            err: Some(err.into()),
        }
    }
}

/// Status of an asynchronous task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Working,
    Ready,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Working => "WORKING",
            TaskStatus::Ready => "READY",
            TaskStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Task id wrapper; the wire keeps the historical field name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncExecId {
    pub faas_task_uuid: Uuid,
}

impl From<Uuid> for AsyncExecId {
    fn from(id: Uuid) -> Self {
        Self { faas_task_uuid: id }
    }
}

/// Response to an async submit or a status poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncExecResponse {
    /// WORKING while executing, READY when finished, FAILED on
    /// infrastructure failure
    pub status: TaskStatus,

    /// The execution result, present only when READY
    #[serde(default)]
    pub res: Option<ExecResponse>,

    /// UUID of the processing task
    pub exec_id: AsyncExecId,
}

impl AsyncExecResponse {
    pub fn working(id: Uuid) -> Self {
        Self {
            status: TaskStatus::Working,
            res: None,
            exec_id: id.into(),
        }
    }

    pub fn ready(id: Uuid, res: ExecResponse) -> Self {
        Self {
            status: TaskStatus::Ready,
            res: Some(res),
            exec_id: id.into(),
        }
    }

    pub fn failed(id: Uuid) -> Self {
        Self {
            status: TaskStatus::Failed,
            res: None,
            exec_id: id.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
