//! Payload codec
//!
//! Functions, parameters and results cross the engine boundary as base64
//! armor over the canonical JSON form of [`Value`]. Encoding is
//! deterministic, so `encode(v)` compares equal across processes, and
//! `decode(encode(v)) == v` for every representable value.

pub mod expr;
pub mod value;

pub use expr::{apply, free_vars, BinaryOp, EvalError, Expr, UnaryOp};
pub use value::{Closure, Value};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Error, Result};

/// Encode a value into its armored wire form
pub fn encode(value: &Value) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(BASE64.encode(json))
}

/// Decode an armored wire form back into a value
pub fn decode(blob: &str) -> Result<Value> {
    let bytes = BASE64
        .decode(blob.trim())
        .map_err(|e| Error::decode("value payload", e.to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::decode("value payload", e.to_string()))
}

/// Decode armored text (raw UTF-8 rather than a tagged value)
///
/// C source and C param descriptors travel this way.
pub fn decode_text(blob: &str) -> Result<String> {
    let bytes = BASE64
        .decode(blob.trim())
        .map_err(|e| Error::decode("text payload", e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::decode("text payload", e.to_string()))
}

/// Armor raw bytes
pub fn encode_bytes(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// The armored form of [`Value::Null`]
///
/// Failed executions carry this as their result placeholder, so it must
/// be available without going through a fallible encode.
pub fn encoded_null() -> String {
    encode_bytes(br#"{"t":"NULL"}"#)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
