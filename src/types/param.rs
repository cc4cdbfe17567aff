//! C call parameter descriptors
//!
//! Each C parameter arrives as an armored JSON object naming its type,
//! variable name, direction and, for IN params, the armored literal
//! text to substitute into the harness.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{Error, Result};

/// Direction of a C call parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamMode {
    In,
    Out,
}

impl std::fmt::Display for ParamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamMode::In => write!(f, "IN"),
            ParamMode::Out => write!(f, "OUT"),
        }
    }
}

/// A single C call parameter descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CParam {
    /// C type as written in the descriptor, e.g. `int` or `float`
    #[serde(rename = "type")]
    pub c_type: String,

    /// Variable name; must match the function signature
    pub var_name: String,

    /// Armored literal text; present for IN params, absent for OUT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    pub mode: ParamMode,
}

impl CParam {
    /// Decode one descriptor from its armored wire form
    pub fn from_encoded(blob: &str) -> Result<Self> {
        let text = codec::decode_text(blob)
            .map_err(|e| Error::decode("param descriptor", e.to_string()))?;
        let param: CParam = serde_json::from_str(&text)
            .map_err(|e| Error::decode("param descriptor", e.to_string()))?;
        if param.mode == ParamMode::In && param.value.is_none() {
            return Err(Error::decode(
                "param descriptor",
                format!("IN param '{}' carries no value", param.var_name),
            ));
        }
        Ok(param)
    }

    /// The decoded literal text of an IN param
    pub fn literal(&self) -> Result<String> {
        let blob = self.value.as_ref().ok_or_else(|| {
            Error::decode(
                "param descriptor",
                format!("param '{}' carries no value", self.var_name),
            )
        })?;
        codec::decode_text(blob)
            .map_err(|e| Error::decode("param value", e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
