//! C executor
//!
//! Runs an offloaded C function through an interactive interpreter:
//! scan the source, bind the parameter descriptors to the signature,
//! synthesize a single-file program, feed it to the interpreter and
//! parse the echoed OUT value back into a typed result.

mod interp;
mod scan;
mod synth;

pub use interp::Interpreter;

use std::sync::Arc;

use tracing::debug;

use crate::codec::Value;
use crate::error::Result;
use crate::types::{CParam, ParamMode};

/// A decoded C call, ready to run
#[derive(Debug, Clone)]
pub struct CCall {
    source: String,
    params: Vec<CParam>,
    interpreter: Arc<Interpreter>,
}

impl CCall {
    pub fn new(source: String, params: Vec<CParam>, interpreter: Arc<Interpreter>) -> Self {
        Self {
            source,
            params,
            interpreter,
        }
    }

    /// Run the full pipeline
    ///
    /// Scan and bind failures surface here rather than at decode time,
    /// so a bad function body or mismatched descriptor is captured as
    /// an execution error like any other runtime failure.
    pub(crate) fn invoke(&self) -> Result<Value> {
        let scanned = scan::scan_source(&self.source)?;
        let program = synth::synthesize(&scanned, &self.params)?;
        debug!(
            function = %scanned.signature.name,
            program_lines = program.lines().count(),
            "Running C function"
        );
        let stdout = self.interpreter.run(&program)?;

        // The OUT variable is declared with the pointee type, so its
        // echo is parsed by the star-stripped form of the descriptor
        match self.params.iter().rev().find(|p| p.mode == ParamMode::Out) {
            Some(out) => interp::parse_result(&stdout, &scan::normalize_type(&out.c_type)),
            None => Ok(Value::Null),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
