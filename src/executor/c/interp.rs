//! Interpreter subprocess and result parsing
//!
//! The synthesized program goes to the interpreter on stdin; the value
//! of the echoed OUT variable comes back as the last token on stdout.
//! The child is always waited on, even when feeding it fails, so no
//! zombie survives an error path.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::codec::Value;
use crate::error::{Error, Result};

/// An interactive C interpreter, e.g. cling
#[derive(Debug, Clone)]
pub struct Interpreter {
    command: String,
    args: Vec<String>,
}

impl Interpreter {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run one program to completion and return its stdout
    pub fn run(&self, program: &str) -> Result<String> {
        debug!(command = %self.command, bytes = program.len(), "Spawning interpreter");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::subprocess_io(format!("failed to spawn '{}'", self.command), e)
            })?;

        // Dropping stdin closes the pipe and lets the interpreter
        // reach EOF. Keep the write result aside until the child has
        // been reaped.
        let fed = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(program.as_bytes()),
            None => Ok(()),
        };

        let output = child.wait_with_output().map_err(|e| {
            Error::subprocess_io("failed to collect interpreter output", e)
        })?;

        if let Err(e) = fed {
            return Err(Error::subprocess_io(
                "failed to write program to interpreter stdin",
                e,
            ));
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let brief: String = stderr.trim().chars().take(200).collect();
            warn!(status = %output.status, "Interpreter exited abnormally");
            return Err(Error::subprocess(format!(
                "interpreter exited with {}: {}",
                output.status, brief
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ─────────────────────────────────────────────────────────────────
// Result parsing
// ─────────────────────────────────────────────────────────────────

/// Parse the interpreter's echo of the OUT variable
///
/// Interactive interpreters echo values with decoration, e.g. cling
/// prints `(float) 7.00000f`. The last whitespace-separated token is
/// the value itself; `out_type` is the descriptor type of the echoed
/// variable and decides how the token is read.
pub fn parse_result(stdout: &str, out_type: &str) -> Result<Value> {
    let token = stdout.split_whitespace().last().ok_or_else(|| {
        Error::result_parse("interpreter produced no output to parse")
    })?;

    let condensed: String = out_type.chars().filter(|c| !c.is_whitespace()).collect();
    match condensed.as_str() {
        "int" | "long" | "longlong" | "short" | "unsigned" | "unsignedint"
        | "unsignedlong" | "size_t" => token.parse::<i64>().map(Value::Int).map_err(|_| {
            Error::result_parse(format!("cannot parse '{}' as {}", token, out_type))
        }),
        "float" | "double" => {
            let bare = token.trim_end_matches(['f', 'F']);
            let parsed = bare.parse::<f64>().map_err(|_| {
                Error::result_parse(format!("cannot parse '{}' as {}", token, out_type))
            })?;
            if !parsed.is_finite() {
                return Err(Error::result_parse(format!(
                    "non-finite {} result '{}'",
                    out_type, token
                )));
            }
            Ok(Value::Float(parsed))
        }
        "bool" | "_Bool" => match token {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(Error::result_parse(format!(
                "cannot parse '{}' as bool",
                token
            ))),
        },
        "char*" | "constchar*" | "string" => {
            Ok(Value::Str(token.trim_matches('"').to_string()))
        }
        "char" => Ok(Value::Str(token.trim_matches('\'').to_string())),
        other => Err(Error::result_parse(format!(
            "unsupported OUT type '{}'",
            other
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
