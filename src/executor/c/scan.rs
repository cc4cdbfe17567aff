//! C source scanner
//!
//! Splits an offloaded C source into its preprocessor lines, typedefs
//! and the offloaded function, and extracts the function's signature.
//! The offloaded function must return `void`; results leave it only
//! through pointer parameters.

use tracing::debug;

use crate::error::{Error, Result};

/// The pieces of a scanned C source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedSource {
    pub includes: Vec<String>,
    pub defines: Vec<String>,
    pub typedefs: Vec<String>,
    /// Full text of the offloaded function, verbatim
    pub function: String,
    pub signature: Signature,
}

/// Parsed signature of the offloaded function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<SigParam>,
}

/// One parameter as written in the function signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigParam {
    /// Normalized type with pointer stars stripped, e.g. `float`
    pub c_type: String,
    pub name: String,
    /// Pointer parameters are the function's output channel
    pub is_pointer: bool,
}

/// Collapse whitespace and drop pointer stars so descriptor and
/// signature types compare on equal footing
pub fn normalize_type(raw: &str) -> String {
    raw.replace('*', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ─────────────────────────────────────────────────────────────────
// Scanner
// ─────────────────────────────────────────────────────────────────

enum ScanState {
    Scanning,
    InTypedef,
    InFunction,
}

/// Scan a C source into its parts
///
/// The scanner is line-based: preprocessor directives are collected
/// directly, typedefs and function definitions accumulate until their
/// braces balance. The first complete `void` function becomes the
/// offloaded function.
pub fn scan_source(source: &str) -> Result<ScannedSource> {
    let mut state = ScanState::Scanning;
    let mut includes = Vec::new();
    let mut defines = Vec::new();
    let mut typedefs = Vec::new();
    let mut target: Option<(String, Signature)> = None;

    let mut pending = String::new();
    let mut depth: i32 = 0;
    let mut opened = false;

    for line in source.lines() {
        let trimmed = line.trim();
        match state {
            ScanState::Scanning => {
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed.starts_with("#include") {
                    includes.push(trimmed.to_string());
                } else if trimmed.starts_with("#define") {
                    defines.push(trimmed.to_string());
                } else if trimmed.starts_with("typedef") {
                    pending.clear();
                    pending.push_str(trimmed);
                    pending.push('\n');
                    depth = brace_delta(trimmed);
                    if depth <= 0 && trimmed.contains(';') {
                        typedefs.push(pending.trim_end().to_string());
                    } else {
                        state = ScanState::InTypedef;
                    }
                } else if trimmed.ends_with(';') && !trimmed.contains('{') {
                    // Prototype or global declaration, not a definition
                    continue;
                } else if target.is_none() && trimmed.contains('(') {
                    pending.clear();
                    pending.push_str(trimmed);
                    pending.push('\n');
                    depth = brace_delta(trimmed);
                    opened = trimmed.contains('{');
                    if opened && depth <= 0 {
                        take_function(&pending, &mut target)?;
                    } else {
                        state = ScanState::InFunction;
                    }
                }
                // Stray lines outside any definition are dropped
            }
            ScanState::InTypedef => {
                pending.push_str(trimmed);
                pending.push('\n');
                depth += brace_delta(trimmed);
                if depth <= 0 && trimmed.contains(';') {
                    typedefs.push(pending.trim_end().to_string());
                    state = ScanState::Scanning;
                }
            }
            ScanState::InFunction => {
                pending.push_str(trimmed);
                pending.push('\n');
                depth += brace_delta(trimmed);
                opened = opened || trimmed.contains('{');
                if opened && depth <= 0 {
                    take_function(&pending, &mut target)?;
                    state = ScanState::Scanning;
                }
            }
        }
    }

    match state {
        ScanState::Scanning => {}
        ScanState::InTypedef => {
            return Err(Error::signature_mismatch("unterminated typedef in source"));
        }
        ScanState::InFunction => {
            return Err(Error::signature_mismatch(
                "unterminated function definition in source",
            ));
        }
    }

    let (function, signature) = target.ok_or_else(|| {
        Error::signature_mismatch("no void function definition found in source")
    })?;

    Ok(ScannedSource {
        includes,
        defines,
        typedefs,
        function,
        signature,
    })
}

fn brace_delta(line: &str) -> i32 {
    let mut delta = 0;
    for c in line.chars() {
        match c {
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// A function definition just completed; keep it if it is the first
/// void function, skip it otherwise
fn take_function(text: &str, target: &mut Option<(String, Signature)>) -> Result<()> {
    if target.is_some() {
        return Ok(());
    }
    let (return_type, signature) = parse_signature(text)?;
    if return_type == "void" {
        *target = Some((text.trim_end().to_string(), signature));
    } else {
        debug!(
            function = %signature.name,
            return_type = %return_type,
            "Skipping non-void function"
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Signature parsing
// ─────────────────────────────────────────────────────────────────

fn parse_signature(text: &str) -> Result<(String, Signature)> {
    let open = text.find('(').ok_or_else(|| {
        Error::signature_mismatch("function definition has no parameter list")
    })?;
    let close = text[open..].find(')').map(|i| open + i).ok_or_else(|| {
        Error::signature_mismatch("function definition has no closing parenthesis")
    })?;

    let head: Vec<&str> = text[..open].split_whitespace().collect();
    if head.len() < 2 {
        return Err(Error::signature_mismatch(format!(
            "cannot parse function header '{}'",
            text[..open].trim()
        )));
    }
    let name = head[head.len() - 1].to_string();
    let return_type = head[..head.len() - 1].join(" ");

    let args_text = text[open + 1..close].trim();
    let params = if args_text.is_empty() || args_text == "void" {
        Vec::new()
    } else {
        args_text
            .split(',')
            .map(parse_param)
            .collect::<Result<Vec<_>>>()?
    };

    Ok((return_type, Signature { name, params }))
}

fn parse_param(raw: &str) -> Result<SigParam> {
    let is_pointer = raw.contains('*');
    let cleaned = raw.replace('*', " ");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(Error::signature_mismatch(format!(
            "cannot parse parameter '{}'",
            raw.trim()
        )));
    }
    Ok(SigParam {
        c_type: tokens[..tokens.len() - 1].join(" "),
        name: tokens[tokens.len() - 1].to_string(),
        is_pointer,
    })
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
