//! Harness synthesis
//!
//! Builds the single-file program fed to the interpreter: the scanned
//! source parts, a declaration per parameter, one call to the offloaded
//! function, and the OUT variables echoed so their values land on
//! stdout.

use crate::error::{Error, Result};
use crate::types::{CParam, ParamMode};

use super::scan::{normalize_type, ScannedSource, Signature};

// ─────────────────────────────────────────────────────────────────
// Binding
// ─────────────────────────────────────────────────────────────────

/// Check descriptors against the signature, strictly and positionally
///
/// Every position must agree on name, normalized type and direction;
/// pointer parameters are OUT, value parameters are IN. A mismatch
/// anywhere rejects the whole call.
pub fn bind(signature: &Signature, params: &[CParam]) -> Result<()> {
    if signature.params.len() != params.len() {
        return Err(Error::signature_mismatch(format!(
            "function '{}' takes {} parameter(s) but {} descriptor(s) were supplied",
            signature.name,
            signature.params.len(),
            params.len()
        )));
    }

    for (i, (sig, desc)) in signature.params.iter().zip(params).enumerate() {
        if sig.name != desc.var_name {
            return Err(Error::signature_mismatch(format!(
                "parameter {}: signature names it '{}' but descriptor names it '{}'",
                i, sig.name, desc.var_name
            )));
        }
        if sig.c_type != normalize_type(&desc.c_type) {
            return Err(Error::signature_mismatch(format!(
                "parameter '{}': signature type '{}' does not match descriptor type '{}'",
                sig.name, sig.c_type, desc.c_type
            )));
        }
        let is_out = desc.mode == ParamMode::Out;
        if sig.is_pointer != is_out {
            let message = if sig.is_pointer {
                format!("parameter '{}' is a pointer and must be OUT", sig.name)
            } else {
                format!("parameter '{}' is passed by value and must be IN", sig.name)
            };
            return Err(Error::signature_mismatch(message));
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Program emission
// ─────────────────────────────────────────────────────────────────

/// Build the interpreter program for one call
pub fn synthesize(scanned: &ScannedSource, params: &[CParam]) -> Result<String> {
    bind(&scanned.signature, params)?;

    let mut program = String::new();
    for line in &scanned.includes {
        program.push_str(line);
        program.push('\n');
    }
    for line in &scanned.defines {
        program.push_str(line);
        program.push('\n');
    }
    for line in &scanned.typedefs {
        program.push_str(line);
        program.push('\n');
    }
    program.push_str(&scanned.function);
    program.push('\n');

    // OUT variables hold the value the pointer writes through, so
    // their declarations drop the star
    for p in params.iter().filter(|p| p.mode == ParamMode::Out) {
        program.push_str(&format!("{} {};\n", normalize_type(&p.c_type), p.var_name));
    }
    for p in params.iter().filter(|p| p.mode == ParamMode::In) {
        let literal = render_literal(p)?;
        program.push_str(&format!("{} {} = {};\n", p.c_type.trim(), p.var_name, literal));
    }

    let args: Vec<String> = scanned
        .signature
        .params
        .iter()
        .map(|sig| {
            if sig.is_pointer {
                format!("&{}", sig.name)
            } else {
                sig.name.clone()
            }
        })
        .collect();
    program.push_str(&format!("{}({});\n", scanned.signature.name, args.join(", ")));

    // A bare variable at the prompt makes the interpreter echo its
    // value; the last echo is what the result parser reads
    for p in params.iter().filter(|p| p.mode == ParamMode::Out) {
        program.push_str(&p.var_name);
        program.push('\n');
    }

    Ok(program)
}

fn render_literal(p: &CParam) -> Result<String> {
    let literal = p.literal()?;
    if is_string_type(&p.c_type) {
        Ok(quote_c_string(&literal))
    } else {
        Ok(literal)
    }
}

fn is_string_type(raw: &str) -> bool {
    let condensed: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    matches!(condensed.as_str(), "char*" | "constchar*" | "string")
}

fn quote_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
