//! Value model for offloaded payloads
//!
//! Everything that crosses the engine boundary (function payloads,
//! arguments, results) is one of these self-describing values. A closure
//! carries its parameter list, its body expression and its own captured
//! bindings; it never references ambient process state, so a decoded
//! closure evaluates identically on any node.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::expr::{free_vars, Expr};

// ─────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────

/// A self-describing value
///
/// Serialized as `{"t": "<TAG>", "v": <payload>}`; `Null` carries no
/// payload. This tagged form is what `codec::encode` armors in base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Value {
    /// Absent result / unit
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer
    Int(i64),
    /// IEEE 754 double
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Heterogeneous list
    List(Vec<Value>),
    /// Portable closure
    Closure(Closure),
}

impl Value {
    /// Short type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "Str",
            Value::List(_) => "List",
            Value::Closure(_) => "Closure",
        }
    }

    /// Whether this value can be applied to arguments
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Closure(c) => write!(f, "closure/{}", c.arity()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Closure
// ─────────────────────────────────────────────────────────────────

/// A portable closure: parameters, body and captured bindings
///
/// `captured` holds every binding the body needs beyond its parameters.
/// Construction via [`Closure::capturing`] keeps exactly the free
/// variables of the body, so a closure cannot smuggle an entire scope
/// across the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    /// Parameter names, bound positionally at application
    pub params: Vec<String>,

    /// Body expression
    pub body: Box<Expr>,

    /// Captured environment (name → value), parameters excluded
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub captured: BTreeMap<String, Value>,
}

impl Closure {
    /// Create a closure with no captured environment
    pub fn new(params: Vec<String>, body: Expr) -> Self {
        Self {
            params,
            body: Box::new(body),
            captured: BTreeMap::new(),
        }
    }

    /// Create a closure, capturing only the free variables of `body`
    /// (minus the parameters) out of `scope`
    ///
    /// Names the body never mentions are dropped; a free variable missing
    /// from `scope` stays unbound and surfaces as an evaluation error at
    /// application time.
    pub fn capturing(
        params: Vec<String>,
        body: Expr,
        scope: &BTreeMap<String, Value>,
    ) -> Self {
        let mut free = free_vars(&body);
        for p in &params {
            free.remove(p);
        }
        let captured = free
            .into_iter()
            .filter_map(|name| scope.get(&name).map(|v| (name, v.clone())))
            .collect();
        Self {
            params,
            body: Box::new(body),
            captured,
        }
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
