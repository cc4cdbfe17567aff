//! PY closure executor
//!
//! Applies a decoded closure to its positional arguments. Anything the
//! application raises, including arity and type errors, surfaces as an
//! execution error to be captured into the record, never as a
//! transport failure.

use crate::codec::{self, Closure, Value};
use crate::error::{Error, Result};

/// A decoded PY call, ready to run
#[derive(Debug, Clone)]
pub struct PyCall {
    closure: Closure,
    args: Vec<Value>,
}

impl PyCall {
    pub fn new(closure: Closure, args: Vec<Value>) -> Self {
        Self { closure, args }
    }

    pub(crate) fn invoke(&self) -> Result<Value> {
        codec::apply(&self.closure, &self.args).map_err(|e| Error::Execution(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BinaryOp, Expr};

    fn add_closure() -> Closure {
        // a, b -> a + b
        Closure::new(
            vec!["a".into(), "b".into()],
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Var { name: "a".into() }),
                right: Box::new(Expr::Var { name: "b".into() }),
            },
        )
    }

    #[test]
    fn test_invoke_applies_arguments() {
        let call = PyCall::new(add_closure(), vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(call.invoke().unwrap(), Value::Int(5));
    }

    #[test]
    fn test_arity_error_is_execution_error() {
        let call = PyCall::new(add_closure(), vec![Value::Int(2)]);
        let err = call.invoke().unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert!(err.to_string().contains("2 argument"));
    }

    #[test]
    fn test_type_error_is_execution_error() {
        let call = PyCall::new(add_closure(), vec![Value::Int(2), Value::Bool(true)]);
        let err = call.invoke().unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }
}
