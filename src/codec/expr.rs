//! Expression forms and evaluation for portable closures
//!
//! The body of an offloaded closure is a small expression tree:
//! literals, variable references, arithmetic/boolean operators, a
//! conditional, list construction and closure application. Evaluation is
//! strict and total over the value model; every failure is a typed
//! [`EvalError`], never a panic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::value::Value;

/// Maximum nested closure application depth
///
/// Payloads are acyclic so unbounded recursion cannot be expressed, but
/// deeply nested calls could still exhaust the stack of a blocking worker.
const MAX_CALL_DEPTH: usize = 256;

// ─────────────────────────────────────────────────────────────────
// Expression Tree
// ─────────────────────────────────────────────────────────────────

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnaryOp {
    /// Numeric negation
    Neg,
    /// Boolean negation
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A closure body expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Expr {
    /// Literal value
    Lit { value: Value },

    /// Variable reference (parameter or captured binding)
    Var { name: String },

    /// Unary operation
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Binary operation
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Conditional; `cond` must evaluate to a Bool
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// List construction
    List { items: Vec<Expr> },

    /// Application of a closure-valued expression
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
}

/// Collect every variable name referenced by `expr`
///
/// The expression language has no binding forms of its own (parameters
/// bind only at the closure boundary), so every `Var` is free.
pub fn free_vars(expr: &Expr) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_vars(expr, &mut out);
    out
}

fn collect_vars(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Lit { .. } => {}
        Expr::Var { name } => {
            out.insert(name.clone());
        }
        Expr::Unary { operand, .. } => collect_vars(operand, out),
        Expr::Binary { left, right, .. } => {
            collect_vars(left, out);
            collect_vars(right, out);
        }
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            collect_vars(cond, out);
            collect_vars(then, out);
            collect_vars(otherwise, out);
        }
        Expr::List { items } => {
            for item in items {
                collect_vars(item, out);
            }
        }
        Expr::Call { function, args } => {
            collect_vars(function, out);
            for arg in args {
                collect_vars(arg, out);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Evaluation
// ─────────────────────────────────────────────────────────────────

/// Errors raised while evaluating a closure body
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("undefined variable: {0}")]
    Undefined(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("value of type {0} is not callable")]
    NotCallable(&'static str),

    #[error("arity mismatch: closure takes {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },

    #[error("call depth limit exceeded")]
    DepthLimit,
}

/// Apply a closure to positional arguments
///
/// The environment is the closure's captured bindings with the
/// parameters bound over them; nothing else is visible to the body.
pub fn apply(
    closure: &crate::codec::value::Closure,
    args: &[Value],
) -> Result<Value, EvalError> {
    apply_at_depth(closure, args, 0)
}

fn apply_at_depth(
    closure: &crate::codec::value::Closure,
    args: &[Value],
    depth: usize,
) -> Result<Value, EvalError> {
    if depth >= MAX_CALL_DEPTH {
        return Err(EvalError::DepthLimit);
    }
    if args.len() != closure.params.len() {
        return Err(EvalError::Arity {
            expected: closure.params.len(),
            got: args.len(),
        });
    }

    let mut env = closure.captured.clone();
    for (name, value) in closure.params.iter().zip(args.iter()) {
        env.insert(name.clone(), value.clone());
    }
    eval(&closure.body, &env, depth)
}

fn eval(
    expr: &Expr,
    env: &BTreeMap<String, Value>,
    depth: usize,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Lit { value } => Ok(value.clone()),

        Expr::Var { name } => env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Undefined(name.clone())),

        Expr::Unary { op, operand } => {
            let v = eval(operand, env, depth)?;
            eval_unary(*op, v)
        }

        Expr::Binary { op, left, right } => match op {
            // Short-circuit forms evaluate the right side lazily
            BinaryOp::And => {
                let l = expect_bool(eval(left, env, depth)?, "and")?;
                if !l {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool(eval(right, env, depth)?, "and")?))
            }
            BinaryOp::Or => {
                let l = expect_bool(eval(left, env, depth)?, "or")?;
                if l {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool(eval(right, env, depth)?, "or")?))
            }
            _ => {
                let l = eval(left, env, depth)?;
                let r = eval(right, env, depth)?;
                eval_binary(*op, l, r)
            }
        },

        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            let c = expect_bool(eval(cond, env, depth)?, "if condition")?;
            if c {
                eval(then, env, depth)
            } else {
                eval(otherwise, env, depth)
            }
        }

        Expr::List { items } => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, env, depth)?);
            }
            Ok(Value::List(out))
        }

        Expr::Call { function, args } => {
            let callee = eval(function, env, depth)?;
            let closure = match callee {
                Value::Closure(c) => c,
                other => return Err(EvalError::NotCallable(other.type_name())),
            };
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval(arg, env, depth)?);
            }
            apply_at_depth(&closure, &evaluated, depth + 1)
        }
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, EvalError> {
    match (op, v) {
        (UnaryOp::Neg, Value::Int(i)) => {
            i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow)
        }
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, other) => Err(EvalError::Type(format!(
            "cannot negate {}",
            other.type_name()
        ))),
        (UnaryOp::Not, other) => Err(EvalError::Type(format!(
            "'not' requires Bool, got {}",
            other.type_name()
        ))),
    }
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => match (l, r) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (l, r) => arith(op, l, r),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => arith(op, l, r),
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, l, r),
        // And/Or handled at the eval level for short-circuiting
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops evaluated earlier"),
    }
}

fn arith(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => int_arith(op, a, b),
        (Value::Float(a), Value::Float(b)) => float_arith(op, a, b),
        (Value::Int(a), Value::Float(b)) => float_arith(op, a as f64, b),
        (Value::Float(a), Value::Int(b)) => float_arith(op, a, b as f64),
        (l, r) => Err(EvalError::Type(format!(
            "cannot apply {:?} to {} and {}",
            op,
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> Result<Value, EvalError> {
    let out = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_div(b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_rem(b)
        }
        _ => unreachable!("non-arithmetic op in int_arith"),
    };
    out.map(Value::Int).ok_or(EvalError::Overflow)
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvalError> {
    // Results must stay JSON-representable, so zero divisors are an
    // error instead of producing inf/NaN
    if b == 0.0 && matches!(op, BinaryOp::Div | BinaryOp::Mod) {
        return Err(EvalError::DivisionByZero);
    }
    let out = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!("non-arithmetic op in float_arith"),
    };
    if out.is_finite() {
        Ok(Value::Float(out))
    } else {
        Err(EvalError::Overflow)
    }
}

/// Structural equality with numeric promotion (`2 == 2.0`)
fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            (*a as f64) == *b
        }
        (l, r) => l == r,
    }
}

fn compare(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    let ordering = match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => None,
    };
    let ordering = ordering.ok_or_else(|| {
        EvalError::Type(format!(
            "cannot order {} and {}",
            l.type_name(),
            r.type_name()
        ))
    })?;
    let out = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!("non-comparison op in compare"),
    };
    Ok(Value::Bool(out))
}

fn expect_bool(v: Value, context: &str) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::Type(format!(
            "{} requires Bool, got {}",
            context,
            other.type_name()
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::Closure;

    fn lit(v: Value) -> Expr {
        Expr::Lit { value: v }
    }

    fn var(name: &str) -> Expr {
        Expr::Var { name: name.into() }
    }

    fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(l),
            right: Box::new(r),
        }
    }

    fn run(closure: &Closure, args: &[Value]) -> Result<Value, EvalError> {
        apply(closure, args)
    }

    #[test]
    fn test_add_two_params() {
        // (a, b) -> a + b
        let c = Closure::new(
            vec!["a".into(), "b".into()],
            bin(BinaryOp::Add, var("a"), var("b")),
        );
        assert_eq!(
            run(&c, &[Value::Int(2), Value::Int(3)]),
            Ok(Value::Int(5))
        );
    }

    #[test]
    fn test_numeric_promotion() {
        let c = Closure::new(
            vec!["a".into(), "b".into()],
            bin(BinaryOp::Add, var("a"), var("b")),
        );
        assert_eq!(
            run(&c, &[Value::Int(2), Value::Float(0.5)]),
            Ok(Value::Float(2.5))
        );
    }

    #[test]
    fn test_string_and_list_concat() {
        let c = Closure::new(
            vec!["a".into(), "b".into()],
            bin(BinaryOp::Add, var("a"), var("b")),
        );
        assert_eq!(
            run(&c, &[Value::Str("ab".into()), Value::Str("cd".into())]),
            Ok(Value::Str("abcd".into()))
        );
        assert_eq!(
            run(
                &c,
                &[
                    Value::List(vec![Value::Int(1)]),
                    Value::List(vec![Value::Int(2)])
                ]
            ),
            Ok(Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn test_type_error_int_plus_str() {
        let c = Closure::new(
            vec!["a".into(), "b".into()],
            bin(BinaryOp::Add, var("a"), var("b")),
        );
        let err = run(&c, &[Value::Int(2), Value::Str("x".into())]).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    #[test]
    fn test_division_by_zero() {
        let c = Closure::new(
            vec!["a".into()],
            bin(BinaryOp::Div, var("a"), lit(Value::Int(0))),
        );
        assert_eq!(run(&c, &[Value::Int(7)]), Err(EvalError::DivisionByZero));

        let c = Closure::new(
            vec!["a".into()],
            bin(BinaryOp::Div, var("a"), lit(Value::Float(0.0))),
        );
        assert_eq!(
            run(&c, &[Value::Float(7.0)]),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_integer_overflow() {
        let c = Closure::new(
            vec!["a".into()],
            bin(BinaryOp::Add, var("a"), lit(Value::Int(1))),
        );
        assert_eq!(run(&c, &[Value::Int(i64::MAX)]), Err(EvalError::Overflow));
    }

    #[test]
    fn test_undefined_variable() {
        let c = Closure::new(vec![], var("ghost"));
        assert_eq!(
            run(&c, &[]),
            Err(EvalError::Undefined("ghost".to_string()))
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let c = Closure::new(vec!["a".into(), "b".into()], var("a"));
        assert_eq!(
            run(&c, &[Value::Int(1)]),
            Err(EvalError::Arity {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn test_captured_binding_used() {
        let mut scope = BTreeMap::new();
        scope.insert("offset".to_string(), Value::Int(100));
        let c = Closure::capturing(
            vec!["a".into()],
            bin(BinaryOp::Add, var("a"), var("offset")),
            &scope,
        );
        assert_eq!(run(&c, &[Value::Int(1)]), Ok(Value::Int(101)));
    }

    #[test]
    fn test_if_and_comparisons() {
        // (a, b) -> if a < b then b else a
        let c = Closure::new(
            vec!["a".into(), "b".into()],
            Expr::If {
                cond: Box::new(bin(BinaryOp::Lt, var("a"), var("b"))),
                then: Box::new(var("b")),
                otherwise: Box::new(var("a")),
            },
        );
        assert_eq!(
            run(&c, &[Value::Int(3), Value::Int(9)]),
            Ok(Value::Int(9))
        );
        assert_eq!(
            run(&c, &[Value::Int(9), Value::Int(3)]),
            Ok(Value::Int(9))
        );
    }

    #[test]
    fn test_short_circuit_and() {
        // false and (1 / 0 == 0) must not evaluate the right side
        let c = Closure::new(
            vec![],
            bin(
                BinaryOp::And,
                lit(Value::Bool(false)),
                bin(
                    BinaryOp::Eq,
                    bin(BinaryOp::Div, lit(Value::Int(1)), lit(Value::Int(0))),
                    lit(Value::Int(0)),
                ),
            ),
        );
        assert_eq!(run(&c, &[]), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_numeric_cross_equality() {
        let c = Closure::new(
            vec!["a".into(), "b".into()],
            bin(BinaryOp::Eq, var("a"), var("b")),
        );
        assert_eq!(
            run(&c, &[Value::Int(2), Value::Float(2.0)]),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn test_inner_call() {
        // apply a captured closure: (x) -> double(x) where double = (n) -> n * 2
        let double = Closure::new(
            vec!["n".into()],
            bin(BinaryOp::Mul, var("n"), lit(Value::Int(2))),
        );
        let mut scope = BTreeMap::new();
        scope.insert("double".to_string(), Value::Closure(double));
        let c = Closure::capturing(
            vec!["x".into()],
            Expr::Call {
                function: Box::new(var("double")),
                args: vec![var("x")],
            },
            &scope,
        );
        assert_eq!(run(&c, &[Value::Int(21)]), Ok(Value::Int(42)));
    }

    #[test]
    fn test_call_non_closure() {
        let c = Closure::new(
            vec![],
            Expr::Call {
                function: Box::new(lit(Value::Int(5))),
                args: vec![],
            },
        );
        assert_eq!(run(&c, &[]), Err(EvalError::NotCallable("Int")));
    }

    #[test]
    fn test_inner_closure_sees_only_own_bindings() {
        // The inner closure must not see the caller's parameters
        let leaky = Closure::new(vec![], var("x"));
        let mut scope = BTreeMap::new();
        scope.insert("f".to_string(), Value::Closure(leaky));
        let c = Closure::capturing(
            vec!["x".into()],
            Expr::Call {
                function: Box::new(var("f")),
                args: vec![],
            },
            &scope,
        );
        assert_eq!(
            run(&c, &[Value::Int(1)]),
            Err(EvalError::Undefined("x".to_string()))
        );
    }

    #[test]
    fn test_call_depth_limit() {
        // A chain of closures each calling the next, deeper than the limit
        let mut inner = Closure::new(vec![], lit(Value::Int(1)));
        for _ in 0..MAX_CALL_DEPTH + 10 {
            let mut scope = BTreeMap::new();
            scope.insert("f".to_string(), Value::Closure(inner));
            inner = Closure::capturing(
                vec![],
                Expr::Call {
                    function: Box::new(var("f")),
                    args: vec![],
                },
                &scope,
            );
        }
        assert_eq!(run(&inner, &[]), Err(EvalError::DepthLimit));
    }

    #[test]
    fn test_free_vars() {
        let e = bin(
            BinaryOp::Add,
            var("a"),
            Expr::If {
                cond: Box::new(var("flag")),
                then: Box::new(var("b")),
                otherwise: Box::new(lit(Value::Int(0))),
            },
        );
        let free = free_vars(&e);
        let names: Vec<&str> = free.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "flag"]);
    }

    #[test]
    fn test_expr_roundtrip() {
        let e = Expr::Call {
            function: Box::new(var("f")),
            args: vec![bin(BinaryOp::Mul, var("x"), lit(Value::Float(1.5)))],
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_wire_form_uses_lowercase_kinds() {
        let e = bin(BinaryOp::Add, var("a"), lit(Value::Int(1)));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "binary");
        assert_eq!(json["op"], "add");
        assert_eq!(json["left"]["kind"], "var");
    }
}
