// Binary operators: built-in type-pair rules and custom binding lookup
// Operand evaluation (forked scopes, short-circuit) lives in the evaluator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EvalResult, EvaluatorError};
use crate::functions::FunctionRef;
use crate::value::Value;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    InEq,
    Lt,
    Gt,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::InEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// Logical operators take booleans; the rest compare.
    #[inline]
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The handler bound to `op` by either operand, lhs first.
pub fn custom_binding<'a>(op: BinaryOp, lhs: &'a Value, rhs: &'a Value) -> Option<&'a FunctionRef> {
    [lhs, rhs]
        .into_iter()
        .filter_map(|operand| operand.as_object())
        .find_map(|obj| obj.operator_binding(op))
}

/// Apply the built-in rule for `op` to already evaluated operands.
pub fn apply(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    let result = match op {
        BinaryOp::Eq => equals(op, lhs, rhs)?,
        BinaryOp::InEq => !equals(op, lhs, rhs)?,
        BinaryOp::Lt => less_than(op, lhs, rhs)?,
        BinaryOp::Gt => less_than(op, rhs, lhs)?,
        BinaryOp::And | BinaryOp::Or => match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) => {
                if op == BinaryOp::And {
                    *a && *b
                } else {
                    *a || *b
                }
            }
            _ => return Err(mismatch(op, lhs, rhs)),
        },
    };
    Ok(Value::Bool(result))
}

fn equals(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<bool> {
    match (lhs, rhs) {
        (Value::Empty, other) | (other, Value::Empty) => Ok(other.is_empty()),
        (Value::Null, Value::Null) => Ok(true),
        (Value::Number(a), Value::Number(b)) => Ok(a == b),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (Value::Raw(a), Value::Raw(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Path(a), Value::Path(b)) => Ok(a == b),
        // resolved values are immutable; the deep walk only borrows them
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => Ok(lhs == rhs),
        _ => Err(mismatch(op, lhs, rhs)),
    }
}

fn less_than(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<bool> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(a.value < b.value),
        (Value::String(a), Value::String(b)) => Ok(a < b),
        // composites order by size, not content
        (Value::Array(a), Value::Array(b)) => Ok(a.len() < b.len()),
        (Value::Object(a), Value::Object(b)) => Ok(a.len() < b.len()),
        _ => Err(mismatch(op, lhs, rhs)),
    }
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvaluatorError {
    EvaluatorError::type_mismatch(format!(
        "operator '{}' cannot be applied to {} and {}",
        op,
        lhs.type_name(),
        rhs.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::path::Path;
    use crate::value;
    use crate::value::ObjectValue;

    fn eval(op: BinaryOp, lhs: &Value, rhs: &Value) -> bool {
        apply(op, lhs, rhs).unwrap().is_true()
    }

    #[test]
    fn test_eq_reflexive_and_symmetric() {
        let samples = [
            Value::from(3.5),
            Value::from("x"),
            Value::Bool(false),
            Value::Null,
            Value::Empty,
        ];
        for a in &samples {
            assert!(eval(BinaryOp::Eq, a, a), "{:?} = itself", a);
            for b in &samples {
                if let (Ok(ab), Ok(ba)) = (apply(BinaryOp::Eq, a, b), apply(BinaryOp::Eq, b, a)) {
                    assert_eq!(ab, ba);
                }
            }
        }
    }

    #[test]
    fn test_eq_ignores_precision() {
        let two = Value::number_with_precision(2.0, 0);
        let two_000 = Value::number_with_precision(2.0, 3);
        assert!(eval(BinaryOp::Eq, &two, &two_000));
        assert!(!eval(BinaryOp::InEq, &two, &two_000));
    }

    #[test]
    fn test_eq_composites() {
        assert!(eval(
            BinaryOp::Eq,
            &value!({"a": 1, "b": 2}),
            &value!({"b": 2, "a": 1})
        ));
        assert!(!eval(BinaryOp::Eq, &value!([1, 2]), &value!([2, 1])));
        assert!(eval(BinaryOp::Eq, &Value::raw(b"ab".to_vec()), &Value::raw(b"ab".to_vec())));
        let p = Value::path(Path::parse(".a[1]").unwrap());
        assert!(eval(BinaryOp::Eq, &p, &p.clone()));
    }

    #[test]
    fn test_eq_empty() {
        assert!(eval(BinaryOp::Eq, &Value::Empty, &Value::Empty));
        assert!(!eval(BinaryOp::Eq, &Value::Empty, &Value::from(1i64)));
        assert!(!eval(BinaryOp::Eq, &Value::Null, &Value::Empty));
    }

    #[test]
    fn test_type_mismatch_names_both_types() {
        let err = apply(BinaryOp::Eq, &Value::from(1i64), &Value::from("1")).unwrap_err();
        assert!(err.has_code(ErrorCode::TypeMismatch));
        let message = err.to_string();
        assert!(message.contains("Number"));
        assert!(message.contains("String"));
        assert!(message.contains('='));

        assert!(apply(BinaryOp::Lt, &Value::Bool(true), &Value::Bool(false)).is_err());
        assert!(apply(BinaryOp::Or, &Value::from(1i64), &Value::Bool(false)).is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(eval(BinaryOp::Lt, &Value::from(1i64), &Value::from(2i64)));
        assert!(eval(BinaryOp::Gt, &Value::from("b"), &Value::from("a")));
        assert!(eval(BinaryOp::Lt, &value!({"a": 1}), &value!({"a": 1, "b": 2})));
        assert!(eval(BinaryOp::Gt, &value!([9, 9]), &value!([100])));
        assert!(!eval(BinaryOp::Lt, &value!([1]), &value!([1])));
    }

    #[test]
    fn test_logical() {
        let t = Value::Bool(true);
        let f = Value::Bool(false);
        assert!(eval(BinaryOp::Or, &f, &t));
        assert!(!eval(BinaryOp::Or, &f, &f));
        assert!(eval(BinaryOp::And, &t, &t));
        assert!(!eval(BinaryOp::And, &t, &f));
    }

    #[test]
    fn test_custom_binding_lhs_first() {
        let mut left = ObjectValue::new();
        left.bind_operator(BinaryOp::Eq, FunctionRef::new("test", "left"));
        let mut right = ObjectValue::new();
        right.bind_operator(BinaryOp::Eq, FunctionRef::new("test", "right"));
        let (l, r) = (Value::object(left), Value::object(right));

        assert_eq!(custom_binding(BinaryOp::Eq, &l, &r).map(|f| f.name.as_str()), Some("left"));
        assert_eq!(
            custom_binding(BinaryOp::Eq, &Value::from(1i64), &r).map(|f| f.name.as_str()),
            Some("right")
        );
        assert!(custom_binding(BinaryOp::Lt, &l, &r).is_none());
    }

    #[test]
    fn test_symbols() {
        assert_eq!(BinaryOp::InEq.to_string(), "!=");
        assert!(BinaryOp::And.is_logical());
        assert!(!BinaryOp::Gt.is_logical());
    }
}
