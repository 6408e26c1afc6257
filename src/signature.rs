// Function signatures and argument type checking

use std::fmt;

use thiserror::Error;

use crate::error::{ErrorCode, EvaluatorError};
use crate::value::{Value, ValueKind};

/// Signature validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    #[error("Argument count mismatch: {function} expects {expected}, got {actual}")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("Type mismatch: argument {position} of {function} expects {expected}, got {actual}")]
    ArgumentType {
        function: String,
        position: usize,
        expected: ParamType,
        actual: ValueKind,
    },

    #[error("Type mismatch: {function} expected one of {expected} but got {actual}")]
    ExpectedOneOf {
        function: String,
        expected: String,
        actual: ValueKind,
    },
}

impl From<SignatureError> for EvaluatorError {
    fn from(e: SignatureError) -> Self {
        EvaluatorError::raise(ErrorCode::TypeMismatch, e.to_string())
    }
}

/// Parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Any,
    Bool,
    Number,
    String,
    Array,
    Object,
    Path,
    /// Array or object
    Composite,
}

impl ParamType {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::Any => true,
            ParamType::Bool => value.is_bool(),
            ParamType::Number => value.is_number(),
            ParamType::String => value.is_string(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Path => value.is_path(),
            ParamType::Composite => !value.is_atomic(),
        }
    }

    /// The value kind this parameter type selects, for runtime dispatch.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            ParamType::Bool => Some(ValueKind::Bool),
            ParamType::Number => Some(ValueKind::Number),
            ParamType::String => Some(ValueKind::String),
            ParamType::Array => Some(ValueKind::Array),
            ParamType::Object => Some(ValueKind::Object),
            ParamType::Path => Some(ValueKind::Path),
            ParamType::Any | ParamType::Composite => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{}", kind),
            None if *self == ParamType::Composite => f.write_str("Array or Object"),
            None => f.write_str("Any"),
        }
    }
}

/// Function signature
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<ParamType>,
    pub return_type: ParamType,
}

impl Signature {
    pub fn new(params: Vec<ParamType>, return_type: ParamType) -> Self {
        Signature {
            params,
            return_type,
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check argument count and types.
    pub fn validate(&self, function: &str, args: &[Value]) -> Result<(), SignatureError> {
        if args.len() != self.params.len() {
            return Err(SignatureError::ArgumentCountMismatch {
                function: function.to_string(),
                expected: self.params.len(),
                actual: args.len(),
            });
        }
        for (i, (param, arg)) in self.params.iter().zip(args).enumerate() {
            if !param.accepts(arg) {
                return Err(SignatureError::ArgumentType {
                    function: function.to_string(),
                    position: i + 1,
                    expected: *param,
                    actual: arg.kind(),
                });
            }
        }
        Ok(())
    }
}
