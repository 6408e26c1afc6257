// Error values and the evaluation failure signal
// An error is an ordinary Value variant; raising one is an `Err` carrying it.

use std::fmt;

use thiserror::Error;

use crate::render::escape_json_string;
use crate::value::Value;

/// Error codes raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Operator or function applied to incompatible operand types.
    TypeMismatch,
    /// A constraint predicate did not hold.
    ConstraintViolation,
    /// A path traversal needed a root link that is absent.
    PathUnlinked,
    /// Key or index absent on update/rename/remove or variable lookup.
    LookupFailure,
    /// Text could not be parsed (path notation, number literals).
    ParseFailure,
    /// Opaque failure from an I/O component at the tree boundary.
    ComponentFailure,
    /// A key was inserted twice into the same object.
    DuplicateKey,
    /// No function matches the requested name and arity.
    UnknownFunction,
    /// The operation is disabled by configuration.
    OperationDisabled,
    /// A node was re-entered while it was being evaluated.
    EvaluationCycle,
    /// Evaluation nested deeper than the configured limit.
    RecursionLimit,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::PathUnlinked => "PATH_UNLINKED",
            ErrorCode::LookupFailure => "LOOKUP_FAILURE",
            ErrorCode::ParseFailure => "PARSE_FAILURE",
            ErrorCode::ComponentFailure => "COMPONENT_FAILURE",
            ErrorCode::DuplicateKey => "DUPLICATE_KEY",
            ErrorCode::UnknownFunction => "UNKNOWN_FUNCTION",
            ErrorCode::OperationDisabled => "OPERATION_DISABLED",
            ErrorCode::EvaluationCycle => "EVALUATION_CYCLE",
            ErrorCode::RecursionLimit => "RECURSION_LIMIT",
        }
    }

    /// The error family reported in the `type` field.
    pub fn family(&self) -> &'static str {
        match self {
            ErrorCode::TypeMismatch => "Type",
            ErrorCode::ConstraintViolation => "Constraint",
            ErrorCode::PathUnlinked => "Path",
            ErrorCode::LookupFailure => "Lookup",
            ErrorCode::ParseFailure => "Parse",
            ErrorCode::ComponentFailure => "Component",
            ErrorCode::DuplicateKey => "Structure",
            ErrorCode::UnknownFunction => "Function",
            ErrorCode::OperationDisabled => "Config",
            ErrorCode::EvaluationCycle | ErrorCode::RecursionLimit => "Evaluation",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload of `Value::Error`.
///
/// `code` and `error_type` are free-form strings so that user code can raise
/// its own errors; engine errors use the strings of an [`ErrorCode`].
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub json: Option<Value>,
}

impl ErrorValue {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ErrorValue {
            code: code.as_str().to_string(),
            error_type: code.family().to_string(),
            message: message.into(),
            json: None,
        }
    }

    pub fn custom(
        code: impl Into<String>,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ErrorValue {
            code: code.into(),
            error_type: error_type.into(),
            message: message.into(),
            json: None,
        }
    }

    pub fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }

    #[inline]
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.code == code.as_str()
    }
}

/// `Error("code": "...", "type": "...", "message": "..."[, "json": ...])`
impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error(\"code\": \"{}\", \"type\": \"{}\", \"message\": \"{}\"",
            escape_json_string(&self.code),
            escape_json_string(&self.error_type),
            escape_json_string(&self.message)
        )?;
        if let Some(json) = &self.json {
            write!(f, ", \"json\": {}", json)?;
        }
        write!(f, ")")
    }
}

/// Why an evaluation did not produce a value.
#[derive(Error, Debug, Clone)]
pub enum EvaluatorError {
    /// An error value was raised and is propagating to the statement boundary.
    #[error("{0}")]
    Raised(ErrorValue),

    /// Evaluation was terminated by a stop signal. Not an error value.
    #[error("evaluation stopped")]
    Stopped,
}

pub type EvalResult<T> = Result<T, EvaluatorError>;

impl EvaluatorError {
    pub fn raise(code: ErrorCode, message: impl Into<String>) -> Self {
        EvaluatorError::Raised(ErrorValue::new(code, message))
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::raise(ErrorCode::TypeMismatch, message)
    }

    pub fn lookup_failure(message: impl Into<String>) -> Self {
        Self::raise(ErrorCode::LookupFailure, message)
    }

    pub fn path_unlinked(path: &crate::path::Path) -> Self {
        Self::raise(
            ErrorCode::PathUnlinked,
            format!("path {} is not linked to a root value", path),
        )
    }

    pub fn duplicate_key(key: &str) -> Self {
        Self::raise(
            ErrorCode::DuplicateKey,
            format!("key \"{}\" already exists in object", key),
        )
    }

    /// The error value carried, if this is not a stop signal.
    pub fn error_value(&self) -> Option<&ErrorValue> {
        match self {
            EvaluatorError::Raised(e) => Some(e),
            EvaluatorError::Stopped => None,
        }
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.error_value().is_some_and(|e| e.has_code(code))
    }
}

impl From<ErrorValue> for EvaluatorError {
    fn from(e: ErrorValue) -> Self {
        EvaluatorError::Raised(e)
    }
}
