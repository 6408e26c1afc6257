// operon-core - Evaluation engine for a JSON query and transformation language
// Copyright (c) 2025 operon contributors
// Licensed under the MIT License

//! # operon-core
//!
//! The evaluation core of a JSON query and transformation language. A parser
//! (not part of this crate) builds an [`Ast`] through its builder methods;
//! the [`Evaluator`] then evaluates it against an input [`Value`].
//!
//! ```
//! use operon_core::{Ast, BinaryOp, Evaluator, Value};
//!
//! let mut ast = Ast::new();
//! let current = ast.current_value();
//! let limit = ast.number(10.0);
//! let check = ast.binary(BinaryOp::Gt, current, limit);
//!
//! let mut evaluator = Evaluator::new();
//! assert_eq!(evaluator.evaluate(&mut ast, check, Value::from(42i64)), Value::Bool(true));
//! ```
//!
//! ## Architecture
//!
//! - `value` / `render` - Value model and its compact, pretty and YAML-like renderings
//! - `error` - Error values and the evaluation failure signal
//! - `ast` - Node arena and per-node evaluation state
//! - `context` - Scope tree holding the ambient current value, path and bindings
//! - `evaluator` - Node evaluation protocol: memoization, scoping, constraints
//! - `operators` - Binary operator rules and custom operator bindings
//! - `path` / `pathset` - Structural paths, traversal, diff, retain and reclude
//! - `functions` / `signature` - Function registry, resolution and built-ins
//! - `config` / `datetime` - Shared configuration and clock built-ins

pub mod ast;
pub mod config;
pub mod context;
pub mod datetime;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod operators;
pub mod path;
pub mod pathset;
pub mod render;
pub mod signature;
pub mod value;

pub use ast::{Ast, NodeId, NodeKind, NodeState};
pub use config::Config;
pub use error::{ErrorCode, ErrorValue, EvalResult, EvaluatorError};
pub use evaluator::Evaluator;
pub use functions::{CallContext, FunctionRef, FunctionRegistry};
pub use operators::BinaryOp;
pub use path::{Path, PathPart};
pub use render::Format;
pub use value::{NumberValue, ObjectValue, Value, ValueKind};
