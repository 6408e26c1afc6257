// Expression evaluator
// Lazy, memoized evaluation of an Ast against an input value.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Ast, Constraint, NodeId, NodeKind, NodeState};
use crate::config::Config;
use crate::context::{ContextTree, ScopeId};
use crate::error::{ErrorCode, ErrorValue, EvalResult, EvaluatorError};
use crate::functions::{CallContext, FunctionRef, FunctionRegistry};
use crate::operators::{self, BinaryOp};
use crate::path::{Path, PathPart};
use crate::render::Format;
use crate::value::{ObjectValue, Value};

/// Evaluator for node trees
///
/// Holds the scope tree of the evaluation in progress, the function registry
/// and the shared configuration. Memoized results live in the [`Ast`] node
/// states, so evaluating the same tree again only redoes the nodes whose value
/// depends on ambient state.
pub struct Evaluator {
    config: Arc<Config>,
    registry: FunctionRegistry,
    globals: HashMap<String, Value>,
    contexts: ContextTree,
    scope: ScopeId,
    recursion_depth: usize,
    max_recursion_depth: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_config(Arc::new(Config::default()))
    }

    pub fn with_config(config: Arc<Config>) -> Self {
        let contexts = ContextTree::new(Value::Null);
        Evaluator {
            max_recursion_depth: config.max_recursion_depth,
            config,
            registry: FunctionRegistry::with_builtins(),
            globals: HashMap::new(),
            scope: contexts.root(),
            contexts,
            recursion_depth: 0,
        }
    }

    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind a variable in the root scope of every evaluation.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    /// The ambient current value (`$`) of the active scope.
    pub fn current_value(&self) -> &Value {
        self.contexts.scope(self.scope).current_value()
    }

    /// The ambient current path (`@`) of the active scope.
    pub fn current_path(&self) -> Option<&Path> {
        self.contexts.scope(self.scope).current_path()
    }

    /// Evaluate `root` against `input`, returning raised errors and stop
    /// signals as `Err`.
    pub fn try_evaluate(&mut self, ast: &mut Ast, root: NodeId, input: Value) -> EvalResult<Value> {
        self.contexts = ContextTree::new(input);
        self.scope = self.contexts.root();
        self.recursion_depth = 0;
        self.contexts.scope_mut(self.scope).current_path = Some(Path::root());
        for (name, value) in &self.globals {
            self.contexts.bind(self.scope, name.clone(), value.clone());
        }
        self.evaluate_node(ast, root)
    }

    /// Evaluate `root` against `input`. A raised error becomes an `Error`
    /// value and a stop signal becomes `End`.
    pub fn evaluate(&mut self, ast: &mut Ast, root: NodeId, input: Value) -> Value {
        match self.try_evaluate(ast, root, input) {
            Ok(value) => value,
            Err(EvaluatorError::Raised(e)) => Value::error(e),
            Err(EvaluatorError::Stopped) => Value::End,
        }
    }

    /// Evaluate a node in the active scope and render the result.
    pub fn render_node(&mut self, ast: &mut Ast, id: NodeId, format: Format) -> EvalResult<String> {
        Ok(self.evaluate_node(ast, id)?.render(format))
    }

    /// Run `f` with the ambient value and path of the active scope replaced,
    /// restoring both afterwards whether or not `f` succeeds.
    pub fn scoped<T>(
        &mut self,
        value: Value,
        path: Option<Path>,
        f: impl FnOnce(&mut Self) -> EvalResult<T>,
    ) -> EvalResult<T> {
        let scope = self.scope;
        let (saved_value, saved_path) = self.contexts.swap_current(scope, value, path);
        let result = f(self);
        self.scope = scope;
        self.contexts.swap_current(scope, saved_value, saved_path);
        result
    }

    fn snapshot(&self) -> (Value, Option<Path>) {
        (self.current_value().clone(), self.current_path().cloned())
    }

    /// Run `f` with `name` bound in the active scope, restoring any previous
    /// binding afterwards.
    fn with_binding<T>(
        &mut self,
        name: &str,
        value: Value,
        f: impl FnOnce(&mut Self) -> EvalResult<T>,
    ) -> EvalResult<T> {
        let scope = self.scope;
        let previous = self.contexts.unbind(scope, name);
        self.contexts.bind(scope, name, value);
        let result = f(self);
        match previous {
            Some(v) => self.contexts.bind(scope, name, v),
            None => {
                self.contexts.unbind(scope, name);
            }
        }
        result
    }

    // ── Node protocol ────────────────────────────────────────────────────────

    /// Evaluate a node, returning its memoized value when it is suppressed.
    pub fn evaluate_node(&mut self, ast: &mut Ast, id: NodeId) -> EvalResult<Value> {
        match ast.state(id) {
            NodeState::Resolved {
                value,
                suppressed: true,
            } => {
                tracing::trace!(node = id.index(), "memoized");
                return Ok(value.clone());
            }
            NodeState::Resolving => {
                return Err(EvaluatorError::raise(
                    ErrorCode::EvaluationCycle,
                    format!("node {} was re-entered during its own evaluation", id.index()),
                ));
            }
            _ => {}
        }

        // Check recursion depth to prevent stack overflow
        self.recursion_depth += 1;
        if self.recursion_depth > self.max_recursion_depth {
            self.recursion_depth -= 1;
            return Err(EvaluatorError::raise(
                ErrorCode::RecursionLimit,
                format!(
                    "maximum recursion depth ({}) exceeded",
                    self.max_recursion_depth
                ),
            ));
        }

        ast.set_state(id, NodeState::Resolving);
        let result = self.evaluate_kind(ast, id);
        self.recursion_depth -= 1;

        match result {
            Ok((value, suppressed)) => {
                ast.set_state(
                    id,
                    NodeState::Resolved {
                        value: value.clone(),
                        suppressed,
                    },
                );
                Ok(value)
            }
            Err(e) => {
                ast.set_state(id, NodeState::Unresolved);
                Err(e)
            }
        }
    }

    /// Value of a node plus whether it may be memoized for good.
    fn evaluate_kind(&mut self, ast: &mut Ast, id: NodeId) -> EvalResult<(Value, bool)> {
        match ast.kind(id).clone() {
            NodeKind::Literal(value) => Ok((value, true)),
            NodeKind::CurrentValue => Ok((self.current_value().clone(), false)),
            NodeKind::CurrentPath => {
                let path = self.current_path().cloned().map_or(Value::Null, Value::path);
                Ok((path, false))
            }
            NodeKind::Variable(name) => {
                let value = self
                    .contexts
                    .lookup(self.scope, &name)
                    .cloned()
                    .ok_or_else(|| {
                        EvaluatorError::lookup_failure(format!("variable ${} is not bound", name))
                    })?;
                Ok((value, false))
            }
            NodeKind::Array(items) => self.evaluate_array(ast, &items),
            NodeKind::Object { pairs, bindings } => self.evaluate_object(ast, &pairs, &bindings),
            NodeKind::Pair {
                key,
                value,
                constraint,
            } => {
                let result = self.evaluate_node(ast, value)?;
                if let Some(constraint) = constraint {
                    self.check_constraint(ast, &constraint, &result, Some(&key))?;
                }
                Ok((result, ast.is_suppressed(value)))
            }
            NodeKind::Constrained { value, constraint } => {
                let result = self.evaluate_node(ast, value)?;
                self.check_constraint(ast, &constraint, &result, None)?;
                Ok((result, ast.is_suppressed(value)))
            }
            NodeKind::Navigate { base, path } => {
                let base_value = self.evaluate_node(ast, base)?;
                Ok((path.resolve_in(&base_value), ast.is_suppressed(base)))
            }
            NodeKind::Binary { op, lhs, rhs } => self.evaluate_binary(ast, op, lhs, rhs),
            NodeKind::Not(operand) => match self.evaluate_node(ast, operand)? {
                Value::Bool(b) => Ok((Value::Bool(!b), ast.is_suppressed(operand))),
                other => Err(EvaluatorError::type_mismatch(format!(
                    "not expects Bool, got {}",
                    other.type_name()
                ))),
            },
            NodeKind::Call {
                namespace,
                name,
                args,
            } => {
                let (snapshot, path) = self.snapshot();
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.scoped(snapshot.clone(), path.clone(), |ev| {
                        ev.evaluate_node(ast, arg)
                    })?);
                }
                Ok((self.call_function(&namespace, &name, values)?, false))
            }
            NodeKind::Block { bindings, body } => {
                let parent = self.scope;
                let child = self.contexts.scope_for(id, parent);
                let (value, path) = self.snapshot();
                self.contexts.swap_current(child, value, path);
                self.scope = child;
                let result = self.evaluate_block(ast, &bindings, body);
                self.scope = parent;
                Ok((result?, false))
            }
        }
    }

    // ── Composites ───────────────────────────────────────────────────────────

    /// The memoized value of a suppressed child, if any.
    fn memoized(ast: &Ast, id: NodeId) -> Option<Value> {
        match ast.state(id) {
            NodeState::Resolved {
                value,
                suppressed: true,
            } => {
                tracing::trace!(node = id.index(), "memoized child");
                Some(value.clone())
            }
            _ => None,
        }
    }

    fn evaluate_array(&mut self, ast: &mut Ast, items: &[NodeId]) -> EvalResult<(Value, bool)> {
        let (snapshot, snapshot_path) = self.snapshot();
        let mut values = Vec::with_capacity(items.len());
        let mut suppressed = true;
        for &item in items {
            let (value, item_suppressed) = match Self::memoized(ast, item) {
                Some(value) => (value, true),
                None => {
                    let path = snapshot_path
                        .as_ref()
                        .map(|p| p.child(PathPart::Position(values.len() + 1)));
                    let value =
                        self.scoped(snapshot.clone(), path, |ev| ev.evaluate_node(ast, item))?;
                    (value, ast.is_suppressed(item))
                }
            };
            if value.is_empty() {
                continue;
            }
            suppressed &= item_suppressed;
            values.push(value);
        }
        Ok((Value::array(values), suppressed))
    }

    fn evaluate_object(
        &mut self,
        ast: &mut Ast,
        pairs: &[NodeId],
        bindings: &[(BinaryOp, FunctionRef)],
    ) -> EvalResult<(Value, bool)> {
        let (snapshot, snapshot_path) = self.snapshot();
        let mut obj = ObjectValue::with_capacity(pairs.len());
        let mut suppressed = true;
        for (i, &pair) in pairs.iter().enumerate() {
            let NodeKind::Pair { key, .. } = ast.kind(pair) else {
                return Err(EvaluatorError::type_mismatch(format!(
                    "object member {} is not a key/value pair",
                    ast.render(pair)
                )));
            };
            let key = key.clone();
            let (value, pair_suppressed) = match Self::memoized(ast, pair) {
                Some(value) => (value, true),
                None => {
                    let siblings = Self::siblings(ast, &obj, &pairs[i + 1..], &key);
                    let path = snapshot_path
                        .as_ref()
                        .map(|p| p.child(PathPart::Key(key.clone())));
                    let value = self.with_binding("_", Value::object(siblings), |ev| {
                        ev.scoped(snapshot.clone(), path, |ev| ev.evaluate_node(ast, pair))
                    })?;
                    (value, ast.is_suppressed(pair))
                }
            };
            if value.is_empty() {
                continue;
            }
            suppressed &= pair_suppressed;
            obj.insert(key, value)?;
        }
        for (op, handler) in bindings {
            obj.bind_operator(*op, handler.clone());
        }
        Ok((Value::object(obj), suppressed))
    }

    /// The enclosing object as seen from one of its pairs: the pairs resolved
    /// so far plus later pairs that already hold a value, minus `key`.
    fn siblings(ast: &Ast, resolved: &ObjectValue, later: &[NodeId], key: &str) -> ObjectValue {
        let mut siblings = resolved.clone();
        for &pair in later {
            if let (NodeKind::Pair { key: k, .. }, Some(value)) =
                (ast.kind(pair), ast.resolved_value(pair))
            {
                if !value.is_empty() && !siblings.contains_key(k) {
                    siblings.set(k.clone(), value.clone());
                }
            }
        }
        siblings.remove(key);
        siblings
    }

    fn evaluate_block(
        &mut self,
        ast: &mut Ast,
        bindings: &[(String, NodeId)],
        body: NodeId,
    ) -> EvalResult<Value> {
        for (name, node) in bindings {
            let value = self.evaluate_node(ast, *node)?;
            self.contexts.bind(self.scope, name.clone(), value);
        }
        self.evaluate_node(ast, body)
    }

    // ── Operators ────────────────────────────────────────────────────────────

    fn evaluate_binary(
        &mut self,
        ast: &mut Ast,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> EvalResult<(Value, bool)> {
        // Each side sees its own fork of the ambient value.
        let (snapshot, path) = self.snapshot();
        let left = self.scoped(snapshot.clone(), path.clone(), |ev| ev.evaluate_node(ast, lhs))?;
        let left_suppressed = ast.is_suppressed(lhs);

        let left_binds = left
            .as_object()
            .is_some_and(|obj| obj.operator_binding(op).is_some());
        if op == BinaryOp::And && !left.is_true() && !left_binds {
            return Ok((Value::Bool(false), left_suppressed));
        }

        let right = self.scoped(snapshot, path, |ev| ev.evaluate_node(ast, rhs))?;

        if let Some(handler) = operators::custom_binding(op, &left, &right).cloned() {
            tracing::debug!(operator = %op, handler = %handler, "custom operator binding");
            let result = self.call_function(&handler.namespace, &handler.name, vec![left, right])?;
            return Ok((result, false));
        }

        let result = operators::apply(op, &left, &right)?;
        Ok((result, left_suppressed && ast.is_suppressed(rhs)))
    }

    fn call_function(&self, namespace: &str, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let scope = self.contexts.scope(self.scope);
        let ctx = CallContext {
            current: scope.current_value(),
            current_path: scope.current_path(),
            config: &self.config,
        };
        self.registry.invoke(&ctx, namespace, name, args)
    }

    // ── Constraints ──────────────────────────────────────────────────────────

    /// Evaluate a constraint predicate with the constrained value as `$`.
    ///
    /// A non-boolean result is mapped to a boolean once. A raised error counts
    /// as a violation; a stop signal propagates.
    fn check_constraint(
        &mut self,
        ast: &mut Ast,
        constraint: &Constraint,
        value: &Value,
        field: Option<&str>,
    ) -> EvalResult<()> {
        let path = self.current_path().cloned();
        let outcome = self.scoped(value.clone(), path, |ev| {
            ev.evaluate_node(ast, constraint.predicate)
        });
        let holds = match outcome {
            Ok(Value::Bool(b)) => b,
            Ok(other) => other.mappable_to_boolean() == Some(true),
            Err(EvaluatorError::Stopped) => return Err(EvaluatorError::Stopped),
            Err(EvaluatorError::Raised(e)) => {
                tracing::debug!(code = %e.code, "constraint predicate raised");
                false
            }
        };
        if holds {
            return Ok(());
        }

        let subject = match field {
            Some(key) => format!("Field \"{}\"", key),
            None => format!("Value {}", value),
        };
        tracing::debug!(subject = %subject, constraint = %constraint.source, "constraint violated");
        Err(EvaluatorError::Raised(
            ErrorValue::new(
                ErrorCode::ConstraintViolation,
                format!("{} violates constraint: {}", subject, constraint.source),
            )
            .with_json(value.clone()),
        ))
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{ParamType, Signature};
    use crate::value;

    #[test]
    fn test_evaluate_literals() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();

        let s = ast.string("hello");
        assert_eq!(evaluator.evaluate(&mut ast, s, Value::Null), Value::from("hello"));

        let n = ast.number(42.0);
        assert_eq!(evaluator.evaluate(&mut ast, n, Value::Null), Value::from(42i64));

        let b = ast.boolean(true);
        assert_eq!(evaluator.evaluate(&mut ast, b, Value::Null), Value::Bool(true));
        assert!(ast.is_suppressed(b));
    }

    #[test]
    fn test_current_value_and_variables() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        evaluator.bind("x", Value::from(100i64));

        let current = ast.current_value();
        assert_eq!(evaluator.evaluate(&mut ast, current, Value::from("in")), Value::from("in"));
        assert!(!ast.is_suppressed(current));

        let x = ast.variable("x");
        assert_eq!(evaluator.evaluate(&mut ast, x, Value::Null), Value::from(100i64));

        let missing = ast.variable("undefined");
        let err = evaluator.try_evaluate(&mut ast, missing, Value::Null).unwrap_err();
        assert!(err.has_code(ErrorCode::LookupFailure));
    }

    #[test]
    fn test_literal_composite_is_memoized() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let one = ast.number(1.0);
        let two = ast.number(2.0);
        let arr = ast.array(vec![one, two]);

        assert_eq!(evaluator.evaluate(&mut ast, arr, Value::Null), value!([1, 2]));
        assert!(ast.is_suppressed(arr));

        // a suppressed node never looks at its children again
        ast.set_state(
            one,
            NodeState::Resolved {
                value: Value::from("changed"),
                suppressed: true,
            },
        );
        assert_eq!(evaluator.evaluate(&mut ast, arr, Value::Null), value!([1, 2]));
    }

    #[test]
    fn test_ambient_composite_is_re_evaluated() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let one = ast.number(1.0);
        let current = ast.current_value();
        let arr = ast.array(vec![one, current]);

        assert_eq!(evaluator.evaluate(&mut ast, arr, Value::from("a")), value!([1, "a"]));
        assert!(!ast.is_suppressed(arr));
        assert!(ast.is_suppressed(one));
        assert_eq!(evaluator.evaluate(&mut ast, arr, Value::from("b")), value!([1, "b"]));
    }

    #[test]
    fn test_empty_collapses() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let one = ast.number(1.0);
        let nothing = ast.literal(Value::array(vec![]));
        let first = ast.call("array", "first", vec![nothing]);
        let two = ast.number(2.0);
        let arr = ast.array(vec![one, first, two]);
        let result = evaluator.evaluate(&mut ast, arr, Value::Null);
        assert_eq!(result, value!([1, 2]));
        assert_eq!(result.to_string(), "[1,2]");

        let empty = ast.literal(Value::Empty);
        let pair = ast.pair("gone", empty);
        let three = ast.number(3.0);
        let kept = ast.pair("kept", three);
        let obj = ast.object(vec![pair, kept]);
        assert_eq!(evaluator.evaluate(&mut ast, obj, Value::Null), value!({"kept": 3}));
    }

    #[test]
    fn test_scope_restored_after_failing_child() {
        let mut evaluator = Evaluator::new();
        let result: EvalResult<()> = evaluator.scoped(Value::from("inner"), None, |ev| {
            assert_eq!(ev.current_value(), &Value::from("inner"));
            Err(EvaluatorError::lookup_failure("boom"))
        });
        assert!(result.is_err());
        assert_eq!(evaluator.current_value(), &Value::Null);

        let mut ast = Ast::new();
        let code = ast.string("E1");
        let message = ast.string("fail");
        let failing = ast.call("core", "error", vec![code, message]);
        let current = ast.current_value();
        let arr = ast.array(vec![current, failing]);
        let err = evaluator.try_evaluate(&mut ast, arr, Value::from(5i64)).unwrap_err();
        assert_eq!(err.error_value().map(|e| e.code.as_str()), Some("E1"));
        assert_eq!(evaluator.current_value(), &Value::from(5i64));
        assert_eq!(evaluator.current_path(), Some(&Path::root()));
        assert_eq!(ast.state(arr), &NodeState::Unresolved);
    }

    #[test]
    fn test_constraint_violation_names_field() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let age = ast.number(-5.0);
        let current = ast.current_value();
        let zero = ast.number(0.0);
        let positive = ast.binary(BinaryOp::Gt, current, zero);
        let pair = ast.constrained_pair("age", age, positive, "$ > 0");
        let obj = ast.object(vec![pair]);

        let err = evaluator.try_evaluate(&mut ast, obj, Value::Null).unwrap_err();
        let e = err.error_value().unwrap();
        assert!(e.has_code(ErrorCode::ConstraintViolation));
        assert_eq!(e.message, "Field \"age\" violates constraint: $ > 0");
        assert_eq!(e.json, Some(Value::from(-5.0)));

        let result = evaluator.evaluate(&mut ast, obj, Value::Null);
        assert!(result.is_error());
    }

    #[test]
    fn test_constraint_predicate_error_is_violation() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let five = ast.number(5.0);
        let current = ast.current_value();
        let text = ast.string("x");
        let bad = ast.binary(BinaryOp::Gt, current, text);
        let constrained = ast.constrained(five, bad, "$ > \"x\"");
        let err = evaluator.try_evaluate(&mut ast, constrained, Value::Null).unwrap_err();
        assert!(err.has_code(ErrorCode::ConstraintViolation));
        assert!(err.to_string().contains("Value 5 violates constraint"));
    }

    #[test]
    fn test_constraint_maps_to_boolean() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let five = ast.number(5.0);
        let yes = ast.string("TRUE");
        let constrained = ast.constrained(five, yes, "\"TRUE\"");
        assert_eq!(evaluator.evaluate(&mut ast, constrained, Value::Null), Value::from(5i64));

        let six = ast.number(6.0);
        let maybe = ast.string("maybe");
        let constrained = ast.constrained(six, maybe, "\"maybe\"");
        let err = evaluator.try_evaluate(&mut ast, constrained, Value::Null).unwrap_err();
        assert!(err.has_code(ErrorCode::ConstraintViolation));
    }

    #[test]
    fn test_stop_in_constraint_propagates() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let five = ast.number(5.0);
        let stop = ast.call("core", "stop", vec![]);
        let constrained = ast.constrained(five, stop, "stop()");
        assert!(matches!(
            evaluator.try_evaluate(&mut ast, constrained, Value::Null),
            Err(EvaluatorError::Stopped)
        ));
        assert_eq!(evaluator.evaluate(&mut ast, constrained, Value::Null), Value::End);
    }

    #[test]
    fn test_pair_sees_siblings_through_underscore() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let ten = ast.number(10.0);
        let price = ast.pair("price", ten);
        let underscore = ast.variable("_");
        let total_value = ast.navigate(underscore, Path::parse(".price").unwrap());
        let total = ast.pair("total", total_value);
        let obj = ast.object(vec![price, total]);

        assert_eq!(
            evaluator.evaluate(&mut ast, obj, Value::Null),
            value!({"price": 10, "total": 10})
        );
        // `_` does not leak out of the object
        let outside = ast.variable("_");
        assert!(evaluator.try_evaluate(&mut ast, outside, Value::Null).is_err());
    }

    #[test]
    fn test_underscore_excludes_own_pair() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let one = ast.number(1.0);
        let a = ast.pair("a", one);
        let underscore = ast.variable("_");
        let b = ast.pair("b", underscore);
        let obj = ast.object(vec![a, b]);

        let result = evaluator.evaluate(&mut ast, obj, Value::Null);
        assert_eq!(result, value!({"a": 1, "b": {"a": 1}}));
        assert!(result.get("b").and_then(|b| b.get("b")).is_none());
    }

    #[test]
    fn test_self_reference_through_underscore_is_dropped() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let underscore = ast.variable("_");
        let own = ast.navigate(underscore, Path::parse(".a").unwrap());
        let a = ast.pair("a", own);
        let obj = ast.object(vec![a]);

        assert_eq!(evaluator.evaluate(&mut ast, obj, Value::Null), value!({}));
    }

    #[test]
    fn test_duplicate_key() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let one = ast.number(1.0);
        let two = ast.number(2.0);
        let a1 = ast.pair("a", one);
        let a2 = ast.pair("a", two);
        let obj = ast.object(vec![a1, a2]);
        let err = evaluator.try_evaluate(&mut ast, obj, Value::Null).unwrap_err();
        assert!(err.has_code(ErrorCode::DuplicateKey));
    }

    #[test]
    fn test_current_path_tracks_position() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let at = ast.current_path();
        let arr = ast.array(vec![at]);
        let pair = ast.pair("a", arr);
        let obj = ast.object(vec![pair]);
        let result = evaluator.evaluate(&mut ast, obj, Value::Null);
        let path = result
            .get("a")
            .and_then(|a| a.get_index(0))
            .and_then(Value::as_path)
            .cloned();
        assert_eq!(path, Some(Path::parse(".a[1]").unwrap()));
    }

    #[test]
    fn test_and_short_circuits() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let f = ast.boolean(false);
        let code = ast.string("E1");
        let message = ast.string("never");
        let failing = ast.call("core", "error", vec![code, message]);
        let and = ast.binary(BinaryOp::And, f, failing);
        assert_eq!(evaluator.evaluate(&mut ast, and, Value::Null), Value::Bool(false));

        let t = ast.boolean(true);
        let fails = ast.binary(BinaryOp::Or, t, failing);
        assert!(evaluator.evaluate(&mut ast, fails, Value::Null).is_error());
    }

    #[test]
    fn test_operand_scopes_are_independent() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let lhs = ast.current_value();
        let rhs = ast.current_value();
        let eq = ast.binary(BinaryOp::Eq, lhs, rhs);
        assert_eq!(evaluator.evaluate(&mut ast, eq, Value::from(3i64)), Value::Bool(true));
        assert_eq!(evaluator.current_value(), &Value::from(3i64));
    }

    #[test]
    fn test_custom_operator_binding() {
        fn always(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
            Ok(Value::from(format!("{} vs {}", args[0].type_name(), args[1].type_name())))
        }
        let mut evaluator = Evaluator::new();
        evaluator.registry_mut().register(
            "test",
            "compare",
            Signature::new(vec![ParamType::Any, ParamType::Any], ParamType::String),
            always,
        );

        let mut ast = Ast::new();
        let obj = ast.object_with_bindings(
            vec![],
            vec![(BinaryOp::Eq, FunctionRef::new("test", "compare"))],
        );
        let one = ast.number(1.0);
        let eq = ast.binary(BinaryOp::Eq, obj, one);
        assert_eq!(
            evaluator.evaluate(&mut ast, eq, Value::Null),
            Value::from("Object vs Number")
        );

        // without the binding the same pairing is a type error
        let plain = ast.object(vec![]);
        let two = ast.number(2.0);
        let eq = ast.binary(BinaryOp::Eq, plain, two);
        let err = evaluator.try_evaluate(&mut ast, eq, Value::Null).unwrap_err();
        assert!(err.has_code(ErrorCode::TypeMismatch));
    }

    #[test]
    fn test_block_scope() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let two = ast.number(2.0);
        let x_ref = ast.variable("x");
        let x_body = ast.variable("x");
        let y_body = ast.variable("y");
        let body = ast.array(vec![x_body, y_body]);
        let block = ast.block(vec![("x", two), ("y", x_ref)], body);
        assert_eq!(evaluator.evaluate(&mut ast, block, Value::Null), value!([2, 2]));

        let outside = ast.variable("y");
        let err = evaluator.try_evaluate(&mut ast, outside, Value::Null).unwrap_err();
        assert!(err.has_code(ErrorCode::LookupFailure));
    }

    #[test]
    fn test_block_inherits_current_value() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let current = ast.current_value();
        let count = ast.call("", "count", vec![]);
        let block = ast.block(vec![("c", count)], current);
        assert_eq!(evaluator.evaluate(&mut ast, block, value!([1, 2])), value!([1, 2]));
    }

    #[test]
    fn test_cycle_detected() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let arr = ast.array(vec![]);
        ast.set_kind(arr, NodeKind::Array(vec![arr]));
        let err = evaluator.try_evaluate(&mut ast, arr, Value::Null).unwrap_err();
        assert!(err.has_code(ErrorCode::EvaluationCycle));
    }

    #[test]
    fn test_recursion_limit() {
        let config = Config {
            max_recursion_depth: 3,
            ..Config::default()
        };
        let mut evaluator = Evaluator::with_config(Arc::new(config));
        let mut ast = Ast::new();
        let mut node = ast.number(1.0);
        for _ in 0..5 {
            node = ast.array(vec![node]);
        }
        let err = evaluator.try_evaluate(&mut ast, node, Value::Null).unwrap_err();
        assert!(err.has_code(ErrorCode::RecursionLimit));
    }

    #[test]
    fn test_disabled_operation_becomes_error_value() {
        let config = Config::default().disable("core:now");
        let mut evaluator = Evaluator::with_config(Arc::new(config));
        let mut ast = Ast::new();
        let now = ast.call("", "now", vec![]);
        let result = evaluator.evaluate(&mut ast, now, Value::Null);
        assert!(result.as_error().is_some_and(|e| e.has_code(ErrorCode::OperationDisabled)));
    }

    #[test]
    fn test_not() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let f = ast.boolean(false);
        let not = ast.not(f);
        assert_eq!(evaluator.evaluate(&mut ast, not, Value::Null), Value::Bool(true));
        let n = ast.number(1.0);
        let bad = ast.not(n);
        assert!(evaluator.evaluate(&mut ast, bad, Value::Null).is_error());
    }

    #[test]
    fn test_render_node() {
        let mut ast = Ast::new();
        let mut evaluator = Evaluator::new();
        let one = ast.number(1.0);
        let pair = ast.pair("a", one);
        let obj = ast.object(vec![pair]);
        assert_eq!(
            evaluator.render_node(&mut ast, obj, Format::Pretty { indent: 2 }).unwrap(),
            "{\n  \"a\": 1\n}"
        );
        assert_eq!(evaluator.render_node(&mut ast, obj, Format::Yaml).unwrap(), "a: 1");
    }
}
