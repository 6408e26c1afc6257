// Function registry, call resolution, and the built-in catalog
// Functions are keyed by (namespace, name, arity).

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ErrorCode, ErrorValue, EvalResult, EvaluatorError};
use crate::path::Path;
use crate::signature::{ParamType, Signature, SignatureError};
use crate::value::{Value, ValueKind};

/// Namespace the resolver falls back to for unqualified names.
pub const CORE_NAMESPACE: &str = "core";

/// Unqualified names resolved by the runtime type of their subject.
const GENERIC_NAMES: &[&str] = &["count", "isEmpty", "reverse", "first", "last"];

/// Namespaces a generic call can land in, by subject type.
const DISPATCH_NAMESPACES: &[(&str, ValueKind)] = &[
    ("array", ValueKind::Array),
    ("object", ValueKind::Object),
    ("string", ValueKind::String),
    ("path", ValueKind::Path),
];

/// A reference to a function by namespace and name, as stored in operator
/// bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionRef {
    pub namespace: String,
    pub name: String,
}

impl FunctionRef {
    pub fn new(namespace: &str, name: &str) -> Self {
        FunctionRef {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", qualified(&self.namespace, &self.name))
    }
}

fn qualified(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}:{}", namespace, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    pub namespace: String,
    pub name: String,
    pub arity: usize,
}

/// What a native function sees of the evaluation.
pub struct CallContext<'a> {
    pub current: &'a Value,
    pub current_path: Option<&'a Path>,
    pub config: &'a Config,
}

pub type NativeFn = fn(&CallContext<'_>, &[Value]) -> EvalResult<Value>;

#[derive(Clone)]
pub struct FunctionDef {
    pub signature: Signature,
    pub func: NativeFn,
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("signature", &self.signature)
            .finish()
    }
}

/// Dispatch table from (namespace, name, arity) to native functions.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<FunctionKey, FunctionDef>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in catalog.
    pub fn with_builtins() -> Self {
        use ParamType as P;

        let table: &[(&str, &str, &[ParamType], ParamType, NativeFn)] = &[
            ("array", "count", &[P::Array], P::Number, array::count),
            ("array", "isEmpty", &[P::Array], P::Bool, array::is_empty),
            ("array", "reverse", &[P::Array], P::Array, array::reverse),
            ("array", "first", &[P::Array], P::Any, array::first),
            ("array", "last", &[P::Array], P::Any, array::last),
            ("object", "count", &[P::Object], P::Number, object::count),
            ("object", "isEmpty", &[P::Object], P::Bool, object::is_empty),
            ("object", "keys", &[P::Object], P::Array, object::keys),
            ("object", "values", &[P::Object], P::Array, object::values),
            ("object", "remove", &[P::Object, P::String], P::Object, object::remove),
            ("object", "rename", &[P::Object, P::String, P::String], P::Object, object::rename),
            ("object", "update", &[P::Object, P::String, P::Any], P::Object, object::update),
            ("string", "count", &[P::String], P::Number, string::count),
            ("string", "isEmpty", &[P::String], P::Bool, string::is_empty),
            ("string", "reverse", &[P::String], P::String, string::reverse),
            ("string", "upper", &[P::String], P::String, string::upper),
            ("string", "lower", &[P::String], P::String, string::lower),
            ("path", "count", &[P::Path], P::Number, path::count),
            ("path", "parse", &[P::String], P::Path, path::parse),
            ("path", "value", &[P::Path], P::Any, path::value),
            ("path", "parent", &[P::Path], P::Path, path::parent),
            ("path", "subPath", &[P::Path, P::Number], P::Path, path::sub_path),
            ("path", "commonSubPath", &[P::Path, P::Path], P::Path, path::common_sub_path),
            ("path", "pos", &[P::Path], P::Number, path::pos),
            ("path", "next", &[P::Path], P::Path, path::next),
            ("path", "previous", &[P::Path], P::Path, path::previous),
            ("path", "linkRoot", &[P::Path, P::Any], P::Path, path::link_root),
            ("path", "paths", &[P::Any], P::Array, path::paths),
            ("core", "diff", &[P::Any, P::Any], P::Array, common::diff),
            ("core", "retain", &[P::Array], P::Any, common::retain_linked),
            ("core", "retain", &[P::Any, P::Array], P::Any, common::retain),
            ("core", "reclude", &[P::Array], P::Any, common::reclude_linked),
            ("core", "reclude", &[P::Any, P::Array], P::Any, common::reclude),
            ("core", "boolean", &[P::Any], P::Bool, common::boolean),
            ("core", "type", &[P::Any], P::String, common::type_of),
            ("core", "error", &[P::String, P::String], P::Any, common::error),
            ("core", "error", &[P::String, P::String, P::Any], P::Any, common::error),
            ("core", "wait", &[P::Number], P::Any, common::wait),
            ("core", "stop", &[], P::Any, common::stop),
            ("core", "now", &[], P::String, common::now),
            ("core", "millis", &[], P::Number, common::millis),
        ];

        let mut registry = FunctionRegistry::new();
        for (namespace, name, params, return_type, func) in table {
            registry.register(
                namespace,
                name,
                Signature::new(params.to_vec(), *return_type),
                *func,
            );
        }
        registry
    }

    /// Add or replace a function. Its arity is the signature's length.
    pub fn register(&mut self, namespace: &str, name: &str, signature: Signature, func: NativeFn) {
        let key = FunctionKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
            arity: signature.arity(),
        };
        self.functions.insert(key, FunctionDef { signature, func });
    }

    pub fn get(&self, namespace: &str, name: &str, arity: usize) -> Option<&FunctionDef> {
        self.functions.get(&FunctionKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
            arity,
        })
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Resolve and call a function.
    ///
    /// Resolution order: exact `(namespace, name, arity)`; for an empty
    /// namespace, generic names re-dispatch on the type of their subject (the
    /// first argument, or the current value when there is none), and other
    /// names fall back to `core`.
    pub fn invoke(
        &self,
        ctx: &CallContext<'_>,
        namespace: &str,
        name: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        check_enabled(ctx.config, namespace, name)?;

        if let Some(def) = self.get(namespace, name, args.len()) {
            return call(def, namespace, name, ctx, &args);
        }
        if namespace.is_empty() {
            if GENERIC_NAMES.contains(&name) {
                return self.redispatch(ctx, name, args);
            }
            if let Some(def) = self.get(CORE_NAMESPACE, name, args.len()) {
                check_enabled(ctx.config, CORE_NAMESPACE, name)?;
                return call(def, CORE_NAMESPACE, name, ctx, &args);
            }
        }
        Err(EvaluatorError::raise(
            ErrorCode::UnknownFunction,
            format!("unknown function {}/{}", qualified(namespace, name), args.len()),
        ))
    }

    fn redispatch(&self, ctx: &CallContext<'_>, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let args = if args.is_empty() {
            vec![ctx.current.clone()]
        } else {
            args
        };
        let subject = args[0].kind();
        let candidates: Vec<&(&str, ValueKind)> = DISPATCH_NAMESPACES
            .iter()
            .filter(|(ns, _)| self.get(ns, name, args.len()).is_some())
            .collect();

        let target = candidates.iter().find(|(_, kind)| *kind == subject);
        match target.and_then(|(ns, _)| self.get(ns, name, args.len()).map(|def| (*ns, def))) {
            Some((namespace, def)) => {
                tracing::debug!(
                    function = name,
                    namespace,
                    subject = %subject,
                    "generic re-dispatch"
                );
                check_enabled(ctx.config, namespace, name)?;
                call(def, namespace, name, ctx, &args)
            }
            None => {
                let expected: Vec<&str> = candidates.iter().map(|(_, kind)| kind.name()).collect();
                Err(SignatureError::ExpectedOneOf {
                    function: name.to_string(),
                    expected: expected.join(", "),
                    actual: subject,
                }
                .into())
            }
        }
    }
}

fn check_enabled(config: &Config, namespace: &str, name: &str) -> EvalResult<()> {
    if config.is_disabled(namespace, name) {
        tracing::debug!(function = %qualified(namespace, name), "disabled operation");
        return Err(EvaluatorError::raise(
            ErrorCode::OperationDisabled,
            format!("operation {} is disabled", qualified(namespace, name)),
        ));
    }
    Ok(())
}

fn call(
    def: &FunctionDef,
    namespace: &str,
    name: &str,
    ctx: &CallContext<'_>,
    args: &[Value],
) -> EvalResult<Value> {
    def.signature.validate(&qualified(namespace, name), args)?;
    (def.func)(ctx, args)
}

// ── Argument access ──────────────────────────────────────────────────────────
// Signatures are validated before a native function runs; these only guard
// direct calls.

fn arg(args: &[Value], i: usize) -> EvalResult<&Value> {
    args.get(i)
        .ok_or_else(|| EvaluatorError::type_mismatch(format!("missing argument {}", i + 1)))
}

fn arg_error(args: &[Value], i: usize, expected: &str) -> EvaluatorError {
    let actual = args.get(i).map_or("nothing", |v| v.type_name());
    EvaluatorError::type_mismatch(format!(
        "argument {} must be {}, got {}",
        i + 1,
        expected,
        actual
    ))
}

fn array_arg(args: &[Value], i: usize) -> EvalResult<&Vec<Value>> {
    args.get(i)
        .and_then(Value::as_array)
        .ok_or_else(|| arg_error(args, i, "Array"))
}

fn object_arg(args: &[Value], i: usize) -> EvalResult<&crate::value::ObjectValue> {
    args.get(i)
        .and_then(Value::as_object)
        .ok_or_else(|| arg_error(args, i, "Object"))
}

fn str_arg(args: &[Value], i: usize) -> EvalResult<&str> {
    args.get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| arg_error(args, i, "String"))
}

fn path_arg(args: &[Value], i: usize) -> EvalResult<&Path> {
    args.get(i)
        .and_then(Value::as_path)
        .ok_or_else(|| arg_error(args, i, "Path"))
}

fn int_arg(args: &[Value], i: usize) -> EvalResult<i64> {
    args.get(i)
        .and_then(Value::as_i64)
        .ok_or_else(|| arg_error(args, i, "an integer"))
}

/// Built-in array functions
pub mod array {
    use super::*;

    pub fn count(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(array_arg(args, 0)?.len()))
    }

    pub fn is_empty(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::Bool(array_arg(args, 0)?.is_empty()))
    }

    pub fn reverse(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::array(array_arg(args, 0)?.iter().rev().cloned().collect()))
    }

    /// First element, or `Empty` for an empty array.
    pub fn first(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(array_arg(args, 0)?.first().cloned().unwrap_or(Value::Empty))
    }

    pub fn last(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(array_arg(args, 0)?.last().cloned().unwrap_or(Value::Empty))
    }
}

/// Built-in object functions
pub mod object {
    use super::*;

    pub fn count(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(object_arg(args, 0)?.len()))
    }

    pub fn is_empty(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::Bool(object_arg(args, 0)?.is_empty()))
    }

    pub fn keys(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let keys = object_arg(args, 0)?.keys().map(|k| Value::from(k.as_str())).collect();
        Ok(Value::array(keys))
    }

    pub fn values(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::array(object_arg(args, 0)?.values().cloned().collect()))
    }

    /// A copy of the object without `key`; the key must exist.
    pub fn remove(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let mut obj = object_arg(args, 0)?.clone();
        let key = str_arg(args, 1)?;
        if obj.remove(key).is_none() {
            return Err(EvaluatorError::lookup_failure(format!(
                "cannot remove missing key \"{}\"",
                key
            )));
        }
        Ok(Value::object(obj))
    }

    pub fn rename(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let mut obj = arg(args, 0)?.clone();
        obj.rename_key(str_arg(args, 1)?, str_arg(args, 2)?)?;
        Ok(obj)
    }

    /// Replace the value of an existing key.
    pub fn update(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let mut obj = arg(args, 0)?.clone();
        obj.update_key(str_arg(args, 1)?, arg(args, 2)?.clone())?;
        Ok(obj)
    }
}

/// Built-in string functions
pub mod string {
    use super::*;

    /// Length in characters.
    pub fn count(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(str_arg(args, 0)?.chars().count()))
    }

    pub fn is_empty(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::Bool(str_arg(args, 0)?.is_empty()))
    }

    pub fn reverse(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(str_arg(args, 0)?.chars().rev().collect::<String>()))
    }

    pub fn upper(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(str_arg(args, 0)?.to_uppercase()))
    }

    pub fn lower(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(str_arg(args, 0)?.to_lowercase()))
    }
}

/// Built-in path functions
pub mod path {
    use super::*;
    use crate::pathset;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Number of parts.
    pub fn count(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(path_arg(args, 0)?.len()))
    }

    pub fn parse(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::path(Path::parse(str_arg(args, 0)?)?))
    }

    pub fn value(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        path_arg(args, 0)?.value()
    }

    pub fn parent(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::path(path_arg(args, 0)?.parent_path()))
    }

    pub fn sub_path(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let n = int_arg(args, 1)?;
        Ok(Value::path(path_arg(args, 0)?.sub_path(n as isize)))
    }

    pub fn common_sub_path(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::path(Path::common_sub_path(
            path_arg(args, 0)?,
            path_arg(args, 1)?,
        )))
    }

    /// 1-based position, or null when the key is absent.
    pub fn pos(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(path_arg(args, 0)?.pos()?.map_or(Value::Null, Value::from))
    }

    /// Next sibling, or null at the end.
    pub fn next(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(path_arg(args, 0)?.next()?.map_or(Value::Null, Value::path))
    }

    pub fn previous(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(path_arg(args, 0)?.previous()?.map_or(Value::Null, Value::path))
    }

    pub fn link_root(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::path(path_arg(args, 0)?.link_root(arg(args, 1)?.clone())))
    }

    /// Every path of a value, linked to a shared root holding it.
    pub fn paths(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let value = arg(args, 0)?;
        let root = Rc::new(RefCell::new(value.clone()));
        Ok(Value::array(
            pathset::all_paths(value)
                .into_iter()
                .map(|p| Value::path(p.with_root(root.clone())))
                .collect(),
        ))
    }
}

/// Built-in functions of the `core` namespace
pub mod common {
    use super::*;
    use crate::datetime;
    use crate::path::RootLink;
    use crate::pathset;
    use std::cell::RefCell;
    use std::rc::Rc;

    pub fn diff(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let paths = pathset::diff(arg(args, 0)?, arg(args, 1)?);
        Ok(Value::array(paths.into_iter().map(Value::path).collect()))
    }

    /// Paths given as path values or path notation strings.
    fn path_list(args: &[Value], i: usize) -> EvalResult<Vec<Path>> {
        array_arg(args, i)?
            .iter()
            .map(|v| match v {
                Value::Path(p) => Ok(p.as_ref().clone()),
                Value::String(s) => Ok(Path::parse(s)?),
                other => Err(EvaluatorError::type_mismatch(format!(
                    "expected a Path, got {}",
                    other.type_name()
                ))),
            })
            .collect()
    }

    /// The root shared by a list of linked paths. Every path must be linked,
    /// and all of them to the same root.
    fn linked_root(paths: &[Path]) -> EvalResult<Option<RootLink>> {
        let mut shared: Option<&RootLink> = None;
        for path in paths {
            let root = path
                .root_link()
                .ok_or_else(|| EvaluatorError::path_unlinked(path))?;
            match shared {
                None => shared = Some(root),
                Some(first) if Rc::ptr_eq(first, root) => {}
                Some(_) => {
                    return Err(EvaluatorError::raise(
                        ErrorCode::PathUnlinked,
                        format!("path {} is linked to a different root than {}", path, paths[0]),
                    ));
                }
            }
        }
        Ok(shared.cloned())
    }

    /// Retain on the tree the paths are linked to, in place.
    pub fn retain_linked(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let keep = path_list(args, 0)?;
        Ok(match linked_root(&keep)? {
            Some(root) => pathset::retain(&root, &keep),
            None => Value::Empty,
        })
    }

    /// Retain on a fresh root holding the given value.
    pub fn retain(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let root = Rc::new(RefCell::new(arg(args, 0)?.clone()));
        Ok(pathset::retain(&root, &path_list(args, 1)?))
    }

    pub fn reclude_linked(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let remove = path_list(args, 0)?;
        Ok(match linked_root(&remove)? {
            Some(root) => pathset::reclude(&root, &remove),
            None => Value::Empty,
        })
    }

    pub fn reclude(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let root = Rc::new(RefCell::new(arg(args, 0)?.clone()));
        Ok(pathset::reclude(&root, &path_list(args, 1)?))
    }

    pub fn boolean(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let v = arg(args, 0)?;
        v.mappable_to_boolean().map(Value::Bool).ok_or_else(|| {
            EvaluatorError::type_mismatch(format!("{} is not mappable to Bool", v.type_name()))
        })
    }

    pub fn type_of(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(arg(args, 0)?.type_name()))
    }

    /// Raise a user error: `error(code, message[, json])`.
    pub fn error(_: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let mut e = ErrorValue::custom(str_arg(args, 0)?, "User", str_arg(args, 1)?);
        if let Some(json) = args.get(2) {
            e = e.with_json(json.clone());
        }
        Err(EvaluatorError::Raised(e))
    }

    /// Block the thread for the given milliseconds; yields the current value.
    pub fn wait(ctx: &CallContext<'_>, args: &[Value]) -> EvalResult<Value> {
        let ms = int_arg(args, 0)?.max(0) as u64;
        std::thread::sleep(Duration::from_millis(ms));
        Ok(ctx.current.clone())
    }

    pub fn stop(ctx: &CallContext<'_>, _: &[Value]) -> EvalResult<Value> {
        tracing::warn!(path = ?ctx.current_path.map(|p| p.to_string()), "evaluation stopped");
        Err(EvaluatorError::Stopped)
    }

    pub fn now(ctx: &CallContext<'_>, _: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(datetime::now(ctx.config.tz()?)))
    }

    pub fn millis(_: &CallContext<'_>, _: &[Value]) -> EvalResult<Value> {
        Ok(Value::from(datetime::millis()))
    }
}
