// Value: Rc-wrapped tagged union for the JSON value model
// Composites are reference counted so clones are O(1); mutation goes through Rc::make_mut.

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Read};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{EvalResult, ErrorValue, EvaluatorError};
use crate::functions::FunctionRef;
use crate::operators::BinaryOp;
use crate::path::{Path, PathPart};
use crate::render::{self, Format};

/// Highest number of decimals a number renders with.
pub const MAX_PRECISION: i8 = 18;

/// Precision marker meaning "infer from the value".
pub const INFER_PRECISION: i8 = -1;

/// A value in the evaluation engine.
///
/// Besides the JSON types this carries raw bytes, opaque streams, error
/// values, paths, and two markers: `Empty` (no value; collapses out of
/// arrays and objects) and `End` (end of a stream of results).
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(NumberValue),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<ObjectValue>),
    Raw(Rc<[u8]>),
    Stream(StreamValue),
    Error(Rc<ErrorValue>),
    Empty,
    End,
    Path(Rc<Path>),
}

/// The tag of a [`Value`], used in type errors and for runtime dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
    Raw,
    Stream,
    Error,
    Empty,
    End,
    Path,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Null => "Null",
            ValueKind::Bool => "Bool",
            ValueKind::Number => "Number",
            ValueKind::String => "String",
            ValueKind::Array => "Array",
            ValueKind::Object => "Object",
            ValueKind::Raw => "Raw",
            ValueKind::Stream => "Stream",
            ValueKind::Error => "Error",
            ValueKind::Empty => "Empty",
            ValueKind::End => "End",
            ValueKind::Path => "Path",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Numbers ──────────────────────────────────────────────────────────────────

/// A double paired with the number of decimals it renders with.
///
/// A precision of `-1` means the decimals are inferred from the value when
/// rendering.
#[derive(Clone, Copy, Debug)]
pub struct NumberValue {
    pub value: f64,
    pub precision: i8,
}

impl NumberValue {
    #[inline]
    pub fn new(value: f64) -> Self {
        NumberValue {
            value,
            precision: INFER_PRECISION,
        }
    }

    /// Precision is clamped to `-1..=18`.
    #[inline]
    pub fn with_precision(value: f64, precision: i8) -> Self {
        NumberValue {
            value,
            precision: precision.clamp(INFER_PRECISION, MAX_PRECISION),
        }
    }

    /// Parse a number literal, recording its fractional digit count as the
    /// precision. Literals with an exponent infer their precision.
    pub fn parse(text: &str) -> EvalResult<Self> {
        let trimmed = text.trim();
        let value: f64 = trimmed.parse().map_err(|_| {
            EvaluatorError::raise(
                crate::error::ErrorCode::ParseFailure,
                format!("invalid number literal: {}", text),
            )
        })?;
        if trimmed.contains(['e', 'E']) {
            return Ok(NumberValue::new(value));
        }
        let decimals = match trimmed.split_once('.') {
            Some((_, fraction)) => fraction.len(),
            None => 0,
        };
        let precision = decimals.min(MAX_PRECISION as usize) as i8;
        Ok(NumberValue::with_precision(value, precision))
    }

    /// The number of decimals this number renders with.
    pub fn effective_precision(&self) -> usize {
        if self.precision >= 0 {
            return self.precision as usize;
        }
        if !self.value.is_finite() || self.value.fract() == 0.0 {
            return 0;
        }
        // f64 Display is the shortest text that round-trips and never uses
        // an exponent.
        let shortest = self.value.to_string();
        let decimals = shortest.split_once('.').map_or(0, |(_, f)| f.len());
        decimals.min(MAX_PRECISION as usize)
    }

    /// Render with exactly `effective_precision()` decimals.
    pub fn render(&self) -> String {
        if !self.value.is_finite() {
            // NaN and +/-Infinity serialize as null (matching JSON)
            return "null".to_string();
        }
        format_fixed(self.value, self.effective_precision())
    }
}

/// One of the 19 fixed formatters: 0 to 18 decimals.
fn format_fixed(value: f64, decimals: usize) -> String {
    let decimals = decimals.min(MAX_PRECISION as usize);
    let text = format!("{:.*}", decimals, value);
    // -0 renders as 0
    if text.starts_with('-') && text[1..].bytes().all(|b| b == b'0' || b == b'.') {
        return text[1..].to_string();
    }
    text
}

impl PartialEq for NumberValue {
    /// Numbers compare by value; precision is a rendering concern.
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

// ── Objects ──────────────────────────────────────────────────────────────────

/// Ordered key/value pairs with unique keys, plus optional operator bindings.
#[derive(Clone, Debug, Default)]
pub struct ObjectValue {
    pairs: IndexMap<String, Value>,
    bindings: Option<Rc<IndexMap<BinaryOp, FunctionRef>>>,
}

impl ObjectValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        ObjectValue {
            pairs: IndexMap::with_capacity(n),
            bindings: None,
        }
    }

    /// Build from pairs, rejecting duplicate keys.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> EvalResult<Self> {
        let mut obj = ObjectValue::new();
        for (k, v) in pairs {
            obj.insert(k, v)?;
        }
        Ok(obj)
    }

    /// Append a new pair. A key that already exists is an error.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> EvalResult<()> {
        let key = key.into();
        if self.pairs.contains_key(&key) {
            return Err(EvaluatorError::duplicate_key(&key));
        }
        self.pairs.insert(key, value);
        Ok(())
    }

    /// Overwrite in place, or append if the key is new.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.pairs.insert(key.into(), value);
    }

    /// Remove a key, keeping the order of the remaining pairs.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.pairs.shift_remove(key)
    }

    /// Rename a key in place, keeping its position.
    pub fn rename(&mut self, from: &str, to: &str) -> EvalResult<()> {
        if !self.pairs.contains_key(from) {
            return Err(EvaluatorError::lookup_failure(format!(
                "cannot rename missing key \"{}\"",
                from
            )));
        }
        if from == to {
            return Ok(());
        }
        if self.pairs.contains_key(to) {
            return Err(EvaluatorError::duplicate_key(to));
        }
        let pairs = std::mem::take(&mut self.pairs);
        self.pairs = pairs
            .into_iter()
            .map(|(k, v)| if k == from { (to.to_string(), v) } else { (k, v) })
            .collect();
        Ok(())
    }

    /// A copy of this object without `key`.
    pub fn without(&self, key: &str) -> ObjectValue {
        let mut copy = self.clone();
        copy.pairs.shift_remove(key);
        copy
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pairs.get(key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.pairs.get_mut(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.contains_key(key)
    }

    /// Zero-based position of `key` in pair order.
    #[inline]
    pub fn key_index(&self, key: &str) -> Option<usize> {
        self.pairs.get_index_of(key)
    }

    #[inline]
    pub fn get_index(&self, index: usize) -> Option<(&String, &Value)> {
        self.pairs.get_index(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.pairs.iter()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, Value> {
        self.pairs.keys()
    }

    pub fn values(&self) -> indexmap::map::Values<'_, String, Value> {
        self.pairs.values()
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&String, &mut Value) -> bool) {
        self.pairs.retain(keep);
    }

    pub(crate) fn values_mut(&mut self) -> indexmap::map::ValuesMut<'_, String, Value> {
        self.pairs.values_mut()
    }

    /// Declare a custom handler for a binary operator on this object.
    pub fn bind_operator(&mut self, op: BinaryOp, handler: FunctionRef) {
        let bindings = self.bindings.get_or_insert_with(Default::default);
        Rc::make_mut(bindings).insert(op, handler);
    }

    pub fn operator_binding(&self, op: BinaryOp) -> Option<&FunctionRef> {
        self.bindings.as_ref().and_then(|b| b.get(&op))
    }

    pub fn has_bindings(&self) -> bool {
        self.bindings.as_ref().is_some_and(|b| !b.is_empty())
    }
}

impl PartialEq for ObjectValue {
    /// Structural identity: same keys mapping to equal values, order ignored.
    fn eq(&self, other: &Self) -> bool {
        self.pairs == other.pairs
    }
}

impl From<IndexMap<String, Value>> for ObjectValue {
    fn from(pairs: IndexMap<String, Value>) -> Self {
        ObjectValue {
            pairs,
            bindings: None,
        }
    }
}

impl<'a> IntoIterator for &'a ObjectValue {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

// ── Streams ──────────────────────────────────────────────────────────────────

/// An opaque byte source handed in by an I/O component.
#[derive(Clone)]
pub struct StreamValue {
    source: Rc<RefCell<Box<dyn Read>>>,
}

impl StreamValue {
    pub fn new(reader: impl Read + 'static) -> Self {
        StreamValue {
            source: Rc::new(RefCell::new(Box::new(reader))),
        }
    }

    /// Drain the remaining bytes of the source.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.source.borrow_mut().read_to_end(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    pub fn same_source(&self, other: &StreamValue) -> bool {
        Rc::ptr_eq(&self.source, &other.source)
    }
}

impl fmt::Debug for StreamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamValue(..)")
    }
}

// ── Type checks ──────────────────────────────────────────────────────────────

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
            Value::Raw(_) => ValueKind::Raw,
            Value::Stream(_) => ValueKind::Stream,
            Value::Error(_) => ValueKind::Error,
            Value::Empty => ValueKind::Empty,
            Value::End => ValueKind::End,
            Value::Path(_) => ValueKind::Path,
        }
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Everything except arrays and objects is atomic.
    #[inline]
    pub fn is_atomic(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Object(_))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for the `Empty` marker (not for empty collections).
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, Value::End)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline]
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    #[inline]
    pub fn is_path(&self) -> bool {
        matches!(self, Value::Path(_))
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

impl Value {
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => {
                let f = n.value;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Some(f as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    #[inline]
    pub fn as_number(&self) -> Option<&NumberValue> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Mutable access to the inner Vec, cloning if shared (Rc::make_mut).
    #[inline]
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(arr) => Some(Rc::make_mut(arr)),
            _ => None,
        }
    }

    /// Mutable access to the inner object, cloning if shared (Rc::make_mut).
    #[inline]
    pub fn as_object_mut(&mut self) -> Option<&mut ObjectValue> {
        match self {
            Value::Object(obj) => Some(Rc::make_mut(obj)),
            _ => None,
        }
    }

    #[inline]
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    #[inline]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    #[inline]
    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Index into an object by key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(obj) => obj.get(key),
            _ => None,
        }
    }

    /// Index into an array by zero-based position.
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Array(arr) => arr.get(index),
            _ => None,
        }
    }

    /// Number of elements or pairs; `None` for atomic values.
    pub fn size(&self) -> Option<usize> {
        match self {
            Value::Array(arr) => Some(arr.len()),
            Value::Object(obj) => Some(obj.len()),
            _ => None,
        }
    }

    /// The one generic conversion from any value to a boolean.
    pub fn mappable_to_boolean(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.value != 0.0 && !n.value.is_nan()),
            Value::String(s) => {
                if s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
            Value::Null | Value::Empty => Some(false),
            Value::Array(arr) => Some(!arr.is_empty()),
            Value::Object(obj) => Some(!obj.is_empty()),
            _ => None,
        }
    }

    pub fn render(&self, format: Format) -> String {
        render::render(self, format)
    }
}

// ── Structural access and mutation ───────────────────────────────────────────

impl Value {
    /// The value addressed by `parts`, if any.
    pub fn get_at(&self, parts: &[PathPart]) -> Option<&Value> {
        let mut current = self;
        for part in parts {
            current = match (part, current) {
                (PathPart::Key(k), Value::Object(obj)) => obj.get(k)?,
                (PathPart::Position(p), Value::Array(arr)) => arr.get(p.checked_sub(1)?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Mutable access along `parts`, unsharing composites on the way down.
    pub fn get_at_mut(&mut self, parts: &[PathPart]) -> Option<&mut Value> {
        if self.get_at(parts).is_none() {
            return None;
        }
        let mut current = self;
        for part in parts {
            current = match (part, current) {
                (PathPart::Key(k), Value::Object(obj)) => Rc::make_mut(obj).get_mut(k)?,
                (PathPart::Position(p), Value::Array(arr)) => {
                    Rc::make_mut(arr).get_mut(p.checked_sub(1)?)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Replace the addressed value with `Empty`. Returns false when nothing
    /// exists at `parts`.
    pub fn clear_at(&mut self, parts: &[PathPart]) -> bool {
        match self.get_at_mut(parts) {
            Some(slot) => {
                *slot = Value::Empty;
                true
            }
            None => false,
        }
    }

    /// Write `value` at `parts`. The parent must exist; a missing key is
    /// appended and a position one past the end pushes.
    pub fn set_at(&mut self, parts: &[PathPart], value: Value) -> EvalResult<()> {
        let Some((last, parent_parts)) = parts.split_last() else {
            *self = value;
            return Ok(());
        };
        let parent = self
            .get_at_mut(parent_parts)
            .ok_or_else(|| missing(parent_parts))?;
        match (last, parent) {
            (PathPart::Key(k), Value::Object(obj)) => {
                Rc::make_mut(obj).set(k.clone(), value);
                Ok(())
            }
            (PathPart::Position(p), Value::Array(arr)) => {
                let arr = Rc::make_mut(arr);
                match *p {
                    p if p >= 1 && p <= arr.len() => {
                        arr[p - 1] = value;
                        Ok(())
                    }
                    p if p == arr.len() + 1 => {
                        arr.push(value);
                        Ok(())
                    }
                    _ => Err(missing(parts)),
                }
            }
            _ => Err(missing(parts)),
        }
    }

    /// Remove and return the addressed value.
    pub fn remove_at(&mut self, parts: &[PathPart]) -> EvalResult<Value> {
        let Some((last, parent_parts)) = parts.split_last() else {
            return Ok(std::mem::replace(self, Value::Empty));
        };
        let parent = self
            .get_at_mut(parent_parts)
            .ok_or_else(|| missing(parent_parts))?;
        match (last, parent) {
            (PathPart::Key(k), Value::Object(obj)) => {
                Rc::make_mut(obj).remove(k).ok_or_else(|| missing(parts))
            }
            (PathPart::Position(p), Value::Array(arr)) if *p >= 1 && *p <= arr.len() => {
                Ok(Rc::make_mut(arr).remove(p - 1))
            }
            _ => Err(missing(parts)),
        }
    }

    /// Rename a key of this object in place, keeping its position.
    pub fn rename_key(&mut self, from: &str, to: &str) -> EvalResult<()> {
        let type_name = self.type_name();
        match self.as_object_mut() {
            Some(obj) => obj.rename(from, to),
            None => Err(EvaluatorError::type_mismatch(format!(
                "cannot rename a key of {}",
                type_name
            ))),
        }
    }

    /// Replace the value of an existing key of this object.
    pub fn update_key(&mut self, key: &str, value: Value) -> EvalResult<()> {
        let type_name = self.type_name();
        let Some(obj) = self.as_object_mut() else {
            return Err(EvaluatorError::type_mismatch(format!(
                "cannot update a key of {}",
                type_name
            )));
        };
        match obj.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EvaluatorError::lookup_failure(format!(
                "cannot update missing key \"{}\"",
                key
            ))),
        }
    }

    /// Drop every `Empty` element and pair, recursively.
    pub fn collapse_empty(&mut self) {
        if !self.holds_empty() {
            return;
        }
        match self {
            Value::Array(arr) => {
                let arr = Rc::make_mut(arr);
                arr.retain(|v| !v.is_empty());
                for v in arr.iter_mut() {
                    v.collapse_empty();
                }
            }
            Value::Object(obj) => {
                let obj = Rc::make_mut(obj);
                obj.retain(|_, v| !v.is_empty());
                for v in obj.values_mut() {
                    v.collapse_empty();
                }
            }
            _ => {}
        }
    }

    fn holds_empty(&self) -> bool {
        match self {
            Value::Array(arr) => arr.iter().any(|v| v.is_empty() || v.holds_empty()),
            Value::Object(obj) => obj.values().any(|v| v.is_empty() || v.holds_empty()),
            _ => false,
        }
    }
}

fn missing(parts: &[PathPart]) -> EvaluatorError {
    EvaluatorError::lookup_failure(format!(
        "nothing exists at {}",
        Path::new(parts.to_vec())
    ))
}

// ── Constructors ─────────────────────────────────────────────────────────────

impl Value {
    #[inline]
    pub fn number(n: f64) -> Self {
        Value::Number(NumberValue::new(n))
    }

    #[inline]
    pub fn number_with_precision(n: f64, precision: i8) -> Self {
        Value::Number(NumberValue::with_precision(n, precision))
    }

    #[inline]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    #[inline]
    pub fn array(v: Vec<Value>) -> Self {
        Value::Array(Rc::new(v))
    }

    #[inline]
    pub fn object(obj: ObjectValue) -> Self {
        Value::Object(Rc::new(obj))
    }

    #[inline]
    pub fn raw(bytes: impl Into<Rc<[u8]>>) -> Self {
        Value::Raw(bytes.into())
    }

    #[inline]
    pub fn stream(reader: impl Read + 'static) -> Self {
        Value::Stream(StreamValue::new(reader))
    }

    #[inline]
    pub fn error(e: ErrorValue) -> Self {
        Value::Error(Rc::new(e))
    }

    #[inline]
    pub fn path(p: Path) -> Self {
        Value::Path(Rc::new(p))
    }
}

// ── From impls ───────────────────────────────────────────────────────────────

impl From<bool> for Value {
    #[inline]
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(n: i64) -> Self {
        Value::number(n as f64)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(n: i32) -> Self {
        Value::number(n as f64)
    }
}

impl From<u64> for Value {
    #[inline]
    fn from(n: u64) -> Self {
        Value::number(n as f64)
    }
}

impl From<usize> for Value {
    #[inline]
    fn from(n: usize) -> Self {
        Value::number(n as f64)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<NumberValue> for Value {
    #[inline]
    fn from(n: NumberValue) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Rc<str>> for Value {
    #[inline]
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    #[inline]
    fn from(v: Vec<Value>) -> Self {
        Value::Array(Rc::new(v))
    }
}

impl From<ObjectValue> for Value {
    #[inline]
    fn from(obj: ObjectValue) -> Self {
        Value::Object(Rc::new(obj))
    }
}

impl From<IndexMap<String, Value>> for Value {
    #[inline]
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(ObjectValue::from(m)))
    }
}

impl From<Path> for Value {
    #[inline]
    fn from(p: Path) -> Self {
        Value::Path(Rc::new(p))
    }
}

impl From<ErrorValue> for Value {
    #[inline]
    fn from(e: ErrorValue) -> Self {
        Value::Error(Rc::new(e))
    }
}

// ── PartialEq ────────────────────────────────────────────────────────────────

impl PartialEq for Value {
    /// Deep structural identity. Numbers ignore precision, objects ignore
    /// pair order, paths compare part-wise.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Empty, Value::Empty) => true,
            (Value::End, Value::End) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Raw(a), Value::Raw(b)) => a == b,
            (Value::Stream(a), Value::Stream(b)) => a.same_source(b),
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Path(a), Value::Path(b)) => a == b,
            _ => false,
        }
    }
}

// ── Display ──────────────────────────────────────────────────────────────────

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render::render(self, Format::Compact))
    }
}

// ── Serialization ────────────────────────────────────────────────────────────

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Empty | Value::End => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                let v = n.value;
                if v.is_nan() || v.is_infinite() {
                    serializer.serialize_none()
                } else if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
                    serializer.serialize_i64(v as i64)
                } else {
                    serializer.serialize_f64(v)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(arr) => {
                let mut seq = serializer.serialize_seq(None)?;
                for v in arr.iter().filter(|v| !v.is_empty()) {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Object(obj) => {
                let mut m = serializer.serialize_map(None)?;
                for (k, v) in obj.iter().filter(|(_, v)| !v.is_empty()) {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
            Value::Raw(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
            Value::Stream(_) => serializer.serialize_str("<stream>"),
            Value::Error(e) => {
                let mut m = serializer.serialize_map(None)?;
                m.serialize_entry("code", &e.code)?;
                m.serialize_entry("type", &e.error_type)?;
                m.serialize_entry("message", &e.message)?;
                if let Some(json) = &e.json {
                    m.serialize_entry("json", json)?;
                }
                m.end()
            }
            Value::Path(p) => serializer.serialize_str(&p.to_string()),
        }
    }
}

// ── Deserialization (single-pass JSON→Value) ─────────────────────────────────

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "any valid JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::string(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut vec = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(elem) = seq.next_element()? {
            vec.push(elem);
        }
        Ok(Value::array(vec))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut obj = ObjectValue::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((k, v)) = map.next_entry::<String, Value>()? {
            if obj.contains_key(&k) {
                return Err(de::Error::custom(format!("duplicate key \"{}\"", k)));
            }
            obj.set(k, v);
        }
        Ok(Value::object(obj))
    }
}

// ── JSON string I/O ──────────────────────────────────────────────────────────

impl Value {
    /// Serialize to a JSON string.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a JSON string into a Value (single pass, no intermediate serde_json::Value).
    pub fn from_json_str(s: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// ── Conversion from serde_json::Value ────────────────────────────────────────

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(arr) => {
                Value::array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                let m: IndexMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                Value::from(m)
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        // Serialize never fails for Value: map keys are always strings.
        serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
    }
}

// ── value! macro ─────────────────────────────────────────────────────────────

/// Macro for constructing Value literals, similar to serde_json::json!
///
/// Usage:
///   value!(null)           → Value::Null
///   value!(true)           → Value::Bool(true)
///   value!(42)             → Value::Number(42)
///   value!("hello")        → Value::String
///   value!([1, 2, 3])      → Value::Array
///   value!({"k": v, ...})  → Value::Object (pairs in order)
///   value!(expr)           → Value::from(expr)
#[macro_export]
macro_rules! value {
    (null) => {
        $crate::value::Value::Null
    };

    (true) => {
        $crate::value::Value::Bool(true)
    };

    (false) => {
        $crate::value::Value::Bool(false)
    };

    ([ $($elem:tt),* $(,)? ]) => {
        $crate::value::Value::array(vec![ $( $crate::value!($elem) ),* ])
    };

    ({ $($key:tt : $val:tt),* $(,)? }) => {
        {
            #[allow(unused_mut)]
            let mut obj = $crate::value::ObjectValue::new();
            $(
                obj.set(($key).to_string(), $crate::value!($val));
            )*
            $crate::value::Value::object(obj)
        }
    };

    ($other:expr) => {
        $crate::value::Value::from($other)
    };
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;

    #[test]
    fn test_clone_is_cheap() {
        let arr = Value::array(vec![Value::from(1i64), Value::from(2i64)]);
        let arr2 = arr.clone();
        if let (Value::Array(a), Value::Array(b)) = (&arr, &arr2) {
            assert!(Rc::ptr_eq(a, b));
        } else {
            panic!("expected arrays");
        }
    }

    #[test]
    fn test_number_precision_rendering() {
        assert_eq!(NumberValue::with_precision(2.0, 3).render(), "2.000");
        assert_eq!(NumberValue::with_precision(2.5, 0).render(), "2");
        assert_eq!(NumberValue::new(2.0).render(), "2");
        assert_eq!(NumberValue::new(0.1).render(), "0.1");
        assert_eq!(NumberValue::new(-3.25).render(), "-3.25");
        assert_eq!(NumberValue::new(f64::NAN).render(), "null");
        // precision beyond the last formatter collapses to 18
        assert_eq!(NumberValue::with_precision(1.0, 40).precision, 18);
    }

    #[test]
    fn test_number_round_trip_every_precision() {
        for value in [42.0, 0.5, -7.0] {
            for p in 0..=MAX_PRECISION {
                if value == 0.5 && p == 0 {
                    continue;
                }
                let n = NumberValue::with_precision(value, p);
                let parsed = NumberValue::parse(&n.render()).unwrap();
                assert_eq!(parsed.value, value, "value at precision {}", p);
                assert_eq!(parsed.precision, p, "precision for {}", value);
            }
        }
    }

    #[test]
    fn test_number_parse_exponent_infers() {
        let n = NumberValue::parse("1.5e3").unwrap();
        assert_eq!(n.value, 1500.0);
        assert_eq!(n.precision, INFER_PRECISION);
        assert!(NumberValue::parse("abc").is_err());
    }

    #[test]
    fn test_type_checks() {
        assert!(Value::Null.is_null());
        assert!(Value::Empty.is_empty());
        assert!(Value::End.is_end());
        assert!(Value::number(1.0).is_atomic());
        assert!(!Value::array(vec![]).is_atomic());
        assert_eq!(Value::raw(vec![1u8, 2]).kind(), ValueKind::Raw);
        assert_eq!(Value::path(Path::root()).type_name(), "Path");
    }

    #[test]
    fn test_object_duplicate_key_rejected() {
        let mut obj = ObjectValue::new();
        obj.insert("a", Value::from(1i64)).unwrap();
        let err = obj.insert("a", Value::from(2i64)).unwrap_err();
        assert!(err.has_code(crate::error::ErrorCode::DuplicateKey));
        assert_eq!(obj.get("a"), Some(&Value::from(1i64)));
    }

    #[test]
    fn test_object_rename_keeps_position() {
        let mut obj = ObjectValue::from_pairs(vec![
            ("a".to_string(), Value::from(1i64)),
            ("b".to_string(), Value::from(2i64)),
            ("c".to_string(), Value::from(3i64)),
        ])
        .unwrap();
        obj.rename("b", "z").unwrap();
        let keys: Vec<&String> = obj.keys().collect();
        assert_eq!(keys, vec!["a", "z", "c"]);
        assert!(obj.rename("missing", "y").is_err());
        assert!(obj.rename("a", "c").is_err());
    }

    #[test]
    fn test_rename_and_update_key() {
        let mut v = value!({"a": 1, "b": 2});
        v.rename_key("a", "x").unwrap();
        v.update_key("b", Value::from("two")).unwrap();
        assert_eq!(v.render(Format::Compact), r#"{"x":1,"b":"two"}"#);

        let err = v.update_key("missing", Value::Null).unwrap_err();
        assert!(err.has_code(crate::error::ErrorCode::LookupFailure));
        let err = Value::from(1i64).rename_key("a", "b").unwrap_err();
        assert!(err.has_code(crate::error::ErrorCode::TypeMismatch));
    }

    #[test]
    fn test_equality_ignores_order_and_precision() {
        assert_eq!(value!({"a": 1, "b": 2}), value!({"b": 2, "a": 1}));
        assert_eq!(
            Value::number_with_precision(2.0, 0),
            Value::number_with_precision(2.0, 3)
        );
        assert_ne!(Value::Null, Value::Empty);
        assert_ne!(value!([1, 2]), value!([2, 1]));
    }

    #[test]
    fn test_mappable_to_boolean() {
        assert_eq!(Value::from("TRUE").mappable_to_boolean(), Some(true));
        assert_eq!(Value::from("nope").mappable_to_boolean(), None);
        assert_eq!(Value::from(0i64).mappable_to_boolean(), Some(false));
        assert_eq!(value!([1]).mappable_to_boolean(), Some(true));
        assert_eq!(Value::End.mappable_to_boolean(), None);
    }

    #[test]
    fn test_structural_mutation() {
        let mut v = value!({"a": {"b": [1, 2, 3]}});
        let parts = vec![
            PathPart::Key("a".into()),
            PathPart::Key("b".into()),
            PathPart::Position(2),
        ];
        assert_eq!(v.get_at(&parts), Some(&Value::from(2i64)));

        v.set_at(&parts, Value::from("x")).unwrap();
        assert_eq!(v, value!({"a": {"b": [1, "x", 3]}}));

        let removed = v.remove_at(&parts).unwrap();
        assert_eq!(removed, Value::from("x"));
        assert_eq!(v, value!({"a": {"b": [1, 3]}}));

        let err = v.remove_at(&[PathPart::Key("zzz".into())]).unwrap_err();
        assert!(err.has_code(crate::error::ErrorCode::LookupFailure));
    }

    #[test]
    fn test_collapse_empty() {
        let mut v = value!({"a": [1, 2], "b": 3});
        v.clear_at(&[PathPart::Key("a".into()), PathPart::Position(1)]);
        v.clear_at(&[PathPart::Key("b".into())]);
        v.collapse_empty();
        assert_eq!(v, value!({"a": [2]}));
    }

    #[test]
    fn test_mutation_does_not_touch_shared_copy() {
        let original = value!({"a": 1});
        let mut copy = original.clone();
        copy.set_at(&[PathPart::Key("a".into())], Value::from(2i64))
            .unwrap();
        assert_eq!(original, value!({"a": 1}));
        assert_eq!(copy, value!({"a": 2}));
    }

    #[test]
    fn test_serde_roundtrip() {
        let v = value!({"name": "Alice", "scores": [1, 2, 3], "active": true});
        let json_str = v.to_json_string().unwrap();
        let parsed = Value::from_json_str(&json_str).unwrap();
        assert_eq!(v, parsed);
        assert!(Value::from_json_str(r#"{"a": 1, "a": 2}"#).is_err());
    }

    #[test]
    fn test_from_serde_json() {
        let sv = serde_json::json!({"name": "Alice", "age": 30});
        let v = Value::from(sv);
        assert_eq!(v.get("name").and_then(|v| v.as_str()), Some("Alice"));
        assert_eq!(v.get("age").and_then(|v| v.as_f64()), Some(30.0));

        let back = serde_json::Value::from(&v);
        assert_eq!(back, serde_json::json!({"name": "Alice", "age": 30}));
    }

    #[test]
    fn test_stream_reads_source() {
        let s = StreamValue::new(std::io::Cursor::new(b"abc".to_vec()));
        assert_eq!(s.read_all().unwrap(), b"abc");
        assert!(s.same_source(&s.clone()));
    }
}
