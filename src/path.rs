// Structural paths: addressing, root-linking and sibling traversal
// Notation: `.key1.key2[3].key4`, positions are 1-based.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use thiserror::Error;

use crate::error::{ErrorCode, EvalResult, EvaluatorError};
use crate::value::Value;

/// Shared handle to the value tree a path addresses. Paths alias into the
/// live tree through it, so mutations made through one handle are seen by
/// every path linked to the same root.
pub type RootLink = Rc<RefCell<Value>>;

/// Path notation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathParseError {
    #[error("Unexpected character '{found}' at offset {offset} in path")]
    UnexpectedChar { found: char, offset: usize },

    #[error("Empty key at offset {0} in path")]
    EmptyKey(usize),

    #[error("Invalid position '{0}': positions are 1-based integers")]
    InvalidPosition(String),

    #[error("Unterminated {0} in path")]
    Unterminated(&'static str),
}

impl From<PathParseError> for EvaluatorError {
    fn from(e: PathParseError) -> Self {
        EvaluatorError::raise(ErrorCode::ParseFailure, e.to_string())
    }
}

/// One segment of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathPart {
    /// Object key
    Key(String),
    /// 1-based array position
    Position(usize),
}

impl PathPart {
    pub fn key(k: impl Into<String>) -> Self {
        PathPart::Key(k.into())
    }
}

impl fmt::Display for PathPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPart::Key(k) if key_needs_quotes(k) => {
                write!(f, ".\"{}\"", k.replace('\\', "\\\\").replace('"', "\\\""))
            }
            PathPart::Key(k) => write!(f, ".{}", k),
            PathPart::Position(p) => write!(f, "[{}]", p),
        }
    }
}

fn key_needs_quotes(k: &str) -> bool {
    k.is_empty()
        || k.chars()
            .any(|c| matches!(c, '.' | '[' | ']' | '"' | '\\' | '~') || c.is_whitespace())
}

/// A structural address into a value tree.
///
/// Equality and hashing look at the parts only; the root link and the
/// cached value link are not part of a path's identity.
#[derive(Clone, Default)]
pub struct Path {
    parts: Vec<PathPart>,
    root: Option<RootLink>,
    value_link: Option<Value>,
}

impl Path {
    /// The empty path, addressing the root itself.
    pub fn root() -> Self {
        Path::default()
    }

    pub fn new(parts: Vec<PathPart>) -> Self {
        Path {
            parts,
            root: None,
            value_link: None,
        }
    }

    /// Parse path notation. A leading `~` names the root and may be omitted.
    pub fn parse(text: &str) -> Result<Path, PathParseError> {
        let chars: Vec<char> = text.chars().collect();
        let mut parts = Vec::new();
        let mut i = 0;
        if chars.first() == Some(&'~') {
            i = 1;
        }
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    if chars.get(i) == Some(&'"') {
                        let (key, next) = parse_quoted_key(&chars, i + 1)?;
                        parts.push(PathPart::Key(key));
                        i = next;
                    } else {
                        let start = i;
                        while i < chars.len() && !matches!(chars[i], '.' | '[') {
                            i += 1;
                        }
                        if start == i {
                            return Err(PathParseError::EmptyKey(start));
                        }
                        parts.push(PathPart::Key(chars[start..i].iter().collect()));
                    }
                }
                '[' => {
                    let start = i + 1;
                    let close = chars[start..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|offset| start + offset)
                        .ok_or(PathParseError::Unterminated("position"))?;
                    let digits: String = chars[start..close].iter().collect();
                    let position = digits
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .filter(|p| *p >= 1)
                        .ok_or_else(|| PathParseError::InvalidPosition(digits.clone()))?;
                    parts.push(PathPart::Position(position));
                    i = close + 1;
                }
                c => return Err(PathParseError::UnexpectedChar { found: c, offset: i }),
            }
        }
        Ok(Path::new(parts))
    }

    #[inline]
    pub fn parts(&self) -> &[PathPart] {
        &self.parts
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    #[inline]
    pub fn last_part(&self) -> Option<&PathPart> {
        self.parts.last()
    }

    /// This path extended by one part. Keeps the root link.
    pub fn child(&self, part: PathPart) -> Path {
        let mut parts = self.parts.clone();
        parts.push(part);
        self.derive(parts)
    }

    /// Same root link, different parts, no cached value.
    fn derive(&self, parts: Vec<PathPart>) -> Path {
        Path {
            parts,
            root: self.root.clone(),
            value_link: None,
        }
    }

    fn with_last(&self, part: PathPart) -> Path {
        let mut parts = self.parts.clone();
        if let Some(last) = parts.last_mut() {
            *last = part;
        }
        self.derive(parts)
    }

    // ── Linking ──────────────────────────────────────────────────────────

    /// Link this path to a new root holding `value`.
    pub fn link_root(&self, value: Value) -> Path {
        self.with_root(Rc::new(RefCell::new(value)))
    }

    /// Link this path to an existing root handle.
    pub fn with_root(&self, root: RootLink) -> Path {
        Path {
            parts: self.parts.clone(),
            root: Some(root),
            value_link: self.value_link.clone(),
        }
    }

    /// Attach a pre-resolved value for this address.
    pub fn with_value_link(&self, value: Value) -> Path {
        Path {
            parts: self.parts.clone(),
            root: self.root.clone(),
            value_link: Some(value),
        }
    }

    #[inline]
    pub fn root_link(&self) -> Option<&RootLink> {
        self.root.as_ref()
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.root.is_some()
    }

    fn require_root(&self) -> EvalResult<&RootLink> {
        self.root
            .as_ref()
            .ok_or_else(|| EvaluatorError::path_unlinked(self))
    }

    /// The addressed value: the cached value link if present, otherwise the
    /// value found under the root link. `Empty` when nothing is there.
    pub fn value(&self) -> EvalResult<Value> {
        if let Some(v) = &self.value_link {
            return Ok(v.clone());
        }
        let root = self.require_root()?;
        let tree = root.borrow();
        Ok(tree.get_at(&self.parts).cloned().unwrap_or(Value::Empty))
    }

    /// Resolve against an arbitrary value, ignoring any link.
    pub fn resolve_in(&self, value: &Value) -> Value {
        value.get_at(&self.parts).cloned().unwrap_or(Value::Empty)
    }

    // ── Structure ────────────────────────────────────────────────────────

    /// Drop the last part. The root path is its own parent.
    pub fn parent_path(&self) -> Path {
        let mut parts = self.parts.clone();
        parts.pop();
        self.derive(parts)
    }

    /// The first `n` parts, or all but the last `-n` parts when `n < 0`.
    pub fn sub_path(&self, n: isize) -> Path {
        let len = self.parts.len() as isize;
        let keep = if n >= 0 { n.min(len) } else { (len + n).max(0) };
        self.derive(self.parts[..keep as usize].to_vec())
    }

    /// Longest shared prefix of `a` and `b`. Keeps `a`'s root link.
    pub fn common_sub_path(a: &Path, b: &Path) -> Path {
        let shared = a
            .parts
            .iter()
            .zip(b.parts.iter())
            .take_while(|(x, y)| x == y)
            .count();
        a.derive(a.parts[..shared].to_vec())
    }

    /// True when `self` is a proper prefix of `other`.
    pub fn is_strict_ancestor_of(&self, other: &Path) -> bool {
        Path::common_sub_path(self, other) == *self && self.len() < other.len()
    }

    // ── Traversal ────────────────────────────────────────────────────────

    /// 1-based position of the last part within its parent.
    ///
    /// For a position part this is the stored index; for a key it is the rank
    /// of the key among the parent object's pairs, which needs the root link.
    /// `None` for the root path or a key the parent does not hold.
    pub fn pos(&self) -> EvalResult<Option<usize>> {
        match self.parts.last() {
            None => Ok(None),
            Some(PathPart::Position(p)) => Ok(Some(*p)),
            Some(PathPart::Key(k)) => {
                let root = self.require_root()?;
                let tree = root.borrow();
                let parent = tree.get_at(&self.parts[..self.parts.len() - 1]);
                Ok(parent
                    .and_then(|p| p.as_object())
                    .and_then(|obj| obj.key_index(k))
                    .map(|i| i + 1))
            }
        }
    }

    /// The next sibling address, or `None` (the null marker) at the end.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> EvalResult<Option<Path>> {
        self.sibling(true)
    }

    /// The previous sibling address, or `None` (the null marker) at the start.
    pub fn previous(&self) -> EvalResult<Option<Path>> {
        self.sibling(false)
    }

    fn sibling(&self, forward: bool) -> EvalResult<Option<Path>> {
        let Some((last, parent_parts)) = self.parts.split_last() else {
            return Ok(None);
        };
        match last {
            PathPart::Position(p) => {
                let target = if forward { p + 1 } else { p.saturating_sub(1) };
                if target == 0 {
                    return Ok(None);
                }
                // Stepping back from a position needs no bounds unless linked.
                let root = if forward {
                    Some(self.require_root()?)
                } else {
                    self.root.as_ref()
                };
                if let Some(root) = root {
                    let tree = root.borrow();
                    let len = tree
                        .get_at(parent_parts)
                        .and_then(|parent| parent.as_array())
                        .map_or(0, |arr| arr.len());
                    if target > len {
                        return Ok(None);
                    }
                }
                Ok(Some(self.with_last(PathPart::Position(target))))
            }
            PathPart::Key(k) => {
                let root = self.require_root()?;
                let tree = root.borrow();
                let Some(obj) = tree.get_at(parent_parts).and_then(|p| p.as_object()) else {
                    return Ok(None);
                };
                let Some(index) = obj.key_index(k) else {
                    return Ok(None);
                };
                let neighbour = if forward {
                    Some(index + 1)
                } else {
                    index.checked_sub(1)
                };
                Ok(neighbour
                    .and_then(|i| obj.get_index(i))
                    .map(|(key, _)| self.with_last(PathPart::Key(key.clone()))))
            }
        }
    }
}

fn parse_quoted_key(chars: &[char], start: usize) -> Result<(String, usize), PathParseError> {
    let mut key = String::new();
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '"' => {
                return Ok((key, i + 1));
            }
            '\\' if i + 1 < chars.len() => {
                key.push(chars[i + 1]);
                i += 2;
            }
            c => {
                key.push(c);
                i += 1;
            }
        }
    }
    Err(PathParseError::Unterminated("quoted key"))
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

/// Path notation; the root path renders as `~`.
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return f.write_str("~");
        }
        for part in &self.parts {
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Path")
            .field("path", &self.to_string())
            .field("linked", &self.root.is_some())
            .field("value_link", &self.value_link)
            .finish()
    }
}

impl std::str::FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}
