// Path sets over value trees: enumeration, diff, and in-place retain/reclude

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::path::{Path, PathPart, RootLink};
use crate::value::Value;

/// Every addressable path in `value`, pre-order, root excluded.
pub fn all_paths(value: &Value) -> Vec<Path> {
    let mut out = Vec::new();
    let mut prefix = Vec::new();
    collect(value, &mut prefix, &mut out);
    out
}

fn collect(value: &Value, prefix: &mut Vec<PathPart>, out: &mut Vec<Path>) {
    match value {
        Value::Object(obj) => {
            for (k, v) in obj.iter().filter(|(_, v)| !v.is_empty()) {
                prefix.push(PathPart::Key(k.clone()));
                out.push(Path::new(prefix.clone()));
                collect(v, prefix, out);
                prefix.pop();
            }
        }
        Value::Array(arr) => {
            for (i, v) in arr.iter().enumerate().filter(|(_, v)| !v.is_empty()) {
                prefix.push(PathPart::Position(i + 1));
                out.push(Path::new(prefix.clone()));
                collect(v, prefix, out);
                prefix.pop();
            }
        }
        _ => {}
    }
}

/// Paths of the larger tree that have no counterpart in the smaller one.
///
/// A counterpart is an equal path in the other tree. Path equality is by
/// parts only, so a leaf whose value changed is not reported. When both
/// trees have the same number of paths the first argument's paths are
/// reported. Returned paths are linked to a copy of the tree they were taken
/// from.
pub fn diff(a: &Value, b: &Value) -> Vec<Path> {
    let paths_a = all_paths(a);
    let paths_b = all_paths(b);
    let (larger, larger_value, smaller) = if paths_a.len() >= paths_b.len() {
        (paths_a, a, paths_b)
    } else {
        (paths_b, b, paths_a)
    };
    let counterparts: HashSet<&Path> = smaller.iter().collect();
    let root: RootLink = Rc::new(RefCell::new(larger_value.clone()));

    larger
        .iter()
        .filter(|path| !counterparts.contains(path))
        .map(|path| path.with_root(root.clone()))
        .collect()
}

/// Clear every path of the linked tree that is neither in `keep` nor a
/// strict ancestor of a kept path, then collapse the cleared slots. The
/// tree behind `root` is modified in place; the result is returned too.
pub fn retain(root: &RootLink, keep: &[Path]) -> Value {
    let mut tree = root.borrow_mut();
    let candidates = all_paths(&tree);
    let mut cleared = 0usize;
    for candidate in &candidates {
        if keep.contains(candidate) {
            continue;
        }
        if keep.iter().any(|k| candidate.is_strict_ancestor_of(k)) {
            continue;
        }
        if tree.clear_at(candidate.parts()) {
            cleared += 1;
        }
    }
    tree.collapse_empty();
    tracing::debug!(kept = keep.len(), cleared, "retained paths");
    tree.clone()
}

/// Clear exactly the paths in `remove` from the linked tree, then collapse.
/// Paths that address nothing are skipped.
pub fn reclude(root: &RootLink, remove: &[Path]) -> Value {
    let mut tree = root.borrow_mut();
    for path in remove {
        if !tree.clear_at(path.parts()) {
            tracing::debug!(path = %path, "reclude skipped missing path");
        }
    }
    tree.collapse_empty();
    tracing::debug!(removed = remove.len(), "recluded paths");
    tree.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;

    fn paths(texts: &[&str]) -> Vec<Path> {
        texts.iter().map(|t| Path::parse(t).unwrap()).collect()
    }

    fn link(v: Value) -> RootLink {
        Rc::new(RefCell::new(v))
    }

    #[test]
    fn test_all_paths_pre_order() {
        let v = value!({"a": {"b": 1, "c": [true, false]}, "d": null});
        let rendered: Vec<String> = all_paths(&v).iter().map(|p| p.to_string()).collect();
        assert_eq!(
            rendered,
            vec![".a", ".a.b", ".a.c", ".a.c[1]", ".a.c[2]", ".d"]
        );
        assert!(all_paths(&Value::from(3i64)).is_empty());
    }

    #[test]
    fn test_diff_reports_missing_path() {
        let result = diff(&value!({"a": 1, "b": 2}), &value!({"a": 1}));
        assert_eq!(result, paths(&[".b"]));
        // the reported path resolves against its own tree
        assert_eq!(result[0].value().unwrap(), Value::from(2i64));

        // argument order does not matter for which set is larger
        let result = diff(&value!({"a": 1}), &value!({"a": 1, "b": 2}));
        assert_eq!(result, paths(&[".b"]));
    }

    #[test]
    fn test_diff_ignores_changed_leaf() {
        assert!(diff(&value!({"a": 1}), &value!({"a": 2})).is_empty());
        assert!(diff(&value!({"a": 1, "b": 2}), &value!({"a": 1, "b": 3})).is_empty());
        assert!(diff(&value!({"a": [1, 2]}), &value!({"a": [1, 2]})).is_empty());

        // a changed leaf that also gains children is reported by its new paths
        let result = diff(&value!({"a": 1}), &value!({"a": {"x": 1}}));
        assert_eq!(result, paths(&[".a.x"]));
    }

    #[test]
    fn test_retain_protects_ancestors() {
        let root = link(value!({"a": {"b": 1, "c": 2}}));
        let result = retain(&root, &paths(&[".a.b"]));
        assert_eq!(result, value!({"a": {"b": 1}}));
        assert_eq!(*root.borrow(), value!({"a": {"b": 1}}));
    }

    #[test]
    fn test_retain_keeps_subtree_of_kept_path() {
        let root = link(value!({"a": {"b": [1, 2]}, "x": 0}));
        let result = retain(&root, &paths(&[".a"]));
        // descendants of a kept path are not ancestors, so they are cleared
        assert_eq!(result, value!({"a": {}}));
    }

    #[test]
    fn test_reclude() {
        let root = link(value!({"a": [1, 2, 3], "b": "x"}));
        let result = reclude(&root, &paths(&[".a[2]", ".b", ".zzz"]));
        assert_eq!(result, value!({"a": [1, 3]}));
        assert_eq!(*root.borrow(), result);
    }

    #[test]
    fn test_mutation_visible_through_linked_paths() {
        let a = Path::parse(".a").unwrap().link_root(value!({"a": 1, "b": 2}));
        let root = a.root_link().unwrap().clone();
        reclude(&root, &paths(&[".b"]));
        let b = Path::parse(".b").unwrap().with_root(root);
        assert_eq!(b.value().unwrap(), Value::Empty);
        assert_eq!(a.value().unwrap(), Value::from(1i64));
    }
}
