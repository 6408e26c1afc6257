// Evaluation contexts: one scope per lexical block, arranged as a tree
// Scopes live in an arena; parent links are plain ids.

use std::collections::HashMap;

use crate::ast::NodeId;
use crate::path::Path;
use crate::value::Value;

/// Index of a scope in its [`ContextTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Per-scope state: ambient current value (`$`), ambient current path (`@`)
/// and variable bindings.
#[derive(Debug, Clone)]
pub struct Scope {
    parent: Option<ScopeId>,
    owner: Option<NodeId>,
    pub(crate) current_value: Value,
    pub(crate) current_path: Option<Path>,
    bindings: HashMap<String, Value>,
}

impl Scope {
    fn new(parent: Option<ScopeId>, owner: Option<NodeId>, current_value: Value) -> Self {
        Scope {
            parent,
            owner,
            current_value,
            current_path: None,
            bindings: HashMap::new(),
        }
    }

    #[inline]
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// The block node this scope belongs to; `None` for the root scope.
    #[inline]
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    #[inline]
    pub fn current_value(&self) -> &Value {
        &self.current_value
    }

    #[inline]
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_ref()
    }
}

/// Arena of scopes mirroring the lexical nesting of blocks.
#[derive(Debug, Clone)]
pub struct ContextTree {
    scopes: Vec<Scope>,
    by_owner: HashMap<NodeId, ScopeId>,
}

impl ContextTree {
    /// A tree holding only the root scope, whose current value is `input`.
    pub fn new(input: Value) -> Self {
        ContextTree {
            scopes: vec![Scope::new(None, None, input)],
            by_owner: HashMap::new(),
        }
    }

    #[inline]
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// The scope owned by the block `owner`, created under `parent` on first
    /// use. The new scope starts with the parent's current value and path.
    pub fn scope_for(&mut self, owner: NodeId, parent: ScopeId) -> ScopeId {
        if let Some(id) = self.by_owner.get(&owner).copied() {
            self.scopes[id.0].parent = Some(parent);
            return id;
        }
        let current_value = self.scope(parent).current_value.clone();
        let mut scope = Scope::new(Some(parent), Some(owner), current_value);
        scope.current_path = self.scope(parent).current_path.clone();
        let id = ScopeId(self.scopes.len());
        self.scopes.push(scope);
        self.by_owner.insert(owner, id);
        id
    }

    #[inline]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    #[inline]
    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    /// Replace the ambient value and path of a scope, returning the old ones.
    pub(crate) fn swap_current(
        &mut self,
        id: ScopeId,
        value: Value,
        path: Option<Path>,
    ) -> (Value, Option<Path>) {
        let scope = self.scope_mut(id);
        let old_value = std::mem::replace(&mut scope.current_value, value);
        let old_path = std::mem::replace(&mut scope.current_path, path);
        (old_value, old_path)
    }

    pub fn bind(&mut self, id: ScopeId, name: impl Into<String>, value: Value) {
        self.scope_mut(id).bindings.insert(name.into(), value);
    }

    pub fn unbind(&mut self, id: ScopeId, name: &str) -> Option<Value> {
        self.scope_mut(id).bindings.remove(name)
    }

    /// Look `name` up in `id` and then in each enclosing scope.
    pub fn lookup(&self, id: ScopeId, name: &str) -> Option<&Value> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let scope = self.scope(current);
            if let Some(v) = scope.bindings.get(name) {
                return Some(v);
            }
            cursor = scope.parent;
        }
        None
    }

    /// Names bound directly in `id`, in no particular order.
    pub fn bound_names(&self, id: ScopeId) -> impl Iterator<Item = &str> {
        self.scope(id).bindings.keys().map(String::as_str)
    }
}
