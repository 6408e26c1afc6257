// Node tree handed over by the parser
// Nodes live in an arena; children and parents are referenced by NodeId.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::functions::FunctionRef;
use crate::operators::BinaryOp;
use crate::path::Path;
use crate::value::Value;

/// Index of a node in its [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A predicate attached to a value, with its source text for error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub predicate: NodeId,
    pub source: String,
}

/// Node kinds
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Constant value
    Literal(Value),

    /// Array constructor
    Array(Vec<NodeId>),

    /// Object constructor. Every member is a `Pair` node; `bindings` declare
    /// custom operator handlers carried by the resulting object.
    Object {
        pairs: Vec<NodeId>,
        bindings: Vec<(BinaryOp, FunctionRef)>,
    },

    /// Key/value member of an object constructor
    Pair {
        key: String,
        value: NodeId,
        constraint: Option<Constraint>,
    },

    /// `$`, the ambient current value
    CurrentValue,

    /// `@`, the ambient current path
    CurrentPath,

    /// Variable reference (`$name`)
    Variable(String),

    /// Apply a path literal to the value of `base`
    Navigate { base: NodeId, path: Path },

    /// Binary operation
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },

    /// Logical negation of a boolean
    Not(NodeId),

    /// Function call; an empty namespace lets the resolver pick one
    Call {
        namespace: String,
        name: String,
        args: Vec<NodeId>,
    },

    /// Block with its own scope: bindings evaluated in order, then the body
    Block {
        bindings: Vec<(String, NodeId)>,
        body: NodeId,
    },

    /// Any value checked against a constraint
    Constrained { value: NodeId, constraint: Constraint },
}

/// Evaluation state of a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum NodeState {
    #[default]
    Unresolved,
    /// On the evaluation stack; re-entry is a cycle.
    Resolving,
    /// Evaluated. A suppressed node never evaluates again.
    Resolved { value: Value, suppressed: bool },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    state: NodeState,
    parent: Option<NodeId>,
}

/// Arena of nodes.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    #[inline]
    pub fn state(&self, id: NodeId) -> &NodeState {
        &self.nodes[id.0].state
    }

    pub(crate) fn set_state(&mut self, id: NodeId, state: NodeState) {
        self.nodes[id.0].state = state;
    }

    #[inline]
    pub fn is_suppressed(&self, id: NodeId) -> bool {
        matches!(self.state(id), NodeState::Resolved { suppressed: true, .. })
    }

    /// The last value this node resolved to.
    pub fn resolved_value(&self, id: NodeId) -> Option<&Value> {
        match self.state(id) {
            NodeState::Resolved { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Replace a node's kind in place, e.g. to patch a forward reference.
    /// The node and its new children return to `Unresolved`.
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        for child in children_of(&kind) {
            self.nodes[child.0].parent = Some(id);
        }
        self.nodes[id.0].kind = kind;
        self.invalidate(id);
    }

    /// Return a subtree to `Unresolved`.
    pub fn invalidate(&mut self, id: NodeId) {
        let mut stack = vec![id];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            // patched-in cycles
            if !seen.insert(current) {
                continue;
            }
            self.nodes[current.0].state = NodeState::Unresolved;
            stack.extend(self.children(current));
        }
    }

    /// Direct children, in evaluation order. Constraint predicates included.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        children_of(self.kind(id))
    }

    /// Names this node binds for its descendants: block variables, and `_`
    /// for the members of an object constructor.
    pub fn bindings(&self, id: NodeId) -> Vec<String> {
        match self.kind(id) {
            NodeKind::Block { bindings, .. } => bindings.iter().map(|(n, _)| n.clone()).collect(),
            NodeKind::Object { pairs, .. } if !pairs.is_empty() => vec!["_".to_string()],
            _ => Vec::new(),
        }
    }

    /// Deep copy of the subtree at `id`; the copy starts `Unresolved` and has
    /// no parent.
    pub fn copy(&mut self, id: NodeId) -> NodeId {
        let original = self.kind(id).clone();
        let kind = match original {
            NodeKind::Array(items) => NodeKind::Array(self.copy_all(&items)),
            NodeKind::Object { pairs, bindings } => NodeKind::Object {
                pairs: self.copy_all(&pairs),
                bindings,
            },
            NodeKind::Pair {
                key,
                value,
                constraint,
            } => NodeKind::Pair {
                key,
                value: self.copy(value),
                constraint: constraint.map(|c| self.copy_constraint(c)),
            },
            NodeKind::Navigate { base, path } => NodeKind::Navigate {
                base: self.copy(base),
                path,
            },
            NodeKind::Binary { op, lhs, rhs } => NodeKind::Binary {
                op,
                lhs: self.copy(lhs),
                rhs: self.copy(rhs),
            },
            NodeKind::Not(operand) => NodeKind::Not(self.copy(operand)),
            NodeKind::Call {
                namespace,
                name,
                args,
            } => NodeKind::Call {
                namespace,
                name,
                args: self.copy_all(&args),
            },
            NodeKind::Block { bindings, body } => NodeKind::Block {
                bindings: bindings
                    .into_iter()
                    .map(|(name, node)| (name, self.copy(node)))
                    .collect(),
                body: self.copy(body),
            },
            NodeKind::Constrained { value, constraint } => NodeKind::Constrained {
                value: self.copy(value),
                constraint: self.copy_constraint(constraint),
            },
            leaf => leaf,
        };
        self.push(kind)
    }

    fn copy_all(&mut self, ids: &[NodeId]) -> Vec<NodeId> {
        ids.iter().map(|id| self.copy(*id)).collect()
    }

    fn copy_constraint(&mut self, constraint: Constraint) -> Constraint {
        Constraint {
            predicate: self.copy(constraint.predicate),
            source: constraint.source,
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        for child in children_of(&kind) {
            self.nodes[child.0].parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            state: NodeState::Unresolved,
            parent: None,
        });
        id
    }
}

fn children_of(kind: &NodeKind) -> Vec<NodeId> {
    match kind {
        NodeKind::Array(items) => items.clone(),
        NodeKind::Object { pairs, .. } => pairs.clone(),
        NodeKind::Pair {
            value, constraint, ..
        } => std::iter::once(*value)
            .chain(constraint.as_ref().map(|c| c.predicate))
            .collect(),
        NodeKind::Navigate { base, .. } => vec![*base],
        NodeKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        NodeKind::Not(operand) => vec![*operand],
        NodeKind::Call { args, .. } => args.clone(),
        NodeKind::Block { bindings, body } => bindings
            .iter()
            .map(|(_, node)| *node)
            .chain(std::iter::once(*body))
            .collect(),
        NodeKind::Constrained { value, constraint } => vec![*value, constraint.predicate],
        NodeKind::Literal(_)
        | NodeKind::CurrentValue
        | NodeKind::CurrentPath
        | NodeKind::Variable(_) => Vec::new(),
    }
}

// ── Builders ─────────────────────────────────────────────────────────────────

impl Ast {
    pub fn literal(&mut self, value: Value) -> NodeId {
        self.push(NodeKind::Literal(value))
    }

    pub fn null(&mut self) -> NodeId {
        self.literal(Value::Null)
    }

    pub fn boolean(&mut self, b: bool) -> NodeId {
        self.literal(Value::Bool(b))
    }

    pub fn number(&mut self, n: f64) -> NodeId {
        self.literal(Value::number(n))
    }

    pub fn string(&mut self, s: &str) -> NodeId {
        self.literal(Value::from(s))
    }

    pub fn array(&mut self, items: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Array(items))
    }

    /// Object constructor over `Pair` nodes.
    pub fn object(&mut self, pairs: Vec<NodeId>) -> NodeId {
        self.object_with_bindings(pairs, Vec::new())
    }

    pub fn object_with_bindings(
        &mut self,
        pairs: Vec<NodeId>,
        bindings: Vec<(BinaryOp, FunctionRef)>,
    ) -> NodeId {
        self.push(NodeKind::Object { pairs, bindings })
    }

    pub fn pair(&mut self, key: &str, value: NodeId) -> NodeId {
        self.push(NodeKind::Pair {
            key: key.to_string(),
            value,
            constraint: None,
        })
    }

    pub fn constrained_pair(
        &mut self,
        key: &str,
        value: NodeId,
        predicate: NodeId,
        source: &str,
    ) -> NodeId {
        self.push(NodeKind::Pair {
            key: key.to_string(),
            value,
            constraint: Some(Constraint {
                predicate,
                source: source.to_string(),
            }),
        })
    }

    pub fn current_value(&mut self) -> NodeId {
        self.push(NodeKind::CurrentValue)
    }

    pub fn current_path(&mut self) -> NodeId {
        self.push(NodeKind::CurrentPath)
    }

    pub fn variable(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Variable(name.to_string()))
    }

    pub fn navigate(&mut self, base: NodeId, path: Path) -> NodeId {
        self.push(NodeKind::Navigate { base, path })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.push(NodeKind::Binary { op, lhs, rhs })
    }

    pub fn not(&mut self, operand: NodeId) -> NodeId {
        self.push(NodeKind::Not(operand))
    }

    pub fn call(&mut self, namespace: &str, name: &str, args: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Call {
            namespace: namespace.to_string(),
            name: name.to_string(),
            args,
        })
    }

    pub fn block(&mut self, bindings: Vec<(&str, NodeId)>, body: NodeId) -> NodeId {
        self.push(NodeKind::Block {
            bindings: bindings
                .into_iter()
                .map(|(name, node)| (name.to_string(), node))
                .collect(),
            body,
        })
    }

    pub fn constrained(&mut self, value: NodeId, predicate: NodeId, source: &str) -> NodeId {
        self.push(NodeKind::Constrained {
            value,
            constraint: Constraint {
                predicate,
                source: source.to_string(),
            },
        })
    }
}

// ── Unparsing ────────────────────────────────────────────────────────────────

impl Ast {
    /// Expression text of the subtree at `id`.
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Literal(v) => out.push_str(&v.to_string()),
            NodeKind::Array(items) => {
                out.push('[');
                self.write_list(items, out);
                out.push(']');
            }
            NodeKind::Object { pairs, .. } => {
                out.push('{');
                self.write_list(pairs, out);
                out.push('}');
            }
            NodeKind::Pair {
                key,
                value,
                constraint,
            } => {
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push_str(": ");
                self.write_node(*value, out);
                if let Some(c) = constraint {
                    let _ = write!(out, " :: {}", c.source);
                }
            }
            NodeKind::CurrentValue => out.push('$'),
            NodeKind::CurrentPath => out.push('@'),
            NodeKind::Variable(name) => {
                let _ = write!(out, "${}", name);
            }
            NodeKind::Navigate { base, path } => {
                self.write_node(*base, out);
                out.push_str(&path.to_string());
            }
            NodeKind::Binary { op, lhs, rhs } => {
                self.write_operand(*lhs, out);
                let _ = write!(out, " {} ", op);
                self.write_operand(*rhs, out);
            }
            NodeKind::Not(operand) => {
                out.push_str("not(");
                self.write_node(*operand, out);
                out.push(')');
            }
            NodeKind::Call {
                namespace,
                name,
                args,
            } => {
                if !namespace.is_empty() {
                    let _ = write!(out, "{}:", namespace);
                }
                let _ = write!(out, "{}(", name);
                self.write_list(args, out);
                out.push(')');
            }
            NodeKind::Block { bindings, body } => {
                out.push('(');
                for (name, node) in bindings {
                    let _ = write!(out, "${} := ", name);
                    self.write_node(*node, out);
                    out.push_str("; ");
                }
                self.write_node(*body, out);
                out.push(')');
            }
            NodeKind::Constrained { value, constraint } => {
                self.write_operand(*value, out);
                let _ = write!(out, " :: {}", constraint.source);
            }
        }
    }

    fn write_list(&self, ids: &[NodeId], out: &mut String) {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_node(*id, out);
        }
    }

    /// Nested binary operations are parenthesised.
    fn write_operand(&self, id: NodeId, out: &mut String) {
        if matches!(self.kind(id), NodeKind::Binary { .. } | NodeKind::Constrained { .. }) {
            out.push('(');
            self.write_node(id, out);
            out.push(')');
        } else {
            self.write_node(id, out);
        }
    }
}
