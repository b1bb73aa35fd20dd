pub mod builder;
pub mod inst;
pub mod instr;
pub mod ty;

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use cfir_names::{LocalId, Name};

use crate::ir::ty::Ty;

// ---------------------------------------------------------------------------
// BlockId
// ---------------------------------------------------------------------------

/// Identifier of a basic block, unique within its graph.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(LocalId);

impl BlockId {
    #[inline]
    pub fn new(id: LocalId) -> Self {
        Self(id)
    }

    #[inline]
    pub fn local(&self) -> &LocalId {
        &self.0
    }

    #[inline]
    pub fn name(&self) -> &Name {
        self.0.name()
    }
}

impl From<&str> for BlockId {
    fn from(name: &str) -> Self {
        Self(LocalId::from(name))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// InstId
// ---------------------------------------------------------------------------

/// Identifier of a local instruction or phi, unique within its graph.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstId(LocalId);

impl InstId {
    #[inline]
    pub fn new(id: LocalId) -> Self {
        Self(id)
    }

    #[inline]
    pub fn local(&self) -> &LocalId {
        &self.0
    }

    #[inline]
    pub fn name(&self) -> &Name {
        self.0.name()
    }
}

impl From<&str> for InstId {
    fn from(name: &str) -> Self {
        Self(LocalId::from(name))
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Debug for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Constant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Nil,
    /// A closure provided by the runtime.
    Builtin(Name),
    /// The outermost environment.
    GlobalEnv,
}

impl Constant {
    pub fn ty(&self) -> Ty {
        match self {
            Constant::Int(_) => Ty::Int,
            Constant::Bool(_) => Ty::Bool,
            Constant::Nil => Ty::Value,
            Constant::Builtin(_) => Ty::Closure,
            Constant::GlobalEnv => Ty::Env,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::Nil => write!(f, "nil"),
            Constant::Builtin(name) => write!(f, "@{name}"),
            Constant::GlobalEnv => write!(f, "genv"),
        }
    }
}

// ---------------------------------------------------------------------------
// GlobalId
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct GlobalNode {
    constant: Constant,
    repr: Box<str>,
}

/// A graph-independent node, shareable between graphs.
///
/// Two global ids are equal when their constants have the same type and the
/// same canonical printed form, regardless of which allocation holds them.
#[derive(Debug, Clone)]
pub struct GlobalId(Arc<GlobalNode>);

impl GlobalId {
    pub fn new(constant: Constant) -> Self {
        let repr = constant.to_string().into_boxed_str();
        Self(Arc::new(GlobalNode { constant, repr }))
    }

    #[inline]
    pub fn constant(&self) -> &Constant {
        &self.0.constant
    }

    #[inline]
    pub fn ty(&self) -> Ty {
        self.0.constant.ty()
    }

    #[inline]
    pub fn repr(&self) -> &str {
        &self.0.repr
    }
}

impl PartialEq for GlobalId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || (self.ty() == other.ty() && self.repr() == other.repr())
    }
}

impl Eq for GlobalId {}

impl Hash for GlobalId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty().hash(state);
        self.repr().hash(state);
    }
}

impl PartialOrd for GlobalId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GlobalId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.ty(), self.repr()).cmp(&(other.ty(), other.repr()))
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.repr())
    }
}

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Anything an instruction can take as an argument.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeId {
    /// The primary output of a local instruction or phi.
    Local(InstId),
    /// A secondary output of a multi-output instruction, numbered from 1.
    Aux(InstId, u32),
    /// A constant.
    Global(GlobalId),
}

impl NodeId {
    pub fn int(value: i64) -> Self {
        Self::Global(GlobalId::new(Constant::Int(value)))
    }

    pub fn bool(value: bool) -> Self {
        Self::Global(GlobalId::new(Constant::Bool(value)))
    }

    pub fn nil() -> Self {
        Self::Global(GlobalId::new(Constant::Nil))
    }

    pub fn builtin(name: impl Into<Name>) -> Self {
        Self::Global(GlobalId::new(Constant::Builtin(name.into())))
    }

    pub fn global_env() -> Self {
        Self::Global(GlobalId::new(Constant::GlobalEnv))
    }

    /// The instruction that defines this node, `None` for globals.
    #[inline]
    pub fn origin(&self) -> Option<&InstId> {
        match self {
            NodeId::Local(id) | NodeId::Aux(id, _) => Some(id),
            NodeId::Global(_) => None,
        }
    }

    /// Which output of its origin this node is.
    #[inline]
    pub fn output_index(&self) -> u32 {
        match self {
            NodeId::Aux(_, index) => *index,
            NodeId::Local(_) | NodeId::Global(_) => 0,
        }
    }

    #[inline]
    pub fn is_global(&self) -> bool {
        matches!(self, NodeId::Global(_))
    }

    #[inline]
    pub fn as_global(&self) -> Option<&GlobalId> {
        match self {
            NodeId::Global(g) => Some(g),
            _ => None,
        }
    }
}

impl From<InstId> for NodeId {
    fn from(id: InstId) -> Self {
        NodeId::Local(id)
    }
}

impl From<&InstId> for NodeId {
    fn from(id: &InstId) -> Self {
        NodeId::Local(id.clone())
    }
}

impl From<GlobalId> for NodeId {
    fn from(id: GlobalId) -> Self {
        NodeId::Global(id)
    }
}

impl From<Constant> for NodeId {
    fn from(constant: Constant) -> Self {
        NodeId::Global(GlobalId::new(constant))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Local(id) => write!(f, "{id}"),
            NodeId::Aux(id, index) => write!(f, "{id}#{index}"),
            NodeId::Global(g) => write!(f, "{g}"),
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
