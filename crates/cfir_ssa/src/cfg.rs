use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use cfir_names::{Name, NameAllocator};

use crate::{
    block::{Block, Position},
    ir::{
        inst::{Jump, Payload, Stmt},
        instr::{Instr, Phi},
        ty::Ty,
        BlockId, Constant, InstId, NodeId,
    },
    observe::Observers,
    Error, FxIndexMap, FxIndexSet, Result,
};

// ---------------------------------------------------------------------------
// CfgId
// ---------------------------------------------------------------------------

/// Process-unique identity of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CfgId(u32);

impl CfgId {
    fn fresh() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CfgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cfg{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// NodeData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Phi(Phi),
    Stmt(Instr<Stmt>),
    Jump(Instr<Jump>),
}

/// A local instruction and the block that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub(crate) block: BlockId,
    pub(crate) kind: NodeKind,
}

impl NodeData {
    #[inline]
    pub fn block(&self) -> &BlockId {
        &self.block
    }

    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Type of the `index`th output, `None` if there is no such output.
    pub fn output_ty(&self, index: u32) -> Option<Ty> {
        match &self.kind {
            NodeKind::Phi(phi) => (index == 0).then_some(phi.class()),
            NodeKind::Stmt(instr) => instr.tys().get(index as usize).copied(),
            NodeKind::Jump(_) => None,
        }
    }

    pub fn arity(&self) -> usize {
        match &self.kind {
            NodeKind::Phi(_) => 1,
            NodeKind::Stmt(instr) => instr.arity(),
            NodeKind::Jump(_) => 0,
        }
    }

    pub fn args(&self) -> Vec<&NodeId> {
        match &self.kind {
            NodeKind::Phi(phi) => phi.args(),
            NodeKind::Stmt(instr) => instr.args(),
            NodeKind::Jump(instr) => instr.args(),
        }
    }

    /// Required type of each argument, positionally.
    pub fn arg_slots(&self) -> Vec<Ty> {
        match &self.kind {
            NodeKind::Phi(phi) => vec![phi.class(); phi.args().len()],
            NodeKind::Stmt(instr) => instr.payload().arg_slots(),
            NodeKind::Jump(instr) => instr.payload().arg_slots(),
        }
    }

    pub fn as_phi(&self) -> Option<&Phi> {
        match &self.kind {
            NodeKind::Phi(phi) => Some(phi),
            _ => None,
        }
    }

    pub fn as_stmt(&self) -> Option<&Instr<Stmt>> {
        match &self.kind {
            NodeKind::Stmt(instr) => Some(instr),
            _ => None,
        }
    }

    pub fn as_jump(&self) -> Option<&Instr<Jump>> {
        match &self.kind {
            NodeKind::Jump(instr) => Some(instr),
            _ => None,
        }
    }
}

pub(crate) fn node_ty(nodes: &FxIndexMap<InstId, NodeData>, node: &NodeId) -> Option<Ty> {
    match node {
        NodeId::Global(g) => Some(g.ty()),
        NodeId::Local(id) => nodes.get(id).and_then(|data| data.output_ty(0)),
        NodeId::Aux(id, index) => nodes.get(id).and_then(|data| data.output_ty(*index)),
    }
}

// ---------------------------------------------------------------------------
// Cfg
// ---------------------------------------------------------------------------

/// A control-flow graph.
///
/// The graph owns its blocks and a table of every live local instruction.
/// Blocks are kept in creation order, which is also the order of
/// [`Cfg::iter`]. Nothing here is shared between graphs except globals.
pub struct Cfg {
    id: CfgId,
    pub(crate) entry: BlockId,
    pub(crate) blocks: FxIndexMap<BlockId, Block>,
    pub(crate) exits: FxIndexSet<BlockId>,
    pub(crate) nodes: FxIndexMap<InstId, NodeData>,
    pub(crate) block_names: NameAllocator,
    pub(crate) node_names: NameAllocator,
    pub(crate) observers: Observers,
    pub(crate) next_stamp: u64,
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

impl Cfg {
    /// Creates a graph with a single, empty block named `entry`.
    pub fn new() -> Self {
        Self::with_entry("entry")
    }

    pub fn with_entry(name: impl Into<Name>) -> Self {
        let mut block_names = NameAllocator::new();
        let entry = BlockId::new(block_names.next(&name.into()));
        let mut blocks = FxIndexMap::default();
        blocks.insert(entry.clone(), Block::new(entry.clone()));
        let mut exits = FxIndexSet::default();
        exits.insert(entry.clone());
        Self {
            id: CfgId::fresh(),
            entry,
            blocks,
            exits,
            nodes: FxIndexMap::default(),
            block_names,
            node_names: NameAllocator::new(),
            observers: Observers::default(),
            next_stamp: 1,
        }
    }

    /// Deep copy with a fresh identity. Observers are not carried over.
    pub fn duplicate(&self) -> Self {
        Self {
            id: CfgId::fresh(),
            entry: self.entry.clone(),
            blocks: self.blocks.clone(),
            exits: self.exits.clone(),
            nodes: self.nodes.clone(),
            block_names: self.block_names.clone(),
            node_names: self.node_names.clone(),
            observers: Observers::default(),
            next_stamp: self.next_stamp,
        }
    }

    #[inline]
    pub fn id(&self) -> CfgId {
        self.id
    }

    #[inline]
    pub fn entry(&self) -> &BlockId {
        &self.entry
    }

    /// Number of blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the graph is what [`Cfg::new`] makes: a lone entry block
    /// holding no instructions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.len() == 1 && self.nodes.is_empty()
    }

    /// Number of live local instructions, phis included.
    #[inline]
    pub fn num_insts(&self) -> usize {
        self.nodes.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = &BlockId> {
        self.blocks.keys()
    }

    #[inline]
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    #[inline]
    pub fn has_block(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    pub(crate) fn try_block(&self, id: &BlockId) -> Result<&Block> {
        self.blocks
            .get(id)
            .ok_or_else(|| Error::NoSuchBlock(id.clone()))
    }

    pub(crate) fn try_block_mut(&mut self, id: &BlockId) -> Result<&mut Block> {
        self.blocks
            .get_mut(id)
            .ok_or_else(|| Error::NoSuchBlock(id.clone()))
    }

    /// Blocks without successors.
    pub fn exits(&self) -> impl Iterator<Item = &BlockId> {
        self.exits.iter()
    }

    #[inline]
    pub fn is_exit(&self, id: &BlockId) -> bool {
        self.exits.contains(id)
    }

    #[inline]
    pub fn inst(&self, id: &InstId) -> Option<&NodeData> {
        self.nodes.get(id)
    }

    pub(crate) fn try_inst(&self, id: &InstId) -> Result<&NodeData> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::NoSuchNode(id.clone()))
    }

    pub fn phi(&self, id: &InstId) -> Option<&Phi> {
        self.nodes.get(id).and_then(NodeData::as_phi)
    }

    pub fn stmt(&self, id: &InstId) -> Option<&Instr<Stmt>> {
        self.nodes.get(id).and_then(NodeData::as_stmt)
    }

    /// The jump ending `block`, if it has one.
    pub fn jump(&self, block: &BlockId) -> Option<&Instr<Jump>> {
        let id = self.blocks.get(block)?.jump.as_ref()?;
        self.nodes.get(id).and_then(NodeData::as_jump)
    }

    /// Successor blocks, in jump target order and without repeats.
    pub fn successors(&self, block: &BlockId) -> Vec<BlockId> {
        let mut succs: Vec<BlockId> = Vec::new();
        if let Some(jump) = self.jump(block) {
            for target in jump.payload().targets() {
                if !succs.contains(target) {
                    succs.push(target.clone());
                }
            }
        }
        succs
    }

    /// Predecessor blocks, in the order edges were added.
    pub fn predecessors(&self, block: &BlockId) -> Vec<BlockId> {
        self.blocks
            .get(block)
            .map(|b| b.preds().cloned().collect())
            .unwrap_or_default()
    }

    /// Where `id` sits inside its block.
    pub fn locate(&self, id: &InstId) -> Option<(&BlockId, Position)> {
        let data = self.nodes.get(id)?;
        let block = self.blocks.get(&data.block)?;
        let position = match &data.kind {
            NodeKind::Phi(_) => Position::Phi(block.phis.iter().position(|p| p == id)?),
            NodeKind::Stmt(_) => Position::Stmt(block.stmts.iter().position(|s| s == id)?),
            NodeKind::Jump(_) => Position::Jump,
        };
        Some((&data.block, position))
    }

    /// Returns `true` for globals and for live outputs of local instructions.
    #[inline]
    pub fn contains(&self, node: &NodeId) -> bool {
        self.ty_of(node).is_some()
    }

    #[inline]
    pub fn ty_of(&self, node: &NodeId) -> Option<Ty> {
        node_ty(&self.nodes, node)
    }

    /// Type used while computing cached data; unknown nodes read as `Value`.
    pub(crate) fn ty_or_value(&self, node: &NodeId) -> Ty {
        self.ty_of(node).unwrap_or(Ty::Value)
    }

    pub fn node(&self, id: &NodeId) -> Option<NodeRef<'_>> {
        self.contains(id).then(|| NodeRef {
            cfg: self,
            id: id.clone(),
        })
    }

    /// Every output of an instruction, primary output first.
    pub fn returns(&self, id: &InstId) -> Vec<NodeId> {
        let arity = self.nodes.get(id).map_or(0, NodeData::arity);
        (0..arity as u32)
            .map(|index| match index {
                0 => NodeId::Local(id.clone()),
                i => NodeId::Aux(id.clone(), i),
            })
            .collect()
    }

    /// An identifier for a new block named `name`, not yet reserved.
    pub fn fresh_block_id(&self, name: &Name) -> BlockId {
        BlockId::new(self.block_names.peek(name))
    }

    /// An identifier for a new instruction named `name`, not yet reserved.
    pub fn fresh_inst_id(&self, name: &Name) -> InstId {
        InstId::new(self.node_names.peek(name))
    }

    /// Distinct identifiers for a batch of new instructions, not yet
    /// reserved. They stay valid until the next instruction is added.
    pub fn fresh_inst_ids<'a>(&mut self, names: impl IntoIterator<Item = &'a Name>) -> Vec<InstId> {
        let ids: Vec<InstId> = names
            .into_iter()
            .map(|name| InstId::new(self.node_names.next(name)))
            .collect();
        for id in &ids {
            self.node_names.release(id.local());
        }
        ids
    }

    pub(crate) fn stmt_kind(&self, stmt: Stmt) -> NodeKind {
        NodeKind::Stmt(Instr::new(stmt, &|n| self.ty_or_value(n)))
    }

    pub(crate) fn jump_kind(&self, jump: Jump) -> NodeKind {
        NodeKind::Jump(Instr::new(jump, &|n| self.ty_or_value(n)))
    }
}

impl Clone for Cfg {
    fn clone(&self) -> Self {
        self.duplicate()
    }
}

impl fmt::Debug for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cfg")
            .field("id", &self.id)
            .field("entry", &self.entry)
            .field("blocks", &self.blocks.len())
            .field("insts", &self.nodes.len())
            .field("observers", &self.observers)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NodeRef
// ---------------------------------------------------------------------------

/// A read-only view of a node that is live in some graph.
#[derive(Debug, Clone)]
pub struct NodeRef<'a> {
    cfg: &'a Cfg,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    #[inline]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// The graph the node belongs to, `None` for globals.
    pub fn owner(&self) -> Option<CfgId> {
        (!self.id.is_global()).then_some(self.cfg.id)
    }

    /// The defining instruction, `None` for globals.
    pub fn origin(&self) -> Option<&'a NodeData> {
        self.cfg.nodes.get(self.id.origin()?)
    }

    pub fn block(&self) -> Option<&'a BlockId> {
        self.origin().map(NodeData::block)
    }

    pub fn ty(&self) -> Ty {
        self.cfg.ty_or_value(&self.id)
    }

    /// The environment an environment node is nested in.
    ///
    /// `None` for the outermost environment, for nodes that are not
    /// environments, and for environments of unknown provenance.
    pub fn parent_env(&self) -> Option<NodeRef<'a>> {
        if self.ty() != Ty::Env {
            return None;
        }
        match &self.origin()?.kind {
            NodeKind::Stmt(instr) => match instr.payload() {
                Stmt::MkEnv { parent, .. } => {
                    let parent = parent.as_ref()?;
                    Some(NodeRef {
                        cfg: self.cfg,
                        id: parent.clone(),
                    })
                }
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_global_env(&self) -> bool {
        matches!(
            self.id.as_global().map(|g| g.constant()),
            Some(Constant::GlobalEnv)
        )
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

struct Outputs<'a>(&'a InstId, &'a [Ty]);

impl fmt::Display for Outputs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ty) in self.1.iter().enumerate() {
            match i {
                0 => write!(f, "{}: {}", self.0, ty)?,
                i => write!(f, ", {}#{}: {}", self.0, i, ty)?,
            }
        }
        Ok(())
    }
}

impl Cfg {
    fn fmt_block(&self, f: &mut fmt::Formatter<'_>, block: &Block) -> fmt::Result {
        write!(f, "{}:", block.id())?;
        let mut preds: Vec<_> = block.preds().collect();
        if !preds.is_empty() {
            preds.sort();
            write!(f, " ; preds = ")?;
            for (i, pred) in preds.into_iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", pred)?;
            }
        }
        writeln!(f)?;

        for id in block.phis() {
            match self.phi(id) {
                Some(phi) => writeln!(f, "  {} = {}", id, phi)?,
                None => writeln!(f, "  {} = <missing>", id)?,
            }
        }
        for id in block.stmts() {
            match self.stmt(id) {
                Some(instr) if instr.arity() == 0 => writeln!(f, "  {}", instr)?,
                Some(instr) => writeln!(f, "  {} = {}", Outputs(id, instr.tys()), instr)?,
                None => writeln!(f, "  {} = <missing>", id)?,
            }
        }
        match self.jump(block.id()) {
            Some(jump) => writeln!(f, "  {}", jump),
            None => writeln!(f, "  <no jump>"),
        }
    }
}

/// Prints the entry block first, then every other block by identifier, so
/// that equal graphs print the same regardless of their edit history.
impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest: Vec<&Block> = self
            .blocks
            .values()
            .filter(|b| b.id() != &self.entry)
            .collect();
        rest.sort_by(|a, b| a.id().cmp(b.id()));

        if let Some(entry) = self.blocks.get(&self.entry) {
            self.fmt_block(f, entry)?;
        }
        for block in rest {
            writeln!(f)?;
            self.fmt_block(f, block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::inst::BinaryOp;

    #[test]
    fn test_new_graph_has_an_exit_entry() {
        let cfg = Cfg::new();
        assert_eq!(cfg.len(), 1);
        assert_eq!(cfg.entry().to_string(), "entry");
        assert!(cfg.is_exit(cfg.entry()));
        assert_eq!(cfg.to_string(), "entry:\n  <no jump>\n");
    }

    #[test]
    fn test_duplicate_gets_a_new_identity() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        cfg.push_stmt(&entry, Stmt::param(0, Ty::Int)).unwrap();
        let copy = cfg.duplicate();
        assert_ne!(copy.id(), cfg.id());
        assert_eq!(copy.to_string(), cfg.to_string());
    }

    #[test]
    fn test_returns_and_types() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let a = cfg.push_stmt(&entry, Stmt::param(0, Ty::Int)).unwrap();
        let dm = cfg
            .push_stmt(&entry, Stmt::div_mod(a.clone(), NodeId::int(3)))
            .unwrap();
        let st = cfg
            .push_stmt(&entry, Stmt::st_var(NodeId::global_env(), "x", a.clone()))
            .unwrap();

        assert_eq!(
            cfg.returns(&dm),
            vec![NodeId::Local(dm.clone()), NodeId::Aux(dm.clone(), 1)]
        );
        assert!(cfg.returns(&st).is_empty());
        assert_eq!(cfg.ty_of(&NodeId::Aux(dm.clone(), 1)), Some(Ty::Int));
        assert_eq!(cfg.ty_of(&NodeId::Aux(dm.clone(), 2)), None);
        assert!(!cfg.contains(&NodeId::Local(st)));
        assert_eq!(cfg.locate(&dm), Some((&entry, Position::Stmt(1))));
    }

    #[test]
    fn test_node_ref() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let outer = cfg
            .push_stmt(&entry, Stmt::mk_env(Some(NodeId::global_env()), vec![]))
            .unwrap();
        let inner = cfg
            .push_stmt(&entry, Stmt::mk_env(Some(outer.clone().into()), vec![]))
            .unwrap();

        let node = cfg.node(&inner.clone().into()).unwrap();
        assert_eq!(node.owner(), Some(cfg.id()));
        assert_eq!(node.block(), Some(&entry));
        let parent = node.parent_env().unwrap();
        assert_eq!(parent.id(), &NodeId::Local(outer));
        assert!(parent.parent_env().unwrap().is_global_env());

        let global = cfg.node(&NodeId::int(1)).unwrap();
        assert_eq!(global.owner(), None);
        assert!(global.parent_env().is_none());
        assert!(cfg.node(&NodeId::from(InstId::from("nope"))).is_none());
    }

    #[test]
    fn test_dump() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let x = cfg.push_stmt(&entry, Stmt::param(0, Ty::Int)).unwrap();
        let dm = cfg
            .push_stmt(&entry, Stmt::div_mod(x.clone(), NodeId::int(2)))
            .unwrap();
        let sum = cfg
            .push_stmt(&entry, Stmt::binary(BinaryOp::Add, dm, NodeId::int(1)))
            .unwrap();
        cfg.add_jump(&entry, Jump::ret(sum)).unwrap();

        let expected = "\
entry:
  %param: int = param int #0
  %divmod: int, %divmod#1: int = divmod %param, 2
  %add: int = add %divmod, 1
  ret %add
";
        assert_eq!(cfg.to_string(), expected);
    }

    #[test]
    fn test_fresh_inst_ids_are_distinct() {
        let mut cfg = Cfg::new();
        let name = Name::new("t");
        let ids = cfg.fresh_inst_ids([&name, &name, &name]);
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_eq!(cfg.fresh_inst_id(&name), ids[0]);
    }

    #[test]
    fn test_is_empty() {
        let mut cfg = Cfg::new();
        assert!(cfg.is_empty());
        let entry = cfg.entry().clone();
        cfg.push_stmt(&entry, Stmt::Nop).unwrap();
        assert!(!cfg.is_empty());
        cfg.remove_stmt(&entry, 0).unwrap();
        assert!(cfg.is_empty());

        let other = cfg.add_bb("other").unwrap();
        assert!(!cfg.is_empty());
        cfg.remove_bb(&other).unwrap();
        assert!(cfg.is_empty());
    }
}
