use cfir_names::Name;

use crate::{
    edit::Edit,
    infra::subst::{CascadingUpdate, Snapshot},
    ir::{
        inst::{Jump, Payload, Stmt},
        ty::Ty,
        BlockId, InstId, NodeId,
    },
    Cfg, Error, FxIndexSet, Result,
};

/// Where an instruction sits inside its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Phi(usize),
    Stmt(usize),
    Jump,
}

/// A basic block: phis, then statements, then at most one jump.
///
/// Successors are not stored; they are the targets of the jump.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    id: BlockId,
    pub(crate) preds: FxIndexSet<BlockId>,
    pub(crate) phis: Vec<InstId>,
    pub(crate) stmts: Vec<InstId>,
    pub(crate) jump: Option<InstId>,
    pub(crate) stamp: u64,
}

impl Block {
    pub(crate) fn new(id: BlockId) -> Self {
        Self {
            id,
            stamp: 0,
            preds: FxIndexSet::default(),
            phis: Vec::new(),
            stmts: Vec::new(),
            jump: None,
        }
    }

    #[inline]
    pub fn id(&self) -> &BlockId {
        &self.id
    }

    /// When the block was created. No two blocks a graph has ever held share
    /// a stamp, even if they share an identifier.
    #[inline]
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn preds(&self) -> impl Iterator<Item = &BlockId> {
        self.preds.iter()
    }

    #[inline]
    pub fn num_preds(&self) -> usize {
        self.preds.len()
    }

    #[inline]
    pub fn has_pred(&self, block: &BlockId) -> bool {
        self.preds.contains(block)
    }

    #[inline]
    pub fn phis(&self) -> &[InstId] {
        &self.phis
    }

    #[inline]
    pub fn stmts(&self) -> &[InstId] {
        &self.stmts
    }

    #[inline]
    pub fn jump(&self) -> Option<&InstId> {
        self.jump.as_ref()
    }

    /// Number of statements.
    #[inline]
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Every instruction of the block, in order.
    pub fn insts(&self) -> impl Iterator<Item = &InstId> {
        self.phis
            .iter()
            .chain(self.stmts.iter())
            .chain(self.jump.iter())
    }
}

// ---------------------------------------------------------------------------
// Block mutators
// ---------------------------------------------------------------------------

impl Cfg {
    /// Adds an empty, unlinked block.
    pub fn add_bb(&mut self, name: impl Into<Name>) -> Result<BlockId> {
        let id = self.fresh_block_id(&name.into());
        self.apply(Edit::InsertBlock { id: id.clone() })?;
        Ok(id)
    }

    /// Removes a block and everything in it.
    ///
    /// Edges into and out of the block are left alone; callers unlink them
    /// first or the verifier will complain.
    pub fn remove_bb(&mut self, block: &BlockId) -> Result<()> {
        self.apply(Edit::RemoveBlock { id: block.clone() })?;
        Ok(())
    }

    pub fn insert_stmt(&mut self, block: &BlockId, index: usize, stmt: Stmt) -> Result<InstId> {
        let name = Name::new(stmt.mnemonic());
        self.insert_named_stmt(block, index, name, stmt)
    }

    pub fn insert_named_stmt(
        &mut self,
        block: &BlockId,
        index: usize,
        name: impl Into<Name>,
        stmt: Stmt,
    ) -> Result<InstId> {
        let id = self.fresh_inst_id(&name.into());
        self.apply(Edit::InsertStmt {
            block: block.clone(),
            index,
            id: id.clone(),
            stmt,
        })?;
        Ok(id)
    }

    /// Appends a statement.
    pub fn push_stmt(&mut self, block: &BlockId, stmt: Stmt) -> Result<InstId> {
        let index = self.try_block(block)?.len();
        self.insert_stmt(block, index, stmt)
    }

    /// Inserts several statements at once, in order, starting at `index`.
    pub fn insert_stmts(
        &mut self,
        block: &BlockId,
        index: usize,
        stmts: Vec<Stmt>,
    ) -> Result<Vec<InstId>> {
        let names: Vec<Name> = stmts.iter().map(|s| Name::new(s.mnemonic())).collect();
        let ids = self.fresh_inst_ids(&names);
        self.apply(Edit::InsertStmts {
            block: block.clone(),
            index,
            stmts: ids.iter().cloned().zip(stmts).collect(),
        })?;
        Ok(ids)
    }

    pub fn remove_stmt(&mut self, block: &BlockId, index: usize) -> Result<()> {
        self.apply(Edit::RemoveStmt {
            block: block.clone(),
            index,
        })?;
        Ok(())
    }

    pub fn remove_stmts(&mut self, block: &BlockId, index: usize, count: usize) -> Result<()> {
        self.apply(Edit::RemoveStmts {
            block: block.clone(),
            index,
            count,
        })?;
        Ok(())
    }

    /// Removes any local instruction: a phi, a statement or a jump.
    pub fn remove(&mut self, id: &InstId) -> Result<()> {
        let (block, position) = self
            .locate(id)
            .map(|(block, position)| (block.clone(), position))
            .ok_or_else(|| Error::NoSuchNode(id.clone()))?;
        match position {
            Position::Phi(_) => self.remove_phi(&block, id),
            Position::Stmt(index) => self.remove_stmt(&block, index),
            Position::Jump => self.remove_jump(&block),
        }
    }

    /// Swaps the payload of the statement at `index`. The new payload must
    /// produce as many outputs as the old one.
    pub fn replace_stmt(&mut self, block: &BlockId, index: usize, stmt: Stmt) -> Result<()> {
        self.apply(Edit::ReplaceStmt {
            block: block.clone(),
            index,
            stmt,
        })?;
        Ok(())
    }

    pub fn add_jump(&mut self, block: &BlockId, jump: Jump) -> Result<InstId> {
        if self.try_block(block)?.jump.is_some() {
            return Err(Error::DuplicateJump(block.clone()));
        }
        let id = self.fresh_inst_id(&Name::new(jump.mnemonic()));
        self.apply(Edit::SetJump {
            block: block.clone(),
            jump: Some((id.clone(), jump)),
        })?;
        Ok(id)
    }

    /// Replaces the jump of `block`, keeping its identifier.
    pub fn replace_jump(&mut self, block: &BlockId, jump: Jump) -> Result<InstId> {
        let id = self
            .try_block(block)?
            .jump
            .clone()
            .ok_or_else(|| Error::NoJump(block.clone()))?;
        self.apply(Edit::SetJump {
            block: block.clone(),
            jump: Some((id.clone(), jump)),
        })?;
        Ok(id)
    }

    pub fn remove_jump(&mut self, block: &BlockId) -> Result<()> {
        if self.try_block(block)?.jump.is_none() {
            return Err(Error::NoJump(block.clone()));
        }
        self.apply(Edit::SetJump {
            block: block.clone(),
            jump: None,
        })?;
        Ok(())
    }

    /// Adds a phi with an unset input for every predecessor.
    pub fn add_phi(&mut self, block: &BlockId, class: Ty) -> Result<InstId> {
        self.add_phi_with(block, "phi", class, Vec::new())
    }

    /// Adds a phi with the given inputs; predecessors not mentioned get an
    /// unset input.
    pub fn add_phi_with(
        &mut self,
        block: &BlockId,
        name: impl Into<Name>,
        class: Ty,
        inputs: Vec<(BlockId, NodeId)>,
    ) -> Result<InstId> {
        let index = self.try_block(block)?.phis.len();
        let id = self.fresh_inst_id(&name.into());
        for (_, node) in &inputs {
            self.check_phi_input(class, node)?;
        }
        self.apply(Edit::InsertPhi {
            block: block.clone(),
            index,
            id: id.clone(),
            class,
            inputs: inputs
                .into_iter()
                .map(|(block, node)| (block, Some(node)))
                .collect(),
        })?;
        Ok(id)
    }

    pub fn remove_phi(&mut self, block: &BlockId, id: &InstId) -> Result<()> {
        self.apply(Edit::RemovePhi {
            block: block.clone(),
            id: id.clone(),
        })?;
        Ok(())
    }

    /// Sets the input of `phi` flowing in from `incoming`. Returns the
    /// previous input.
    pub fn set_phi_input(
        &mut self,
        phi: &InstId,
        incoming: &BlockId,
        node: NodeId,
    ) -> Result<Option<NodeId>> {
        let inverse = self.apply(Edit::SetPhiInput {
            phi: phi.clone(),
            incoming: incoming.clone(),
            value: Some(node),
        })?;
        match inverse {
            Edit::SetPhiInput { value, .. } => Ok(value),
            _ => Ok(None),
        }
    }

    pub(crate) fn check_phi_input(&self, class: Ty, node: &NodeId) -> Result<()> {
        match self.ty_of(node) {
            Some(found) if !found.is_subtype_of(class) => Err(Error::TypeMismatch {
                node: node.clone(),
                expected: class,
                found,
            }),
            _ => Ok(()),
        }
    }

    /// Moves the statements from `index` on, and the jump, into a new block
    /// that `block` then jumps to.
    pub fn split_new_successor(&mut self, block: &BlockId, index: usize) -> Result<BlockId> {
        let new = self.fresh_block_id(block.name());
        let jump = self.fresh_inst_id(&Name::new("goto"));
        self.apply(Edit::SplitSuccessor {
            block: block.clone(),
            index,
            new: new.clone(),
            jump,
        })?;
        Ok(new)
    }

    /// Moves the phis and the statements before `index` into a new block
    /// that takes over every incoming edge of `block` and jumps to it.
    pub fn split_new_predecessor(&mut self, block: &BlockId, index: usize) -> Result<BlockId> {
        let new = self.fresh_block_id(block.name());
        let jump = self.fresh_inst_id(&Name::new("goto"));
        self.apply(Edit::SplitPredecessor {
            block: block.clone(),
            index,
            new: new.clone(),
            jump,
        })?;
        Ok(new)
    }

    /// Folds `succ` into `block`, which must end in `goto succ`.
    pub fn merge_with_successor(&mut self, block: &BlockId, succ: &BlockId) -> Result<()> {
        self.apply(Edit::MergeSuccessor {
            block: block.clone(),
            succ: succ.clone(),
        })?;
        Ok(())
    }

    /// Replaces every occurrence of `old` among the arguments of `id`.
    pub fn replace_in_args(
        &mut self,
        id: &InstId,
        old: &NodeId,
        new: NodeId,
    ) -> Result<CascadingUpdate> {
        let before = self.try_inst(id)?;
        let args: Vec<NodeId> = before
            .args()
            .into_iter()
            .map(|arg| if arg == old { new.clone() } else { arg.clone() })
            .collect();
        if args.iter().zip(before.args()).all(|(a, b)| a == b) {
            return Ok(CascadingUpdate::default());
        }
        let before = Snapshot::take(self, id);
        self.apply(Edit::RewriteArgs {
            id: id.clone(),
            args,
        })?;
        let mut update = CascadingUpdate::default();
        update.record(self, id, &before);
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::inst::BinaryOp;

    fn diamond() -> (Cfg, [BlockId; 4]) {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let left = cfg.add_bb("left").unwrap();
        let right = cfg.add_bb("right").unwrap();
        let join = cfg.add_bb("join").unwrap();
        let c = cfg.push_stmt(&entry, Stmt::param(0, Ty::Bool)).unwrap();
        cfg.add_jump(&entry, Jump::branch(c, left.clone(), right.clone()))
            .unwrap();
        cfg.add_jump(&left, Jump::Goto(join.clone())).unwrap();
        cfg.add_jump(&right, Jump::Goto(join.clone())).unwrap();
        (cfg, [entry, left, right, join])
    }

    #[test]
    fn test_add_bb_disambiguates() {
        let mut cfg = Cfg::new();
        let a = cfg.add_bb("loop").unwrap();
        let b = cfg.add_bb("loop").unwrap();
        assert_eq!(a.to_string(), "loop");
        assert_eq!(b.to_string(), "loop.1");
        cfg.remove_bb(&a).unwrap();
        assert_eq!(cfg.add_bb("loop").unwrap(), a);
    }

    #[test]
    fn test_remove_entry_is_rejected() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        assert_eq!(cfg.remove_bb(&entry), Err(Error::RemoveEntry(entry)));
    }

    #[test]
    fn test_jumps_maintain_edges() {
        let (mut cfg, [entry, left, right, join]) = diamond();
        assert_eq!(cfg.successors(&entry), vec![left.clone(), right.clone()]);
        assert_eq!(cfg.predecessors(&join), vec![left.clone(), right.clone()]);
        assert!(cfg.is_exit(&join));
        assert!(!cfg.is_exit(&left));

        cfg.replace_jump(&right, Jump::Unreachable).unwrap();
        assert_eq!(cfg.predecessors(&join), vec![left.clone()]);
        assert!(cfg.is_exit(&right));
        assert_eq!(
            cfg.add_jump(&left, Jump::Unreachable),
            Err(Error::DuplicateJump(left))
        );
    }

    #[test]
    fn test_phi_inputs_follow_predecessors() {
        let (mut cfg, [_, left, right, join]) = diamond();
        let phi = cfg.add_phi(&join, Ty::Int).unwrap();
        assert_eq!(cfg.phi(&phi).unwrap().len(), 2);

        assert_eq!(cfg.set_phi_input(&phi, &left, NodeId::int(1)), Ok(None));
        let err = cfg.set_phi_input(&phi, &right, NodeId::bool(true));
        assert!(matches!(err, Err(Error::TypeMismatch { .. })));
        let err = cfg.set_phi_input(&phi, &join, NodeId::int(1));
        assert!(matches!(err, Err(Error::NoSuchPredecessor { .. })));

        cfg.remove_jump(&left).unwrap();
        assert_eq!(cfg.phi(&phi).unwrap().len(), 1);
        cfg.add_jump(&left, Jump::Goto(join.clone())).unwrap();
        assert_eq!(cfg.phi(&phi).unwrap().input(&left), Some(None));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let err = cfg.insert_stmt(&entry, 1, Stmt::Nop).unwrap_err();
        assert_eq!(
            err,
            Error::IndexOutOfRange {
                block: entry,
                index: 1,
                len: 0
            }
        );
        assert_eq!(cfg.num_insts(), 0);
    }

    #[test]
    fn test_replace_stmt_checks_arity() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let add = cfg
            .push_stmt(&entry, Stmt::binary(BinaryOp::Add, NodeId::int(1), NodeId::int(2)))
            .unwrap();
        let err = cfg
            .replace_stmt(&entry, 0, Stmt::div_mod(NodeId::int(1), NodeId::int(2)))
            .unwrap_err();
        assert!(matches!(err, Error::ArityChanged { .. }));
        cfg.replace_stmt(&entry, 0, Stmt::cmp(crate::ir::inst::CmpOp::Eq, NodeId::int(1), NodeId::int(2)))
            .unwrap();
        assert_eq!(cfg.stmt(&add).unwrap().ty(), Ty::Bool);
    }

    #[test]
    fn test_split_and_merge_successor() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let ids = cfg
            .insert_stmts(
                &entry,
                0,
                vec![Stmt::param(0, Ty::Int), Stmt::param(1, Ty::Int), Stmt::Nop],
            )
            .unwrap();
        cfg.add_jump(&entry, Jump::ret(ids[0].clone())).unwrap();
        let before = cfg.to_string();

        let tail = cfg.split_new_successor(&entry, 1).unwrap();
        assert_eq!(cfg.block(&entry).unwrap().len(), 1);
        assert_eq!(cfg.block(&tail).unwrap().len(), 2);
        assert_eq!(cfg.successors(&entry), vec![tail.clone()]);
        assert!(cfg.is_exit(&tail));
        assert!(!cfg.is_exit(&entry));
        assert_eq!(cfg.locate(&ids[2]).unwrap().0, &tail);

        cfg.merge_with_successor(&entry, &tail).unwrap();
        assert_eq!(cfg.to_string(), before);
        assert!(!cfg.has_block(&tail));
    }

    #[test]
    fn test_split_predecessor_moves_entry() {
        let (mut cfg, [entry, ..]) = diamond();
        let head = cfg.split_new_predecessor(&entry, 1).unwrap();
        assert_eq!(cfg.entry(), &head);
        assert_eq!(cfg.successors(&head), vec![entry.clone()]);
        assert_eq!(cfg.block(&entry).unwrap().len(), 0);
        assert_eq!(cfg.block(&head).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_preconditions() {
        let (mut cfg, [entry, left, _, join]) = diamond();
        let err = cfg.merge_with_successor(&entry, &left).unwrap_err();
        assert!(matches!(err, Error::IllegalMerge { .. }));

        // `left` is empty, so it may merge into a successor with other preds.
        cfg.merge_with_successor(&left, &join).unwrap();
        assert!(!cfg.has_block(&join));
        assert!(cfg.is_exit(&left));
    }

    #[test]
    fn test_replace_in_args_reports_retyped_outputs() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let p = cfg.push_stmt(&entry, Stmt::param(0, Ty::Value)).unwrap();
        let add = cfg
            .push_stmt(&entry, Stmt::binary(BinaryOp::Add, p.clone(), NodeId::int(1)))
            .unwrap();
        assert_eq!(cfg.stmt(&add).unwrap().ty(), Ty::Value);

        let update = cfg
            .replace_in_args(&add, &NodeId::from(&p), NodeId::int(2))
            .unwrap();
        assert_eq!(cfg.stmt(&add).unwrap().ty(), Ty::Int);
        assert_eq!(update.retyped, vec![NodeId::from(add)]);
    }
}
