//! Graph edits.
//!
//! An [`Edit`] is a self-contained description of one change, expressed in
//! identifiers only, so it can be logged and applied to any graph with the
//! same shape. Applying an edit returns its inverse. Every edit validates
//! its preconditions before it mutates anything.

use std::fmt;

use rustc_hash::FxHashSet;
use tracing::{error, trace};

use crate::{
    block::Block,
    cfg::{NodeData, NodeKind},
    ir::{
        inst::{CommaSep, Jump, Payload, Stmt},
        instr::{Instr, Invalidated, Phi},
        ty::Ty,
        BlockId, InstId, NodeId,
    },
    Cfg, Error, Result,
};

/// A snapshot of a block and everything it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockImage {
    pub id: BlockId,
    pub preds: Vec<BlockId>,
    pub phis: Vec<(InstId, Phi)>,
    pub stmts: Vec<(InstId, Instr<Stmt>)>,
    pub jump: Option<(InstId, Instr<Jump>)>,
}

impl BlockImage {
    fn insts(&self) -> impl Iterator<Item = &InstId> {
        self.phis
            .iter()
            .map(|(id, _)| id)
            .chain(self.stmts.iter().map(|(id, _)| id))
            .chain(self.jump.iter().map(|(id, _)| id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    InsertBlock {
        id: BlockId,
    },
    /// Removes a block without touching edges that refer to it.
    RemoveBlock {
        id: BlockId,
    },
    /// Puts blocks back exactly as imaged, replacing any live block with the
    /// same identifier, and removes the blocks in `remove`.
    RestoreBlocks {
        images: Vec<BlockImage>,
        remove: Vec<BlockId>,
    },
    InsertStmt {
        block: BlockId,
        index: usize,
        id: InstId,
        stmt: Stmt,
    },
    RemoveStmt {
        block: BlockId,
        index: usize,
    },
    InsertStmts {
        block: BlockId,
        index: usize,
        stmts: Vec<(InstId, Stmt)>,
    },
    RemoveStmts {
        block: BlockId,
        index: usize,
        count: usize,
    },
    ReplaceStmt {
        block: BlockId,
        index: usize,
        stmt: Stmt,
    },
    /// Predecessors not listed in `inputs` get an unset input.
    InsertPhi {
        block: BlockId,
        index: usize,
        id: InstId,
        class: Ty,
        inputs: Vec<(BlockId, Option<NodeId>)>,
    },
    RemovePhi {
        block: BlockId,
        id: InstId,
    },
    SetPhiInput {
        phi: InstId,
        incoming: BlockId,
        value: Option<NodeId>,
    },
    /// Installs, replaces or clears the jump of a block, keeping
    /// predecessor sets, phi inputs and exits in sync.
    SetJump {
        block: BlockId,
        jump: Option<(InstId, Jump)>,
    },
    /// Overwrites every argument of an instruction, positionally.
    RewriteArgs {
        id: InstId,
        args: Vec<NodeId>,
    },
    SplitSuccessor {
        block: BlockId,
        index: usize,
        new: BlockId,
        jump: InstId,
    },
    MergeSuccessor {
        block: BlockId,
        succ: BlockId,
    },
    SplitPredecessor {
        block: BlockId,
        index: usize,
        new: BlockId,
        jump: InstId,
    },
    MergePredecessor {
        pred: BlockId,
        block: BlockId,
    },
    /// Applied all or nothing.
    Section {
        label: String,
        edits: Vec<Edit>,
    },
}

impl Edit {
    /// Splits batched edits into the equivalent sequence of single edits.
    pub fn decompose(self) -> Vec<Edit> {
        match self {
            Edit::InsertStmts {
                block,
                index,
                stmts,
            } => stmts
                .into_iter()
                .enumerate()
                .map(|(offset, (id, stmt))| Edit::InsertStmt {
                    block: block.clone(),
                    index: index + offset,
                    id,
                    stmt,
                })
                .collect(),
            Edit::RemoveStmts {
                block,
                index,
                count,
            } => (0..count)
                .map(|_| Edit::RemoveStmt {
                    block: block.clone(),
                    index,
                })
                .collect(),
            edit => vec![edit],
        }
    }

    /// Number of primitive edits, looking through sections.
    pub fn len(&self) -> usize {
        match self {
            Edit::Section { edits, .. } => edits.iter().map(Edit::len).sum(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Applying edits
// ---------------------------------------------------------------------------

impl Cfg {
    /// Applies `edit` and returns its inverse.
    ///
    /// Observers see the edit after it has been applied. Sections are
    /// reported as a begin/end pair around their parts.
    pub fn apply(&mut self, edit: Edit) -> Result<Edit> {
        if let Edit::Section { label, edits } = edit {
            return self.apply_section(label, edits);
        }
        let inverse = self.apply_one(&edit)?;
        trace!(%edit, "applied");
        self.observers.notify(&edit, &inverse);
        Ok(inverse)
    }

    fn apply_section(&mut self, label: String, edits: Vec<Edit>) -> Result<Edit> {
        self.observers.section_begin(&label);
        let mut inverses = Vec::with_capacity(edits.len());
        for edit in edits {
            match self.apply(edit) {
                Ok(inverse) => inverses.push(inverse),
                Err(err) => {
                    for inverse in inverses.into_iter().rev() {
                        if let Err(rollback) = self.apply(inverse) {
                            error!(%rollback, section = %label, "rollback failed");
                        }
                    }
                    self.observers.section_end(&label);
                    return Err(err);
                }
            }
        }
        self.observers.section_end(&label);
        inverses.reverse();
        Ok(Edit::Section {
            label,
            edits: inverses,
        })
    }

    fn apply_one(&mut self, edit: &Edit) -> Result<Edit> {
        match edit {
            Edit::InsertBlock { id } => self.insert_block(id),
            Edit::RemoveBlock { id } => self.remove_block(id),
            Edit::RestoreBlocks { images, remove } => self.restore_blocks(images, remove),
            Edit::InsertStmt {
                block,
                index,
                id,
                stmt,
            } => {
                self.insert_stmts_at(block, *index, std::slice::from_ref(&(id.clone(), stmt.clone())))?;
                Ok(Edit::RemoveStmt {
                    block: block.clone(),
                    index: *index,
                })
            }
            Edit::InsertStmts {
                block,
                index,
                stmts,
            } => {
                self.insert_stmts_at(block, *index, stmts)?;
                Ok(Edit::RemoveStmts {
                    block: block.clone(),
                    index: *index,
                    count: stmts.len(),
                })
            }
            Edit::RemoveStmt { block, index } => {
                let mut removed = self.remove_stmts_at(block, *index, 1)?;
                match removed.pop() {
                    Some((id, stmt)) => Ok(Edit::InsertStmt {
                        block: block.clone(),
                        index: *index,
                        id,
                        stmt,
                    }),
                    None => Err(Error::IndexOutOfRange {
                        block: block.clone(),
                        index: *index,
                        len: 0,
                    }),
                }
            }
            Edit::RemoveStmts {
                block,
                index,
                count,
            } => {
                let stmts = self.remove_stmts_at(block, *index, *count)?;
                Ok(Edit::InsertStmts {
                    block: block.clone(),
                    index: *index,
                    stmts,
                })
            }
            Edit::ReplaceStmt { block, index, stmt } => self.replace_stmt_at(block, *index, stmt),
            Edit::InsertPhi {
                block,
                index,
                id,
                class,
                inputs,
            } => self.insert_phi(block, *index, id, *class, inputs),
            Edit::RemovePhi { block, id } => self.remove_phi_from(block, id),
            Edit::SetPhiInput {
                phi,
                incoming,
                value,
            } => self.set_input(phi, incoming, value.as_ref()),
            Edit::SetJump { block, jump } => self.set_jump(block, jump.as_ref()),
            Edit::RewriteArgs { id, args } => self.rewrite_args(id, args),
            Edit::SplitSuccessor {
                block,
                index,
                new,
                jump,
            } => self.split_successor(block, *index, new, jump),
            Edit::MergeSuccessor { block, succ } => self.merge_successor(block, succ),
            Edit::SplitPredecessor {
                block,
                index,
                new,
                jump,
            } => self.split_predecessor(block, *index, new, jump),
            Edit::MergePredecessor { pred, block } => self.merge_predecessor(pred, block),
            Edit::Section { label, edits } => self.apply_section(label.clone(), edits.clone()),
        }
    }

    // -----------------------------------------------------------------------
    // Raw mutators, no validation
    // -----------------------------------------------------------------------

    fn attach(&mut self, block: &BlockId, id: &InstId, kind: NodeKind) -> Result<()> {
        if !self.node_names.reserve(id.local()) {
            return Err(Error::DuplicateNode(id.clone()));
        }
        let data = NodeData {
            block: block.clone(),
            kind,
        };
        self.nodes.insert(id.clone(), data);
        Ok(())
    }

    fn detach(&mut self, id: &InstId) -> Option<NodeData> {
        let data = self.nodes.swap_remove(id)?;
        self.node_names.release(id.local());
        Some(data)
    }

    fn rehome(&mut self, ids: &[InstId], block: &BlockId) {
        for id in ids {
            if let Some(data) = self.nodes.get_mut(id) {
                data.block = block.clone();
            }
        }
    }

    fn is_live_inst(&self, id: &InstId) -> bool {
        self.node_names.contains(id.local())
    }

    /// Adds the edge `from -> to` to the predecessors of `to`, giving each
    /// of its phis an unset input.
    fn link(&mut self, from: &BlockId, to: &BlockId) {
        let Some(block) = self.blocks.get_mut(to) else {
            return;
        };
        if !block.preds.insert(from.clone()) {
            return;
        }
        for id in &block.phis {
            if let Some(NodeData {
                kind: NodeKind::Phi(phi),
                ..
            }) = self.nodes.get_mut(id)
            {
                phi.add_unset_input(from.clone());
            }
        }
    }

    /// Drops the edge `from -> to`. Returns the set phi inputs it carried.
    fn unlink(&mut self, from: &BlockId, to: &BlockId) -> Vec<(InstId, NodeId)> {
        let mut dropped = Vec::new();
        let Some(block) = self.blocks.get_mut(to) else {
            return dropped;
        };
        if !block.preds.shift_remove(from) {
            return dropped;
        }
        for id in &block.phis {
            if let Some(NodeData {
                kind: NodeKind::Phi(phi),
                ..
            }) = self.nodes.get_mut(id)
            {
                if let Some(Some(node)) = phi.remove_input(from) {
                    dropped.push((id.clone(), node));
                }
            }
        }
        dropped
    }

    /// Renames predecessor `old` of `block` into `new`, phi inputs included.
    fn replace_pred(&mut self, block: &BlockId, old: &BlockId, new: &BlockId) {
        let Some(b) = self.blocks.get_mut(block) else {
            return;
        };
        if !b.preds.contains(old) {
            return;
        }
        b.preds = b
            .preds
            .drain(..)
            .map(|p| if &p == old { new.clone() } else { p })
            .collect();
        let to = std::slice::from_ref(new);
        for id in &b.phis {
            if let Some(NodeData {
                kind: NodeKind::Phi(phi),
                ..
            }) = self.nodes.get_mut(id)
            {
                phi.rekey_input(old, to);
            }
        }
    }

    /// Points every target `from` of the jump of `block` at `to`.
    fn retarget(&mut self, block: &BlockId, from: &BlockId, to: &BlockId) {
        let Some(jump) = self.blocks.get(block).and_then(|b| b.jump.as_ref()) else {
            return;
        };
        if let Some(NodeData {
            kind: NodeKind::Jump(instr),
            ..
        }) = self.nodes.get_mut(jump)
        {
            instr.payload_mut().retarget(from, to);
        }
    }

    fn update_exit(&mut self, block: &BlockId) {
        if self.blocks.contains_key(block) && self.successors(block).is_empty() {
            self.exits.insert(block.clone());
        } else {
            self.exits.shift_remove(block);
        }
    }

    fn drop_block(&mut self, id: &BlockId) -> Option<Block> {
        let block = self.blocks.shift_remove(id)?;
        for inst in block.insts() {
            self.detach(inst);
        }
        self.block_names.release(id.local());
        self.exits.shift_remove(id);
        Some(block)
    }

    pub(crate) fn image(&self, id: &BlockId) -> Option<BlockImage> {
        let block = self.blocks.get(id)?;
        let phis = block
            .phis
            .iter()
            .filter_map(|p| Some((p.clone(), self.phi(p)?.clone())))
            .collect();
        let stmts = block
            .stmts
            .iter()
            .filter_map(|s| Some((s.clone(), self.stmt(s)?.clone())))
            .collect();
        let jump = block
            .jump
            .as_ref()
            .and_then(|j| Some((j.clone(), self.jump(id)?.clone())));
        Some(BlockImage {
            id: id.clone(),
            preds: block.preds.iter().cloned().collect(),
            phis,
            stmts,
            jump,
        })
    }

    /// Adds `block` to the table under a fresh creation stamp.
    fn place(&mut self, mut block: Block) {
        block.stamp = self.next_stamp;
        self.next_stamp += 1;
        self.blocks.insert(block.id().clone(), block);
    }

    fn install(&mut self, image: &BlockImage) -> Result<()> {
        let mut block = Block::new(image.id.clone());
        block.preds = image.preds.iter().cloned().collect();
        for (id, phi) in &image.phis {
            self.attach(&image.id, id, NodeKind::Phi(phi.clone()))?;
            block.phis.push(id.clone());
        }
        for (id, instr) in &image.stmts {
            self.attach(&image.id, id, NodeKind::Stmt(instr.clone()))?;
            block.stmts.push(id.clone());
        }
        if let Some((id, instr)) = &image.jump {
            self.attach(&image.id, id, NodeKind::Jump(instr.clone()))?;
            block.jump = Some(id.clone());
        }
        self.block_names.reserve(image.id.local());
        self.place(block);
        self.update_exit(&image.id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    fn insert_block(&mut self, id: &BlockId) -> Result<Edit> {
        if !self.block_names.reserve(id.local()) {
            return Err(Error::DuplicateBlock(id.clone()));
        }
        self.place(Block::new(id.clone()));
        self.exits.insert(id.clone());
        Ok(Edit::RemoveBlock { id: id.clone() })
    }

    fn remove_block(&mut self, id: &BlockId) -> Result<Edit> {
        if id == &self.entry {
            return Err(Error::RemoveEntry(id.clone()));
        }
        let image = self.image(id).ok_or_else(|| Error::NoSuchBlock(id.clone()))?;
        self.drop_block(id);
        Ok(Edit::RestoreBlocks {
            images: vec![image],
            remove: Vec::new(),
        })
    }

    fn restore_blocks(&mut self, images: &[BlockImage], remove: &[BlockId]) -> Result<Edit> {
        for id in remove {
            self.try_block(id)?;
            if id == &self.entry {
                return Err(Error::RemoveEntry(id.clone()));
            }
        }
        let replaced: Vec<&BlockId> = images
            .iter()
            .map(|image| &image.id)
            .filter(|id| self.blocks.contains_key(*id))
            .collect();

        let mut released = FxHashSet::default();
        for id in replaced.iter().copied().chain(remove) {
            released.extend(self.blocks[id].insts().cloned());
        }
        for image in images {
            if let Some(id) = image
                .insts()
                .find(|id| self.is_live_inst(id) && !released.contains(*id))
            {
                return Err(Error::DuplicateNode(id.clone()));
            }
        }

        let inverse = Edit::RestoreBlocks {
            images: replaced
                .iter()
                .copied()
                .chain(remove)
                .filter_map(|id| self.image(id))
                .collect(),
            remove: images
                .iter()
                .map(|image| image.id.clone())
                .filter(|id| !self.blocks.contains_key(id))
                .collect(),
        };

        for id in replaced.into_iter().chain(remove) {
            self.drop_block(id);
        }
        for image in images {
            self.install(image)?;
        }
        Ok(inverse)
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn insert_stmts_at(
        &mut self,
        block: &BlockId,
        index: usize,
        stmts: &[(InstId, Stmt)],
    ) -> Result<()> {
        let len = self.try_block(block)?.len();
        if index > len {
            return Err(Error::IndexOutOfRange {
                block: block.clone(),
                index,
                len,
            });
        }
        for (i, (id, _)) in stmts.iter().enumerate() {
            if self.is_live_inst(id) || stmts[..i].iter().any(|(other, _)| other == id) {
                return Err(Error::DuplicateNode(id.clone()));
            }
        }
        for (id, stmt) in stmts {
            let kind = self.stmt_kind(stmt.clone());
            self.attach(block, id, kind)?;
        }
        let b = self.try_block_mut(block)?;
        b.stmts
            .splice(index..index, stmts.iter().map(|(id, _)| id.clone()));
        Ok(())
    }

    fn remove_stmts_at(
        &mut self,
        block: &BlockId,
        index: usize,
        count: usize,
    ) -> Result<Vec<(InstId, Stmt)>> {
        let b = self.try_block_mut(block)?;
        let len = b.len();
        let end = index
            .checked_add(count)
            .filter(|end| *end <= len)
            .ok_or_else(|| Error::IndexOutOfRange {
                block: block.clone(),
                index,
                len,
            })?;
        let ids: Vec<InstId> = b.stmts.drain(index..end).collect();
        Ok(ids
            .into_iter()
            .filter_map(|id| match self.detach(&id)?.kind {
                NodeKind::Stmt(instr) => Some((id, instr.into_payload())),
                _ => None,
            })
            .collect())
    }

    fn replace_stmt_at(&mut self, block: &BlockId, index: usize, stmt: &Stmt) -> Result<Edit> {
        let b = self.try_block(block)?;
        let id = b.stmts.get(index).cloned().ok_or(Error::IndexOutOfRange {
            block: block.clone(),
            index,
            len: b.len(),
        })?;
        let tys = stmt.output_tys(&|n| self.ty_or_value(n));
        let Some(NodeData {
            kind: NodeKind::Stmt(instr),
            ..
        }) = self.nodes.get_mut(&id)
        else {
            return Err(Error::NotAStmt(id));
        };
        let old = instr.replace_payload(&id, stmt.clone(), tys)?;
        Ok(Edit::ReplaceStmt {
            block: block.clone(),
            index,
            stmt: old,
        })
    }

    // -----------------------------------------------------------------------
    // Phis
    // -----------------------------------------------------------------------

    fn insert_phi(
        &mut self,
        block: &BlockId,
        index: usize,
        id: &InstId,
        class: Ty,
        inputs: &[(BlockId, Option<NodeId>)],
    ) -> Result<Edit> {
        let b = self.try_block(block)?;
        if index > b.phis.len() {
            return Err(Error::IndexOutOfRange {
                block: block.clone(),
                index,
                len: b.phis.len(),
            });
        }
        if !class.has_phi() {
            return Err(Error::TypeMismatch {
                node: NodeId::Local(id.clone()),
                expected: Ty::Value,
                found: class,
            });
        }
        if let Some((pred, _)) = inputs.iter().find(|(pred, _)| !b.has_pred(pred)) {
            return Err(Error::NoSuchPredecessor {
                phi: id.clone(),
                block: pred.clone(),
            });
        }
        let phi = Phi::with_inputs(
            class,
            b.preds().map(|pred| {
                let node = inputs
                    .iter()
                    .find(|(p, _)| p == pred)
                    .and_then(|(_, node)| node.clone());
                (pred.clone(), node)
            }),
        );
        self.attach(block, id, NodeKind::Phi(phi))?;
        self.try_block_mut(block)?.phis.insert(index, id.clone());
        Ok(Edit::RemovePhi {
            block: block.clone(),
            id: id.clone(),
        })
    }

    fn remove_phi_from(&mut self, block: &BlockId, id: &InstId) -> Result<Edit> {
        let b = self.try_block(block)?;
        let index = match b.phis.iter().position(|p| p == id) {
            Some(index) => index,
            None if self.nodes.contains_key(id) => return Err(Error::NotAPhi(id.clone())),
            None => return Err(Error::NoSuchNode(id.clone())),
        };
        self.try_block_mut(block)?.phis.remove(index);
        let phi = match self.detach(id).map(|data| data.kind) {
            Some(NodeKind::Phi(phi)) => phi,
            _ => return Err(Error::NotAPhi(id.clone())),
        };
        Ok(Edit::InsertPhi {
            block: block.clone(),
            index,
            id: id.clone(),
            class: phi.class(),
            inputs: phi
                .inputs()
                .map(|(block, node)| (block.clone(), node.cloned()))
                .collect(),
        })
    }

    fn set_input(
        &mut self,
        phi: &InstId,
        incoming: &BlockId,
        value: Option<&NodeId>,
    ) -> Result<Edit> {
        let class = match &self.try_inst(phi)?.kind {
            NodeKind::Phi(p) if !p.has_incoming(incoming) => {
                return Err(Error::NoSuchPredecessor {
                    phi: phi.clone(),
                    block: incoming.clone(),
                })
            }
            NodeKind::Phi(p) => p.class(),
            _ => return Err(Error::NotAPhi(phi.clone())),
        };
        if let Some(value) = value {
            self.check_phi_input(class, value)?;
        }
        let Some(NodeData {
            kind: NodeKind::Phi(p),
            ..
        }) = self.nodes.get_mut(phi)
        else {
            return Err(Error::NotAPhi(phi.clone()));
        };
        let old = p.set_input(phi, incoming, value.cloned())?;
        Ok(Edit::SetPhiInput {
            phi: phi.clone(),
            incoming: incoming.clone(),
            value: old,
        })
    }

    // -----------------------------------------------------------------------
    // Jumps and arguments
    // -----------------------------------------------------------------------

    fn set_jump(&mut self, block: &BlockId, jump: Option<&(InstId, Jump)>) -> Result<Edit> {
        let current = self.try_block(block)?.jump.clone();
        if let Some((id, payload)) = jump {
            if current.as_ref() != Some(id) && self.is_live_inst(id) {
                return Err(Error::DuplicateNode(id.clone()));
            }
            for target in payload.targets() {
                self.try_block(target)?;
            }
        }

        let old_targets = self.successors(block);
        let old = current.and_then(|id| match self.detach(&id)?.kind {
            NodeKind::Jump(instr) => Some((id, instr.into_payload())),
            _ => None,
        });
        self.try_block_mut(block)?.jump = None;

        let mut new_targets: Vec<BlockId> = Vec::new();
        if let Some((id, payload)) = jump {
            for target in payload.targets() {
                if !new_targets.contains(target) {
                    new_targets.push(target.clone());
                }
            }
            let kind = self.jump_kind(payload.clone());
            self.attach(block, id, kind)?;
            self.try_block_mut(block)?.jump = Some(id.clone());
        }

        let mut dropped = Vec::new();
        for target in old_targets.iter().filter(|t| !new_targets.contains(t)) {
            dropped.extend(self.unlink(block, target));
        }
        for target in new_targets.iter().filter(|t| !old_targets.contains(t)) {
            self.link(block, target);
        }
        self.update_exit(block);

        let restore = Edit::SetJump {
            block: block.clone(),
            jump: old,
        };
        if dropped.is_empty() {
            return Ok(restore);
        }
        let mut edits = vec![restore];
        edits.extend(dropped.into_iter().map(|(phi, node)| Edit::SetPhiInput {
            phi,
            incoming: block.clone(),
            value: Some(node),
        }));
        Ok(Edit::Section {
            label: "restore jump".into(),
            edits,
        })
    }

    fn rewrite_args(&mut self, id: &InstId, args: &[NodeId]) -> Result<Edit> {
        let data = self.try_inst(id)?;
        let current: Vec<NodeId> = data.args().into_iter().cloned().collect();
        if args.len() != current.len() {
            return Err(Error::ArgCount {
                id: id.clone(),
                expected: current.len(),
                found: args.len(),
            });
        }
        let slots = data.arg_slots();
        for ((new, old), slot) in args.iter().zip(&current).zip(slots) {
            if new == old {
                continue;
            }
            match self.ty_of(new) {
                Some(found) if !found.is_subtype_of(slot) => {
                    return Err(Error::TypeMismatch {
                        node: new.clone(),
                        expected: slot,
                        found,
                    })
                }
                _ => {}
            }
        }

        match self.nodes.get_mut(id).map(|data| &mut data.kind) {
            Some(NodeKind::Phi(phi)) => {
                phi.set_args(args);
            }
            Some(NodeKind::Stmt(instr)) => {
                instr.set_args(args);
                self.refresh_stmt(id);
            }
            Some(NodeKind::Jump(instr)) => {
                instr.set_args(args);
            }
            None => return Err(Error::NoSuchNode(id.clone())),
        }
        Ok(Edit::RewriteArgs {
            id: id.clone(),
            args: current,
        })
    }

    /// Recomputes the cached types and effects of a statement.
    pub(crate) fn refresh_stmt(&mut self, id: &InstId) -> Option<Invalidated> {
        let tys = self
            .stmt(id)?
            .payload()
            .output_tys(&|n| self.ty_or_value(n));
        match self.nodes.get_mut(id).map(|data| &mut data.kind) {
            Some(NodeKind::Stmt(instr)) => Some(instr.refresh(tys)),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Splits and merges
    // -----------------------------------------------------------------------

    fn check_split(&self, block: &BlockId, index: usize, new: &BlockId, jump: &InstId) -> Result<()> {
        let len = self.try_block(block)?.len();
        if index > len {
            return Err(Error::IndexOutOfRange {
                block: block.clone(),
                index,
                len,
            });
        }
        if self.block_names.contains(new.local()) {
            return Err(Error::DuplicateBlock(new.clone()));
        }
        if self.is_live_inst(jump) {
            return Err(Error::DuplicateNode(jump.clone()));
        }
        Ok(())
    }

    fn split_successor(
        &mut self,
        block: &BlockId,
        index: usize,
        new: &BlockId,
        jump: &InstId,
    ) -> Result<Edit> {
        self.check_split(block, index, new, jump)?;
        let succs = self.successors(block);

        let b = self.try_block_mut(block)?;
        let mut tail = Block::new(new.clone());
        tail.stmts = b.stmts.split_off(index);
        tail.jump = b.jump.take();
        tail.preds.insert(block.clone());
        let moved: Vec<InstId> = tail.insts().cloned().collect();
        self.rehome(&moved, new);
        self.block_names.reserve(new.local());
        self.place(tail);

        for succ in &succs {
            self.replace_pred(succ, block, new);
        }
        let kind = self.jump_kind(Jump::Goto(new.clone()));
        self.attach(block, jump, kind)?;
        self.try_block_mut(block)?.jump = Some(jump.clone());
        self.update_exit(block);
        self.update_exit(new);

        Ok(Edit::MergeSuccessor {
            block: block.clone(),
            succ: new.clone(),
        })
    }

    fn check_merge(&self, block: &BlockId, succ: &BlockId) -> Result<()> {
        let illegal = |reason| Error::IllegalMerge {
            block: block.clone(),
            succ: succ.clone(),
            reason,
        };
        let b = self.try_block(block)?;
        let s = self.try_block(succ)?;
        if block == succ {
            return Err(illegal("a block cannot merge with itself"));
        }
        if succ == &self.entry {
            return Err(illegal("the successor is the entry block"));
        }
        match self.jump(block).map(|j| j.payload()) {
            Some(Jump::Goto(target)) if target == succ => {}
            _ => return Err(illegal("the block does not end in a goto to the successor")),
        }
        if s.num_preds() != 1 && !b.is_empty() {
            return Err(illegal("the successor has other predecessors"));
        }
        if !b.is_empty() && !s.phis.is_empty() {
            return Err(illegal("the successor has phis"));
        }
        if s.num_preds() > 1 && !b.phis.is_empty() {
            return Err(illegal("the block has phis"));
        }
        if !b.phis.is_empty() && !s.phis.is_empty() {
            return Err(illegal("both blocks have phis"));
        }
        if self.successors(succ).contains(succ) {
            return Err(illegal("the successor loops on itself"));
        }
        for pred in s.preds().filter(|p| *p != block) {
            if self.successors(pred).contains(block) {
                return Err(illegal("a predecessor of the successor also jumps to the block"));
            }
        }
        Ok(())
    }

    fn merge_successor(&mut self, block: &BlockId, succ: &BlockId) -> Result<Edit> {
        self.check_merge(block, succ)?;

        let b = self.try_block(block)?;
        let s = self.try_block(succ)?;
        let simple = s.num_preds() == 1 && s.phis.is_empty();
        let inverse = match (simple, &b.jump) {
            (true, Some(goto)) => Edit::SplitSuccessor {
                block: block.clone(),
                index: b.len(),
                new: succ.clone(),
                jump: goto.clone(),
            },
            _ => {
                let mut ids = vec![block.clone(), succ.clone()];
                for id in s.preds().cloned().chain(self.successors(succ)) {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                Edit::RestoreBlocks {
                    images: ids.iter().filter_map(|id| self.image(id)).collect(),
                    remove: Vec::new(),
                }
            }
        };

        let block_preds: Vec<BlockId> = b.preds().cloned().collect();
        let Some(s) = self.blocks.shift_remove(succ) else {
            return Err(Error::NoSuchBlock(succ.clone()));
        };
        self.block_names.release(succ.local());
        self.exits.shift_remove(succ);

        if let Some(goto) = self.try_block_mut(block)?.jump.take() {
            self.detach(&goto);
        }
        for id in &s.phis {
            if let Some(NodeData {
                kind: NodeKind::Phi(phi),
                ..
            }) = self.nodes.get_mut(id)
            {
                phi.rekey_input(block, &block_preds);
            }
        }
        let moved: Vec<InstId> = s.insts().cloned().collect();
        self.rehome(&moved, block);

        let others: Vec<BlockId> = s.preds().filter(|p| *p != block).cloned().collect();
        let b = self.try_block_mut(block)?;
        b.phis.extend(s.phis);
        b.stmts.extend(s.stmts);
        b.jump = s.jump;
        b.preds.extend(others.iter().cloned());
        for pred in &others {
            self.retarget(pred, succ, block);
        }
        for target in self.successors(block) {
            self.replace_pred(&target, succ, block);
        }
        self.update_exit(block);
        Ok(inverse)
    }

    fn split_predecessor(
        &mut self,
        block: &BlockId,
        index: usize,
        new: &BlockId,
        jump: &InstId,
    ) -> Result<Edit> {
        self.check_split(block, index, new, jump)?;

        let b = self.try_block_mut(block)?;
        let mut head = Block::new(new.clone());
        head.preds = std::mem::take(&mut b.preds);
        head.phis = std::mem::take(&mut b.phis);
        head.stmts = b.stmts.drain(..index).collect();
        b.preds.insert(new.clone());
        let preds: Vec<BlockId> = head.preds.iter().cloned().collect();
        let moved: Vec<InstId> = head.insts().cloned().collect();
        self.rehome(&moved, new);
        self.block_names.reserve(new.local());
        self.place(head);

        let kind = self.jump_kind(Jump::Goto(block.clone()));
        self.attach(new, jump, kind)?;
        self.try_block_mut(new)?.jump = Some(jump.clone());
        for pred in &preds {
            self.retarget(pred, block, new);
        }
        if &self.entry == block {
            self.entry = new.clone();
        }
        self.update_exit(new);

        Ok(Edit::MergePredecessor {
            pred: new.clone(),
            block: block.clone(),
        })
    }

    fn merge_predecessor(&mut self, pred: &BlockId, block: &BlockId) -> Result<Edit> {
        let illegal = |reason| Error::IllegalMerge {
            block: pred.clone(),
            succ: block.clone(),
            reason,
        };
        let p = self.try_block(pred)?;
        let b = self.try_block(block)?;
        if pred == block {
            return Err(illegal("a block cannot merge with itself"));
        }
        match self.jump(pred).map(|j| j.payload()) {
            Some(Jump::Goto(target)) if target == block => {}
            _ => return Err(illegal("the predecessor does not end in a goto to the block")),
        }
        if b.num_preds() != 1 || !b.has_pred(pred) {
            return Err(illegal("the block has other predecessors"));
        }
        if !b.phis.is_empty() {
            return Err(illegal("the block has phis"));
        }
        let Some(goto) = p.jump.clone() else {
            return Err(Error::NoJump(pred.clone()));
        };

        let Some(p) = self.blocks.shift_remove(pred) else {
            return Err(Error::NoSuchBlock(pred.clone()));
        };
        self.block_names.release(pred.local());
        self.exits.shift_remove(pred);
        self.detach(&goto);

        let count = p.stmts.len();
        let moved: Vec<InstId> = p.phis.iter().chain(p.stmts.iter()).cloned().collect();
        self.rehome(&moved, block);
        let preds: Vec<BlockId> = p.preds.iter().cloned().collect();
        let b = self.try_block_mut(block)?;
        b.phis = p.phis;
        b.stmts.splice(0..0, p.stmts);
        b.preds = p.preds;
        for q in &preds {
            self.retarget(q, pred, block);
        }
        if &self.entry == pred {
            self.entry = block.clone();
        }
        Ok(Edit::SplitPredecessor {
            block: block.clone(),
            index: count,
            new: pred.clone(),
            jump: goto,
        })
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

struct Ids<'a>(&'a [BlockId]);

impl fmt::Display for Ids<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", CommaSep(self.0))
    }
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edit::InsertBlock { id } => write!(f, "insert block {}", id),
            Edit::RemoveBlock { id } => write!(f, "remove block {}", id),
            Edit::RestoreBlocks { images, remove } => {
                let ids: Vec<BlockId> = images.iter().map(|i| i.id.clone()).collect();
                write!(f, "restore blocks {}", Ids(&ids))?;
                if !remove.is_empty() {
                    write!(f, " removing {}", Ids(remove))?;
                }
                Ok(())
            }
            Edit::InsertStmt {
                block,
                index,
                id,
                stmt,
            } => write!(f, "insert {} = {} at {}[{}]", id, stmt, block, index),
            Edit::RemoveStmt { block, index } => write!(f, "remove {}[{}]", block, index),
            Edit::InsertStmts {
                block,
                index,
                stmts,
            } => write!(f, "insert {} statement(s) at {}[{}]", stmts.len(), block, index),
            Edit::RemoveStmts {
                block,
                index,
                count,
            } => write!(f, "remove {}[{}..{}]", block, index, index + count),
            Edit::ReplaceStmt { block, index, stmt } => {
                write!(f, "replace {}[{}] with {}", block, index, stmt)
            }
            Edit::InsertPhi {
                block, id, class, ..
            } => write!(f, "insert {} = phi {} in {}", id, class, block),
            Edit::RemovePhi { block, id } => write!(f, "remove {} from {}", id, block),
            Edit::SetPhiInput {
                phi,
                incoming,
                value,
            } => match value {
                Some(value) => write!(f, "set {}[{}] = {}", phi, incoming, value),
                None => write!(f, "unset {}[{}]", phi, incoming),
            },
            Edit::SetJump { block, jump } => match jump {
                Some((id, jump)) => write!(f, "set jump of {} to {} = {}", block, id, jump),
                None => write!(f, "clear jump of {}", block),
            },
            Edit::RewriteArgs { id, args } => write!(f, "rewrite {}({})", id, CommaSep(args)),
            Edit::SplitSuccessor {
                block, index, new, ..
            } => write!(f, "split {} at {} into successor {}", block, index, new),
            Edit::MergeSuccessor { block, succ } => write!(f, "merge {} into {}", succ, block),
            Edit::SplitPredecessor {
                block, index, new, ..
            } => write!(f, "split {} at {} into predecessor {}", block, index, new),
            Edit::MergePredecessor { pred, block } => write!(f, "merge {} into {}", pred, block),
            Edit::Section { label, edits } => {
                write!(f, "section {} ({} edit(s))", label, edits.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::inst::BinaryOp;

    /// Applies `edit`, undoes it, redoes it and undoes it again, checking
    /// the dump at every step. Leaves `cfg` as it was.
    fn roundtrip(cfg: &mut Cfg, edit: Edit) {
        let before = cfg.to_string();
        let inverse = cfg.apply(edit.clone()).unwrap();
        let after = cfg.to_string();
        let redo = cfg.apply(inverse).unwrap();
        assert_eq!(cfg.to_string(), before, "undoing `{edit}`");
        let undo = cfg.apply(redo).unwrap();
        assert_eq!(cfg.to_string(), after, "redoing `{edit}`");
        cfg.apply(undo).unwrap();
        assert_eq!(cfg.to_string(), before);
    }

    fn looped() -> (Cfg, BlockId, BlockId, InstId) {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let body = cfg.add_bb("body").unwrap();
        let exit = cfg.add_bb("exit").unwrap();
        let n = cfg.push_stmt(&entry, Stmt::param(0, Ty::Int)).unwrap();
        cfg.add_jump(&entry, Jump::Goto(body.clone())).unwrap();
        let i = cfg.add_phi(&body, Ty::Int).unwrap();
        let next = cfg
            .push_stmt(&body, Stmt::binary(BinaryOp::Add, i.clone(), NodeId::int(1)))
            .unwrap();
        let c = cfg
            .push_stmt(
                &body,
                Stmt::cmp(crate::ir::inst::CmpOp::Lt, next.clone(), n),
            )
            .unwrap();
        cfg.add_jump(&body, Jump::branch(c, body.clone(), exit.clone()))
            .unwrap();
        cfg.set_phi_input(&i, &entry, NodeId::int(0)).unwrap();
        cfg.set_phi_input(&i, &body, next.clone().into()).unwrap();
        cfg.add_jump(&exit, Jump::ret(next)).unwrap();
        (cfg, body, exit, i)
    }

    #[test]
    fn test_every_edit_inverts() {
        let (mut cfg, body, exit, i) = looped();
        let entry = cfg.entry().clone();
        roundtrip(&mut cfg, Edit::InsertBlock { id: BlockId::from("spare") });
        roundtrip(&mut cfg, Edit::RemoveBlock { id: exit.clone() });
        roundtrip(
            &mut cfg,
            Edit::InsertStmt {
                block: body.clone(),
                index: 0,
                id: InstId::from("x"),
                stmt: Stmt::Nop,
            },
        );
        roundtrip(
            &mut cfg,
            Edit::RemoveStmts {
                block: body.clone(),
                index: 0,
                count: 2,
            },
        );
        roundtrip(&mut cfg, Edit::RemovePhi { block: body.clone(), id: i.clone() });
        roundtrip(
            &mut cfg,
            Edit::SetPhiInput {
                phi: i.clone(),
                incoming: entry.clone(),
                value: Some(NodeId::int(5)),
            },
        );
        roundtrip(
            &mut cfg,
            Edit::SetJump {
                block: body.clone(),
                jump: Some((InstId::from("u"), Jump::Unreachable)),
            },
        );
        roundtrip(
            &mut cfg,
            Edit::RewriteArgs {
                id: i.clone(),
                args: vec![NodeId::int(1), NodeId::int(2)],
            },
        );
        roundtrip(
            &mut cfg,
            Edit::SplitSuccessor {
                block: body.clone(),
                index: 1,
                new: BlockId::from("tail"),
                jump: InstId::from("g"),
            },
        );
        roundtrip(
            &mut cfg,
            Edit::SplitPredecessor {
                block: body.clone(),
                index: 1,
                new: BlockId::from("head"),
                jump: InstId::from("g"),
            },
        );
        roundtrip(
            &mut cfg,
            Edit::SplitPredecessor {
                block: entry,
                index: 0,
                new: BlockId::from("pre"),
                jump: InstId::from("g"),
            },
        );
    }

    #[test]
    fn test_set_jump_inverse_restores_phi_inputs() {
        let (mut cfg, body, _, i) = looped();
        let before = cfg.to_string();
        let inverse = cfg
            .apply(Edit::SetJump {
                block: body.clone(),
                jump: None,
            })
            .unwrap();
        assert!(matches!(inverse, Edit::Section { .. }));
        assert_eq!(cfg.phi(&i).unwrap().len(), 1);
        cfg.apply(inverse).unwrap();
        assert_eq!(cfg.to_string(), before);
    }

    #[test]
    fn test_complex_merge_inverts_through_restore() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let a = cfg.add_bb("a").unwrap();
        let b = cfg.add_bb("b").unwrap();
        let join = cfg.add_bb("join").unwrap();
        let c = cfg.push_stmt(&entry, Stmt::param(0, Ty::Bool)).unwrap();
        cfg.add_jump(&entry, Jump::branch(c, a.clone(), b.clone())).unwrap();
        cfg.add_jump(&a, Jump::Goto(join.clone())).unwrap();
        cfg.add_jump(&b, Jump::Goto(join.clone())).unwrap();
        let phi = cfg.add_phi(&join, Ty::Int).unwrap();
        cfg.set_phi_input(&phi, &a, NodeId::int(1)).unwrap();
        cfg.set_phi_input(&phi, &b, NodeId::int(2)).unwrap();
        cfg.add_jump(&join, Jump::ret(phi.clone())).unwrap();
        let before = cfg.to_string();

        let inverse = cfg
            .apply(Edit::MergeSuccessor {
                block: a.clone(),
                succ: join.clone(),
            })
            .unwrap();
        assert!(matches!(inverse, Edit::RestoreBlocks { .. }));
        assert_eq!(cfg.phi(&phi).unwrap().input(&entry), Some(Some(&NodeId::int(1))));
        assert_eq!(cfg.successors(&b), vec![a.clone()]);
        assert!(cfg.verify().is_ok(), "{}", cfg);

        cfg.apply(inverse).unwrap();
        assert_eq!(cfg.to_string(), before);
    }

    #[test]
    fn test_failed_section_rolls_back() {
        let (mut cfg, body, _, _) = looped();
        let before = cfg.to_string();
        let err = cfg
            .apply(Edit::Section {
                label: "broken".into(),
                edits: vec![
                    Edit::RemoveStmt {
                        block: body.clone(),
                        index: 0,
                    },
                    Edit::RemoveBlock {
                        id: BlockId::from("missing"),
                    },
                ],
            })
            .unwrap_err();
        assert_eq!(err, Error::NoSuchBlock(BlockId::from("missing")));
        assert_eq!(cfg.to_string(), before);
    }

    #[test]
    fn test_decompose() {
        let edit = Edit::InsertStmts {
            block: BlockId::from("b"),
            index: 2,
            stmts: vec![(InstId::from("x"), Stmt::Nop), (InstId::from("y"), Stmt::Nop)],
        };
        let parts = edit.decompose();
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[1], Edit::InsertStmt { index: 3, .. }));

        let edit = Edit::RemoveStmts {
            block: BlockId::from("b"),
            index: 1,
            count: 3,
        };
        assert!(edit
            .decompose()
            .iter()
            .all(|e| matches!(e, Edit::RemoveStmt { index: 1, .. })));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let err = cfg
            .apply(Edit::InsertBlock { id: entry.clone() })
            .unwrap_err();
        assert_eq!(err, Error::DuplicateBlock(entry.clone()));

        let x = cfg.insert_named_stmt(&entry, 0, "x", Stmt::Nop).unwrap();
        let err = cfg
            .apply(Edit::InsertStmt {
                block: entry,
                index: 0,
                id: x.clone(),
                stmt: Stmt::Nop,
            })
            .unwrap_err();
        assert_eq!(err, Error::DuplicateNode(x));
    }

    #[test]
    fn test_restore_lists_block_ids() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let a = cfg.add_bb("a").unwrap();
        let b = cfg.add_bb("b").unwrap();
        let edit = Edit::RestoreBlocks {
            images: vec![cfg.image(&entry).unwrap(), cfg.image(&a).unwrap()],
            remove: vec![b],
        };
        assert_eq!(edit.to_string(), "restore blocks [entry, a] removing [b]");
    }
}
