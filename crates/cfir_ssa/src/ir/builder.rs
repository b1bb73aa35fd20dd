use cfir_names::Name;

use crate::{
    ir::{
        inst::{Jump, Stmt},
        ty::Ty,
        BlockId, InstId, NodeId,
    },
    Cfg, Result,
};

/// Appends instructions to a graph, one block at a time.
///
/// Every method goes through the ordinary [`Cfg`] mutators, so observers
/// see the same edits they would see from hand-written calls.
pub struct Builder<'a> {
    pub cfg: &'a mut Cfg,
    pub block: BlockId,
}

impl<'a> Builder<'a> {
    /// Starts building at the entry block.
    pub fn new(cfg: &'a mut Cfg) -> Self {
        let block = cfg.entry().clone();
        Self { cfg, block }
    }

    #[inline]
    pub fn current(&self) -> &BlockId {
        &self.block
    }

    pub fn switch_to(&mut self, block: &BlockId) {
        self.block = block.clone();
    }

    /// Adds an empty block without switching to it.
    pub fn block(&mut self, name: &str) -> Result<BlockId> {
        self.cfg.add_bb(name)
    }

    /// Appends a statement to the current block.
    pub fn push(&mut self, stmt: Stmt) -> Result<NodeId> {
        let id = self.cfg.push_stmt(&self.block, stmt)?;
        Ok(id.into())
    }

    pub fn push_named(&mut self, name: &str, stmt: Stmt) -> Result<NodeId> {
        let index = self.cfg.try_block(&self.block)?.stmts.len();
        let id = self
            .cfg
            .insert_named_stmt(&self.block, index, Name::new(name), stmt)?;
        Ok(id.into())
    }

    /// Adds a phi to the current block. The block's predecessors must already
    /// be linked for `inputs` to be accepted.
    pub fn phi(&mut self, class: Ty, inputs: Vec<(BlockId, NodeId)>) -> Result<InstId> {
        self.cfg.add_phi_with(&self.block, "phi", class, inputs)
    }

    /// Ends the current block.
    pub fn jump(&mut self, jump: Jump) -> Result<InstId> {
        self.cfg.add_jump(&self.block, jump)
    }

    pub fn goto(&mut self, target: &BlockId) -> Result<InstId> {
        self.jump(Jump::Goto(target.clone()))
    }

    pub fn ret(&mut self, value: impl Into<NodeId>) -> Result<InstId> {
        self.jump(Jump::ret(value))
    }
}
