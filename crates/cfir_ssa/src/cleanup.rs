//! Graph cleanup: unreachable blocks, trivial phis and goto chains.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument};

use crate::{
    infra::subst::BatchSubst,
    ir::{inst::Jump, BlockId, InstId, NodeId},
    traverse::Order,
    Cfg, Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOptions {
    pub remove_unreachable: bool,
    pub fold_phis: bool,
    pub merge_blocks: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            remove_unreachable: true,
            fold_phis: true,
            merge_blocks: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed_blocks: usize,
    /// Phis dropped because they had no inputs, or none set in a block
    /// without a join.
    pub removed_phis: usize,
    /// Phis replaced by their only input.
    pub folded_phis: usize,
    pub merged_blocks: usize,
}

impl CleanupStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for CleanupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "removed {} block(s), removed {} phi(s), folded {} phi(s), merged {} block(s)",
            self.removed_blocks, self.removed_phis, self.folded_phis, self.merged_blocks
        )
    }
}

impl Cfg {
    pub fn cleanup(&mut self) -> Result<CleanupStats> {
        self.cleanup_with(&CleanupOptions::default())
    }

    /// Runs the enabled cleanups as one section. Running it again right
    /// away changes nothing.
    #[instrument(level = "debug", skip_all, fields(cfg = %self.id()))]
    pub fn cleanup_with(&mut self, opts: &CleanupOptions) -> Result<CleanupStats> {
        let stats = self.section("cleanup", |cfg| {
            let mut stats = CleanupStats::default();
            if opts.remove_unreachable {
                cfg.remove_unreachable(&mut stats)?;
            }
            if opts.fold_phis {
                cfg.fold_phis(&mut stats)?;
            }
            if opts.merge_blocks {
                cfg.merge_chains(&mut stats)?;
            }
            Ok(stats)
        })?;
        debug!(%stats, "cleaned up");
        Ok(stats)
    }

    fn remove_unreachable(&mut self, stats: &mut CleanupStats) -> Result<()> {
        let reachable: FxHashSet<BlockId> = self.bfs().collect();
        let dead: Vec<BlockId> = self
            .block_ids()
            .filter(|b| !reachable.contains(*b))
            .cloned()
            .collect();
        // Unlinking first drops the phi inputs the dead blocks fed.
        for block in &dead {
            if self.jump(block).is_some() {
                self.remove_jump(block)?;
            }
        }
        for block in &dead {
            self.remove_bb(block)?;
        }
        stats.removed_blocks += dead.len();
        Ok(())
    }

    fn fold_phis(&mut self, stats: &mut CleanupStats) -> Result<()> {
        loop {
            let mut empty: Vec<(BlockId, InstId)> = Vec::new();
            let mut trivial: Vec<(BlockId, InstId)> = Vec::new();
            let mut replacement: FxHashMap<NodeId, NodeId> = FxHashMap::default();
            for block in self.blocks() {
                let join = block.num_preds() >= 2;
                for id in block.phis() {
                    let Some(phi) = self.phi(id) else {
                        continue;
                    };
                    let this = NodeId::from(id);
                    let unset = phi.inputs().all(|(_, node)| node.is_none());
                    if phi.is_empty() {
                        empty.push((block.id().clone(), id.clone()));
                    } else if unset && !join {
                        if self.has_users(id) {
                            return Err(Error::PhiWithoutInput {
                                phi: id.clone(),
                                block: block.id().clone(),
                            });
                        }
                        empty.push((block.id().clone(), id.clone()));
                    } else if let Some(input) = phi.unique_input(&this) {
                        replacement.insert(this, input.clone());
                        trivial.push((block.id().clone(), id.clone()));
                    }
                }
            }
            if empty.is_empty() && trivial.is_empty() {
                return Ok(());
            }

            // Phis that only feed each other have no value to fold into.
            let mut subst = BatchSubst::new();
            trivial.retain(|(_, id)| {
                let this = NodeId::from(id);
                match resolve(&replacement, &this) {
                    Some(value) => subst.stage(this, value).is_ok(),
                    None => false,
                }
            });
            if empty.is_empty() && trivial.is_empty() {
                return Ok(());
            }

            subst.commit(self)?;
            for (block, id) in empty.iter().chain(&trivial) {
                self.remove_phi(block, id)?;
            }
            stats.removed_phis += empty.len();
            stats.folded_phis += trivial.len();
        }
    }

    fn has_users(&self, id: &InstId) -> bool {
        let this = NodeId::from(id);
        self.nodes
            .iter()
            .any(|(other, data)| other != id && data.args().contains(&&this))
    }

    fn merge_chains(&mut self, stats: &mut CleanupStats) -> Result<()> {
        let mut blocks = self.traversal(Order::Bfs);
        while let Some(block) = blocks.next(self) {
            while let Some(succ) = self.mergeable_successor(&block) {
                self.merge_with_successor(&block, &succ)?;
                stats.merged_blocks += 1;
            }
        }
        Ok(())
    }

    fn mergeable_successor(&self, block: &BlockId) -> Option<BlockId> {
        let Some(Jump::Goto(succ)) = self.jump(block).map(|j| j.payload()) else {
            return None;
        };
        let s = self.block(succ)?;
        let ok = succ != block
            && succ != self.entry()
            && s.num_preds() == 1
            && s.phis().is_empty()
            && !self.successors(succ).contains(succ);
        ok.then(|| succ.clone())
    }
}

/// Follows replacements until reaching a node that is not replaced.
/// `None` if the chain loops.
fn resolve(map: &FxHashMap<NodeId, NodeId>, node: &NodeId) -> Option<NodeId> {
    let mut seen = FxHashSet::default();
    let mut current = node;
    while let Some(next) = map.get(current) {
        if !seen.insert(current) {
            return None;
        }
        current = next;
    }
    Some(current.clone())
}
