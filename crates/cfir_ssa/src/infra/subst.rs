use rustc_hash::FxHashMap;
use tracing::{debug, instrument};

use crate::{
    edit::Edit,
    effects::Effects,
    ir::{inst::Payload, ty::Ty, BlockId, InstId, NodeId},
    Cfg, Error, Result,
};

// ---------------------------------------------------------------------------
// CascadingUpdate
// ---------------------------------------------------------------------------

/// Cached data that changed because arguments were rewritten. Users of the
/// listed nodes may need to be revisited.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadingUpdate {
    /// Outputs whose type changed.
    pub retyped: Vec<NodeId>,
    /// Instructions whose effects changed.
    pub effects_changed: Vec<InstId>,
}

impl CascadingUpdate {
    pub fn is_empty(&self) -> bool {
        self.retyped.is_empty() && self.effects_changed.is_empty()
    }

    pub fn merge(&mut self, other: CascadingUpdate) {
        self.retyped.extend(other.retyped);
        self.effects_changed.extend(other.effects_changed);
    }

    /// Compares `id` against a snapshot taken before it was rewritten.
    pub(crate) fn record(&mut self, cfg: &Cfg, id: &InstId, before: &Snapshot) {
        let after = Snapshot::take(cfg, id);
        for (node, (old, new)) in cfg
            .returns(id)
            .into_iter()
            .zip(before.tys.iter().zip(&after.tys))
        {
            if old != new {
                self.retyped.push(node);
            }
        }
        if before.effects != after.effects {
            self.effects_changed.push(id.clone());
        }
    }
}

/// Output types and effects of an instruction at some point in time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Snapshot {
    tys: Vec<Option<Ty>>,
    effects: Option<Effects>,
}

impl Snapshot {
    pub(crate) fn take(cfg: &Cfg, id: &InstId) -> Self {
        Self {
            tys: cfg.returns(id).iter().map(|n| cfg.ty_of(n)).collect(),
            effects: cfg.stmt(id).map(|instr| instr.effects().clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchSubst
// ---------------------------------------------------------------------------

/// Replacements staged up front and applied in one pass per instruction.
///
/// Lookups are not chained: staging `a -> b` and `b -> c` rewrites `a` to
/// `b`, not to `c`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchSubst {
    map: FxHashMap<NodeId, NodeId>,
}

impl BatchSubst {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules every use of `old` to become `new`. Staging the same `old`
    /// twice is only allowed with the same `new`.
    pub fn stage(&mut self, old: impl Into<NodeId>, new: impl Into<NodeId>) -> Result<()> {
        let (old, new) = (old.into(), new.into());
        if old == new {
            return Ok(());
        }
        match self.map.get(&old) {
            Some(staged) if staged != &new => Err(Error::SubstConflict {
                old,
                staged: staged.clone(),
                new,
            }),
            Some(_) => Ok(()),
            None => {
                self.map.insert(old, new);
                Ok(())
            }
        }
    }

    pub fn get(&self, old: &NodeId) -> Option<&NodeId> {
        self.map.get(old)
    }

    /// `node` after substitution.
    pub fn resolve(&self, node: &NodeId) -> NodeId {
        self.map.get(node).unwrap_or(node).clone()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Rewrites the arguments of a payload that is not part of any graph.
    /// Returns whether anything changed.
    pub fn rewrite<P: Payload>(&self, payload: &mut P) -> bool {
        let mut args = Vec::new();
        payload.get_args_mut(&mut args);
        let mut changed = false;
        for arg in args {
            if let Some(new) = self.map.get(arg) {
                *arg = new.clone();
                changed = true;
            }
        }
        changed
    }

    /// Applies the substitution to every block of `cfg`.
    pub fn commit(&self, cfg: &mut Cfg) -> Result<CascadingUpdate> {
        let blocks: Vec<BlockId> = cfg.block_ids().cloned().collect();
        self.commit_blocks(cfg, &blocks)
    }

    pub fn commit_block(&self, cfg: &mut Cfg, block: &BlockId) -> Result<CascadingUpdate> {
        self.commit_blocks(cfg, std::slice::from_ref(block))
    }

    /// Applies the substitution to the phis, statements and jumps of
    /// `blocks`, as one section. The staged map is kept.
    #[instrument(level = "debug", skip_all, fields(staged = self.len(), blocks = blocks.len()))]
    pub fn commit_blocks(&self, cfg: &mut Cfg, blocks: &[BlockId]) -> Result<CascadingUpdate> {
        let mut edits = Vec::new();
        let mut touched = Vec::new();
        for block in blocks {
            let insts: Vec<InstId> = cfg.try_block(block)?.insts().cloned().collect();
            for id in insts {
                let Some(data) = cfg.inst(&id) else {
                    continue;
                };
                let old = data.args();
                if !old.iter().any(|arg| self.map.contains_key(*arg)) {
                    continue;
                }
                let args = old.into_iter().map(|arg| self.resolve(arg)).collect();
                touched.push((id.clone(), Snapshot::take(cfg, &id)));
                edits.push(Edit::RewriteArgs { id, args });
            }
        }

        let mut update = CascadingUpdate::default();
        if edits.is_empty() {
            return Ok(update);
        }
        debug!(rewritten = edits.len(), "committing");
        cfg.apply(Edit::Section {
            label: "batch subst".into(),
            edits,
        })?;
        for (id, before) in &touched {
            update.record(cfg, id, before);
        }
        Ok(update)
    }
}

// ---------------------------------------------------------------------------
// Type refresh
// ---------------------------------------------------------------------------

impl Cfg {
    /// Recomputes the cached types and effects of every statement in
    /// `blocks`, in order, until nothing changes.
    pub fn refresh_blocks(&mut self, blocks: &[BlockId]) -> Result<CascadingUpdate> {
        let mut update = CascadingUpdate::default();
        loop {
            let mut changed = false;
            for block in blocks {
                let stmts: Vec<InstId> = self.try_block(block)?.stmts().to_vec();
                for id in stmts {
                    let before = Snapshot::take(self, &id);
                    let invalidated = self.refresh_stmt(&id);
                    if invalidated.is_some_and(|i| !i.is_empty()) {
                        update.record(self, &id, &before);
                        changed = true;
                    }
                }
            }
            if !changed {
                return Ok(update);
            }
        }
    }
}
