use cfir_names::Name;

use crate::{
    edit::Edit,
    ir::{
        inst::{Payload, Stmt},
        BlockId, InstId,
    },
    Cfg, Result,
};

/// Statements queued for insertion at several indices of one block.
///
/// Indices refer to the block as it was before anything was inserted, so
/// callers can walk a block and queue insertions without tracking shifts.
/// Everything is applied at once, as a single section of batched
/// insertions, after which the set can be reused for another block.
#[derive(Debug, Default, Clone)]
pub struct InsertionSet {
    log: Vec<(usize, Name, Stmt)>,
}

impl InsertionSet {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }

    /// Queues `stmt` before the statement at `index`. Statements queued at
    /// the same index keep their queueing order.
    #[inline]
    pub fn before(&mut self, index: usize, stmt: Stmt) {
        let name = Name::new(stmt.mnemonic());
        self.log.push((index, name, stmt));
    }

    #[inline]
    pub fn before_named(&mut self, index: usize, name: impl Into<Name>, stmt: Stmt) {
        self.log.push((index, name.into(), stmt));
    }

    #[inline]
    pub fn after(&mut self, index: usize, stmt: Stmt) {
        self.before(index + 1, stmt);
    }

    /// Applies every queued insertion to `block` and empties the set.
    /// Insertions past the end of the block are appended.
    ///
    /// Returns the new identifiers in block order.
    pub fn apply(&mut self, cfg: &mut Cfg, block: &BlockId) -> Result<Vec<InstId>> {
        if self.log.is_empty() {
            return Ok(Vec::new());
        }
        let len = cfg.try_block(block)?.len();
        let mut log = std::mem::take(&mut self.log);
        log.sort_by_key(|(index, _, _)| *index);

        let ids = cfg.fresh_inst_ids(log.iter().map(|(_, name, _)| name));
        let mut edits: Vec<Edit> = Vec::new();
        let mut inserted = 0;
        for ((index, _, stmt), id) in log.into_iter().zip(ids.iter().cloned()) {
            let at = index.min(len) + inserted;
            match edits.last_mut() {
                Some(Edit::InsertStmts {
                    index: start,
                    stmts,
                    ..
                }) if *start + stmts.len() == at => stmts.push((id, stmt)),
                _ => edits.push(Edit::InsertStmts {
                    block: block.clone(),
                    index: at,
                    stmts: vec![(id, stmt)],
                }),
            }
            inserted += 1;
        }

        cfg.apply(Edit::Section {
            label: "insertion set".into(),
            edits,
        })?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{inst::BinaryOp, ty::Ty, NodeId};

    fn block_of(cfg: &Cfg, block: &BlockId) -> Vec<String> {
        cfg.block(block)
            .unwrap()
            .stmts()
            .iter()
            .map(|id| id.name().as_str().to_owned())
            .collect()
    }

    fn setup() -> (Cfg, BlockId) {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        cfg.insert_named_stmt(&entry, 0, "one", Stmt::Nop).unwrap();
        cfg.insert_named_stmt(&entry, 1, "two", Stmt::Nop).unwrap();
        (cfg, entry)
    }

    #[test]
    fn test_empty_insertion_set() {
        let (mut cfg, entry) = setup();
        let mut set = InsertionSet::new();
        assert!(set.is_empty());
        assert_eq!(set.apply(&mut cfg, &entry).unwrap(), vec![]);
        assert_eq!(block_of(&cfg, &entry), ["one", "two"]);
    }

    #[test]
    fn test_before_and_after() {
        let (mut cfg, entry) = setup();
        let mut set = InsertionSet::new();
        set.after(1, Stmt::Nop);
        set.before_named(0, "a", Stmt::Nop);
        set.before_named(1, "b", Stmt::Nop);
        set.before_named(1, "c", Stmt::Nop);
        assert_eq!(set.len(), 4);
        let ids = set.apply(&mut cfg, &entry).unwrap();
        assert_eq!(block_of(&cfg, &entry), ["a", "one", "b", "c", "two", "nop"]);
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0].name().as_str(), "a");
        assert!(set.is_empty());
    }

    #[test]
    fn test_insertions_beyond_block_length() {
        let (mut cfg, entry) = setup();
        let mut set = InsertionSet::new();
        set.before_named(5, "x", Stmt::Nop);
        set.before_named(10, "y", Stmt::Nop);
        set.apply(&mut cfg, &entry).unwrap();
        assert_eq!(block_of(&cfg, &entry), ["one", "two", "x", "y"]);
    }

    #[test]
    fn test_is_one_undoable_section() {
        let (mut cfg, entry) = setup();
        let before = cfg.to_string();
        let mut set = InsertionSet::new();
        set.before(0, Stmt::param(0, Ty::Int));
        set.before(2, Stmt::binary(BinaryOp::Add, NodeId::int(1), NodeId::int(2)));
        let (ids, log) = cfg.record(|cfg| set.apply(cfg, &entry));
        assert_eq!(ids.unwrap().len(), 2);
        assert_eq!(log.records().len(), 1);
        log.undo(&mut cfg).unwrap();
        assert_eq!(cfg.to_string(), before);
    }

    #[test]
    fn test_reuse_after_apply() {
        let (mut cfg, entry) = setup();
        let other = cfg.add_bb("other").unwrap();
        let mut set = InsertionSet::new();
        set.before_named(0, "first", Stmt::Nop);
        set.apply(&mut cfg, &entry).unwrap();
        set.before_named(0, "second", Stmt::Nop);
        set.apply(&mut cfg, &other).unwrap();
        assert_eq!(block_of(&cfg, &entry), ["first", "one", "two"]);
        assert_eq!(block_of(&cfg, &other), ["second"]);
    }
}
