//! Block traversals.
//!
//! A [`Traversal`] is a cursor that borrows the graph only while stepping,
//! so the graph may be edited between steps. Blocks removed before they are
//! reached are skipped; blocks added after the traversal started are never
//! visited, even when they reuse the identifier of a removed one.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{dom::DomTree, ir::BlockId, Cfg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Block table order.
    Insertion,
    /// Breadth-first from the entry.
    Bfs,
    /// Depth-first pre-order from the entry.
    Dfs,
    /// Breadth-first from the exits, along predecessor edges.
    ReverseBfs,
    /// Depth-first pre-order from the exits, along predecessor edges.
    ReverseDfs,
    /// Breadth-first over a dominator tree.
    Dominees,
}

impl Order {
    fn is_reverse(self) -> bool {
        matches!(self, Order::ReverseBfs | Order::ReverseDfs)
    }

    fn is_depth_first(self) -> bool {
        matches!(self, Order::Dfs | Order::ReverseDfs)
    }

    fn is_planned(self) -> bool {
        matches!(self, Order::Insertion | Order::Dominees)
    }
}

#[derive(Debug, Clone)]
pub struct Traversal {
    order: Order,
    /// Creation stamps of the blocks that existed when the traversal
    /// (re)started.
    known: FxHashMap<BlockId, u64>,
    seen: FxHashSet<BlockId>,
    pending: VecDeque<BlockId>,
    /// Precomputed visiting order for dominator traversals.
    plan: Option<Vec<BlockId>>,
}

impl Traversal {
    pub fn new(order: Order, cfg: &Cfg) -> Self {
        let plan = (order == Order::Dominees).then(|| cfg.dom_tree().bfs());
        Self::with_plan(order, cfg, plan)
    }

    /// Breadth-first over an already computed dominator tree.
    pub fn dominees(tree: &DomTree, cfg: &Cfg) -> Self {
        Self::with_plan(Order::Dominees, cfg, Some(tree.bfs()))
    }

    fn with_plan(order: Order, cfg: &Cfg, plan: Option<Vec<BlockId>>) -> Self {
        let mut traversal = Self {
            order,
            known: FxHashMap::default(),
            seen: FxHashSet::default(),
            pending: VecDeque::new(),
            plan,
        };
        traversal.restart(cfg);
        traversal
    }

    #[inline]
    pub fn order(&self) -> Order {
        self.order
    }

    /// Starts over against the current state of `cfg`.
    pub fn restart(&mut self, cfg: &Cfg) {
        self.known = cfg
            .blocks()
            .map(|b| (b.id().clone(), b.stamp()))
            .collect();
        self.seen.clear();
        self.pending.clear();
        let roots: Vec<BlockId> = match (self.order, &self.plan) {
            (Order::Insertion, _) => cfg.block_ids().cloned().collect(),
            (Order::Dominees, Some(plan)) => plan.clone(),
            (Order::Dominees, None) => Vec::new(),
            (order, _) if order.is_reverse() => cfg.exits().cloned().collect(),
            _ => vec![cfg.entry().clone()],
        };
        if self.order.is_depth_first() {
            self.pending.extend(roots.into_iter().rev());
        } else {
            for root in roots {
                if self.order.is_planned() || self.seen.insert(root.clone()) {
                    self.pending.push_back(root);
                }
            }
        }
    }

    /// The next block, or `None` when the traversal is exhausted.
    pub fn next(&mut self, cfg: &Cfg) -> Option<BlockId> {
        loop {
            let block = match self.order.is_depth_first() {
                true => self.pending.pop_back()?,
                false => self.pending.pop_front()?,
            };
            if !self.is_known(cfg, &block) {
                continue;
            }
            if self.order.is_planned() {
                return Some(block);
            }
            if self.order.is_depth_first() && !self.seen.insert(block.clone()) {
                continue;
            }

            let next = match self.order.is_reverse() {
                true => cfg.predecessors(&block),
                false => cfg.successors(&block),
            };
            let next: Vec<BlockId> = next.into_iter().filter(|b| self.is_known(cfg, b)).collect();
            if self.order.is_depth_first() {
                let next: Vec<BlockId> = next.into_iter().filter(|b| !self.seen.contains(b)).collect();
                self.pending.extend(next.into_iter().rev());
            } else {
                for b in next {
                    if self.seen.insert(b.clone()) {
                        self.pending.push_back(b);
                    }
                }
            }
            return Some(block);
        }
    }

    /// Whether `block` is still the block that was there at the (re)start.
    fn is_known(&self, cfg: &Cfg, block: &BlockId) -> bool {
        match (cfg.block(block), self.known.get(block)) {
            (Some(b), Some(stamp)) => b.stamp() == *stamp,
            _ => false,
        }
    }

    /// Adapts the cursor into an iterator over an unchanging graph.
    pub fn iter(self, cfg: &Cfg) -> Blocks<'_> {
        Blocks {
            cfg,
            traversal: self,
        }
    }
}

/// Iterator form of a [`Traversal`].
#[derive(Debug, Clone)]
pub struct Blocks<'a> {
    cfg: &'a Cfg,
    traversal: Traversal,
}

impl Iterator for Blocks<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        self.traversal.next(self.cfg)
    }
}

impl Cfg {
    pub fn traversal(&self, order: Order) -> Traversal {
        Traversal::new(order, self)
    }

    /// Every block, in a deterministic order.
    pub fn iter(&self) -> Blocks<'_> {
        self.traversal(Order::Insertion).iter(self)
    }

    pub fn bfs(&self) -> Blocks<'_> {
        self.traversal(Order::Bfs).iter(self)
    }

    pub fn dfs(&self) -> Blocks<'_> {
        self.traversal(Order::Dfs).iter(self)
    }

    pub fn reverse_bfs(&self) -> Blocks<'_> {
        self.traversal(Order::ReverseBfs).iter(self)
    }

    pub fn reverse_dfs(&self) -> Blocks<'_> {
        self.traversal(Order::ReverseDfs).iter(self)
    }

    /// Dominator-tree order, over `tree` or over a freshly computed one.
    pub fn dominees(&self, tree: Option<&DomTree>) -> Blocks<'_> {
        match tree {
            Some(tree) => Traversal::dominees(tree, self).iter(self),
            None => self.traversal(Order::Dominees).iter(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        inst::{Jump, Stmt},
        ty::Ty,
        NodeId,
    };

    /// entry -> a | b, a -> c, b -> c, c returns; d is unreachable.
    fn graph() -> (Cfg, [BlockId; 5]) {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let a = cfg.add_bb("a").unwrap();
        let b = cfg.add_bb("b").unwrap();
        let c = cfg.add_bb("c").unwrap();
        let d = cfg.add_bb("d").unwrap();
        let cond = cfg.push_stmt(&entry, Stmt::param(0, Ty::Bool)).unwrap();
        cfg.add_jump(&entry, Jump::branch(cond, a.clone(), b.clone()))
            .unwrap();
        cfg.add_jump(&a, Jump::goto(c.clone())).unwrap();
        cfg.add_jump(&b, Jump::goto(c.clone())).unwrap();
        cfg.add_jump(&c, Jump::ret(NodeId::nil())).unwrap();
        cfg.add_jump(&d, Jump::goto(c.clone())).unwrap();
        (cfg, [entry, a, b, c, d])
    }

    #[test]
    fn test_orders() {
        let (cfg, [entry, a, b, c, d]) = graph();
        let all: Vec<_> = cfg.iter().collect();
        assert_eq!(all, vec![entry.clone(), a.clone(), b.clone(), c.clone(), d.clone()]);

        let bfs: Vec<_> = cfg.bfs().collect();
        assert_eq!(bfs, vec![entry.clone(), a.clone(), b.clone(), c.clone()]);

        let dfs: Vec<_> = cfg.dfs().collect();
        assert_eq!(dfs, vec![entry.clone(), a.clone(), c.clone(), b.clone()]);

        let rbfs: Vec<_> = cfg.reverse_bfs().collect();
        assert_eq!(rbfs, vec![c.clone(), a.clone(), b.clone(), d.clone(), entry.clone()]);

        let rdfs: Vec<_> = cfg.reverse_dfs().collect();
        assert_eq!(rdfs, vec![c.clone(), a.clone(), entry.clone(), b.clone(), d.clone()]);

        let dom: Vec<_> = cfg.dominees(None).collect();
        assert_eq!(dom[0], entry);
        assert_eq!(dom.len(), 4);
        assert!(!dom.contains(&d));
    }

    #[test]
    fn test_removed_blocks_are_skipped() {
        let (mut cfg, [entry, a, b, c, _]) = graph();
        let mut t = cfg.traversal(Order::Bfs);
        assert_eq!(t.next(&cfg), Some(entry));
        cfg.remove_jump(&b).unwrap();
        cfg.remove_bb(&b).unwrap();
        let late = cfg.add_bb("late").unwrap();
        cfg.replace_jump(&a, Jump::goto(late)).unwrap();
        assert_eq!(t.next(&cfg), Some(a));
        assert_eq!(t.next(&cfg), None, "c is no longer reachable and late is new");

        t.restart(&cfg);
        let again: Vec<_> = std::iter::from_fn(|| t.next(&cfg)).collect();
        assert_eq!(again.len(), 3);
        assert!(!again.contains(&c));
    }

    #[test]
    fn test_reused_ids_are_not_visited() {
        for order in [Order::Insertion, Order::Bfs, Order::Dfs] {
            let (mut cfg, [entry, a, _, c, _]) = graph();
            let mut t = cfg.traversal(order);
            assert_eq!(t.next(&cfg), Some(entry.clone()));

            cfg.replace_jump(&a, Jump::ret(NodeId::nil())).unwrap();
            cfg.remove_jump(&c).unwrap();
            cfg.remove_bb(&c).unwrap();
            let again = cfg.add_bb("c").unwrap();
            assert_eq!(again, c, "the freed id is handed out again");
            cfg.add_jump(&again, Jump::ret(NodeId::nil())).unwrap();
            cfg.replace_jump(&a, Jump::goto(again.clone())).unwrap();

            let rest: Vec<_> = std::iter::from_fn(|| t.next(&cfg)).collect();
            assert!(!rest.contains(&c), "{order:?} visited {rest:?}");

            t.restart(&cfg);
            let all: Vec<_> = std::iter::from_fn(|| t.next(&cfg)).collect();
            assert!(all.contains(&c), "{order:?} after restart: {all:?}");
        }
    }
}
