//! Dominator tree, computed with the Cooper-Harvey-Kennedy iteration over a
//! reverse post-order of the blocks reachable from the entry.

use rustc_hash::FxHashMap;
use tracing::instrument;

use crate::{ir::BlockId, Cfg};

const UNDEF: usize = usize::MAX;

/// A snapshot of the dominance relation. It is not kept in sync with the
/// graph; recompute it after structural edits.
#[derive(Debug, Clone, PartialEq)]
pub struct DomTree {
    rpo: Vec<BlockId>,
    index: FxHashMap<BlockId, usize>,
    /// Immediate dominator of each block, by RPO index. The root points at
    /// itself.
    idom: Vec<usize>,
    children: Vec<Vec<usize>>,
}

impl DomTree {
    #[instrument(level = "debug", skip_all, fields(cfg = %cfg.id()))]
    pub fn compute(cfg: &Cfg) -> Self {
        let rpo = reverse_post_order(cfg);
        let index: FxHashMap<BlockId, usize> = rpo
            .iter()
            .enumerate()
            .map(|(i, b)| (b.clone(), i))
            .collect();
        let preds: Vec<Vec<usize>> = rpo
            .iter()
            .map(|b| {
                cfg.predecessors(b)
                    .iter()
                    .filter_map(|p| index.get(p).copied())
                    .collect()
            })
            .collect();

        let mut idom = vec![UNDEF; rpo.len()];
        if !rpo.is_empty() {
            idom[0] = 0;
        }
        let mut changed = true;
        while changed {
            changed = false;
            for b in 1..rpo.len() {
                let mut new = UNDEF;
                for &p in &preds[b] {
                    if idom[p] == UNDEF {
                        continue;
                    }
                    new = match new {
                        UNDEF => p,
                        _ => intersect(&idom, p, new),
                    };
                }
                if new != UNDEF && idom[b] != new {
                    idom[b] = new;
                    changed = true;
                }
            }
        }

        let mut children = vec![Vec::new(); rpo.len()];
        for (b, &d) in idom.iter().enumerate().skip(1) {
            if d != UNDEF {
                children[d].push(b);
            }
        }
        Self {
            rpo,
            index,
            idom,
            children,
        }
    }

    pub fn root(&self) -> Option<&BlockId> {
        self.rpo.first()
    }

    /// Blocks reachable from the entry, in reverse post-order.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    pub fn contains(&self, block: &BlockId) -> bool {
        self.index.contains_key(block)
    }

    /// The immediate dominator of `block`; `None` for the root and for
    /// blocks the tree does not know.
    pub fn idom(&self, block: &BlockId) -> Option<&BlockId> {
        let &b = self.index.get(block)?;
        match self.idom[b] {
            d if d == b || d == UNDEF => None,
            d => Some(&self.rpo[d]),
        }
    }

    pub fn children(&self, block: &BlockId) -> impl Iterator<Item = &BlockId> {
        self.index
            .get(block)
            .map(|&b| self.children[b].as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&c| &self.rpo[c])
    }

    /// Whether every path from the root to `b` goes through `a`. A block
    /// dominates itself.
    pub fn dominates(&self, a: &BlockId, b: &BlockId) -> bool {
        let (Some(&a), Some(&b)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        let mut b = b;
        // RPO indices of dominators are strictly smaller.
        while b > a {
            b = self.idom[b];
        }
        a == b
    }

    /// The tree in breadth-first order from the root.
    pub fn bfs(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.rpo.len());
        if self.rpo.is_empty() {
            return order;
        }
        let mut queue = std::collections::VecDeque::from([0]);
        while let Some(b) = queue.pop_front() {
            order.push(self.rpo[b].clone());
            queue.extend(self.children[b].iter().copied());
        }
        order
    }
}

fn intersect(idom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a];
        }
        while b > a {
            b = idom[b];
        }
    }
    a
}

fn reverse_post_order(cfg: &Cfg) -> Vec<BlockId> {
    let mut post = Vec::with_capacity(cfg.len());
    let mut visited = rustc_hash::FxHashSet::default();
    let mut stack: Vec<(BlockId, Vec<BlockId>)> = Vec::new();
    let entry = cfg.entry().clone();
    if !cfg.has_block(&entry) {
        return post;
    }
    visited.insert(entry.clone());
    let succs = cfg.successors(&entry);
    stack.push((entry, succs.into_iter().rev().collect()));
    while let Some((block, pending)) = stack.last_mut() {
        match pending.pop() {
            Some(succ) => {
                if cfg.has_block(&succ) && visited.insert(succ.clone()) {
                    let succs = cfg.successors(&succ);
                    stack.push((succ, succs.into_iter().rev().collect()));
                }
            }
            None => {
                post.push(block.clone());
                stack.pop();
            }
        }
    }
    post.reverse();
    post
}

impl Cfg {
    /// Computes the dominator tree from scratch.
    pub fn dom_tree(&self) -> DomTree {
        DomTree::compute(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        inst::{Jump, Stmt},
        ty::Ty,
    };

    #[test]
    fn test_diamond_with_loop() {
        // entry -> a | b; a -> join; b -> b | join
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let a = cfg.add_bb("a").unwrap();
        let b = cfg.add_bb("b").unwrap();
        let join = cfg.add_bb("join").unwrap();
        let dead = cfg.add_bb("dead").unwrap();
        let c = cfg.push_stmt(&entry, Stmt::param(0, Ty::Bool)).unwrap();
        cfg.add_jump(&entry, Jump::branch(c.clone(), a.clone(), b.clone()))
            .unwrap();
        cfg.add_jump(&a, Jump::goto(join.clone())).unwrap();
        cfg.add_jump(&b, Jump::branch(c, b.clone(), join.clone()))
            .unwrap();
        cfg.add_jump(&dead, Jump::goto(join.clone())).unwrap();
        cfg.add_jump(&join, Jump::Unreachable).unwrap();

        let tree = cfg.dom_tree();
        assert_eq!(tree.root(), Some(&entry));
        assert_eq!(tree.rpo().len(), 4);
        assert!(!tree.contains(&dead));
        assert_eq!(tree.idom(&entry), None);
        assert_eq!(tree.idom(&a), Some(&entry));
        assert_eq!(tree.idom(&b), Some(&entry));
        assert_eq!(tree.idom(&join), Some(&entry));
        assert!(tree.dominates(&entry, &join));
        assert!(tree.dominates(&b, &b));
        assert!(!tree.dominates(&b, &join));
        assert!(!tree.dominates(&dead, &join));

        let mut kids: Vec<_> = tree.children(&entry).cloned().collect();
        kids.sort();
        assert_eq!(kids, vec![a, b, join]);
        assert_eq!(tree.bfs()[0], entry);
        assert_eq!(tree.bfs().len(), 4);
    }

    #[test]
    fn test_chain() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let mid = cfg.split_new_successor(&entry, 0).unwrap();
        let last = cfg.split_new_successor(&mid, 0).unwrap();
        let tree = cfg.dom_tree();
        assert_eq!(tree.rpo(), &[entry.clone(), mid.clone(), last.clone()]);
        assert_eq!(tree.idom(&last), Some(&mid));
        assert!(tree.dominates(&entry, &last));
        assert!(!tree.dominates(&last, &mid));
    }
}
