//! Effect summaries.
//!
//! Heaps are laid out as nested intervals: a heap interferes with another
//! when their `[pre, post]` ranges overlap, so `WORLD` interferes with every
//! other heap while siblings stay independent.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbstractHeap {
    pre: u32,
    post: u32,
}

impl AbstractHeap {
    /// Everything observable.
    pub const WORLD: AbstractHeap = AbstractHeap::new(1, 8);
    /// Variable slots of lexical environments.
    pub const ENV: AbstractHeap = AbstractHeap::new(2, 3);
    /// Control state; trapping and leaving the graph.
    pub const CONTROL: AbstractHeap = AbstractHeap::new(4, 5);
    /// Allocator state.
    pub const ALLOC: AbstractHeap = AbstractHeap::new(6, 7);

    pub const fn new(pre: u32, post: u32) -> Self {
        assert!(pre <= post);
        Self { pre, post }
    }

    pub fn interferes_with(&self, other: &AbstractHeap) -> bool {
        self.pre <= other.post && other.pre <= self.post
    }
}

impl fmt::Display for AbstractHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AbstractHeap::WORLD => write!(f, "world"),
            AbstractHeap::ENV => write!(f, "env"),
            AbstractHeap::CONTROL => write!(f, "control"),
            AbstractHeap::ALLOC => write!(f, "alloc"),
            AbstractHeap { pre, post } => write!(f, "[{pre}, {post}]"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct HeapSet {
    heaps: Vec<AbstractHeap>,
}

impl HeapSet {
    pub fn new() -> Self {
        HeapSet { heaps: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.heaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heaps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbstractHeap> {
        self.heaps.iter()
    }

    pub fn push(&mut self, heap: AbstractHeap) {
        if !self.heaps.contains(&heap) {
            self.heaps.push(heap);
        }
    }

    pub fn interferes_with(&self, heap: &AbstractHeap) -> bool {
        self.heaps.iter().any(|h| h.interferes_with(heap))
    }

    fn interferes_with_any(&self, other: &HeapSet) -> bool {
        other.heaps.iter().any(|h| self.interferes_with(h))
    }
}

/// What an instruction may read and write.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Effects {
    pub reads: HeapSet,
    pub writes: HeapSet,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reading(mut self, heap: AbstractHeap) -> Self {
        self.reads.push(heap);
        self
    }

    pub fn writing(mut self, heap: AbstractHeap) -> Self {
        self.writes.push(heap);
        self
    }

    /// Returns `true` if the instruction can be freely moved or dropped.
    pub fn is_pure(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    pub fn interferes_with(&self, other: &Self) -> bool {
        self.reads.interferes_with_any(&other.writes)
            || self.writes.interferes_with_any(&other.reads)
            || self.writes.interferes_with_any(&other.writes)
    }
}

impl fmt::Display for Effects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |set: &HeapSet| {
            set.iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "reads [{}] writes [{}]", join(&self.reads), join(&self.writes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_interferes_with_everything() {
        for heap in [AbstractHeap::ENV, AbstractHeap::CONTROL, AbstractHeap::ALLOC] {
            assert!(AbstractHeap::WORLD.interferes_with(&heap));
            assert!(heap.interferes_with(&AbstractHeap::WORLD));
        }
        assert!(!AbstractHeap::ENV.interferes_with(&AbstractHeap::CONTROL));
    }

    #[test]
    fn test_reads_do_not_interfere_with_reads() {
        let a = Effects::new().reading(AbstractHeap::ENV);
        let b = Effects::new().reading(AbstractHeap::WORLD);
        assert!(!a.interferes_with(&b));

        let c = Effects::new().writing(AbstractHeap::ENV);
        assert!(a.interferes_with(&c));
        assert!(c.interferes_with(&a));
        assert!(c.interferes_with(&c));
    }

    #[test]
    fn test_pure_and_display() {
        assert!(Effects::new().is_pure());
        let e = Effects::new()
            .reading(AbstractHeap::ENV)
            .writing(AbstractHeap::WORLD)
            .writing(AbstractHeap::WORLD);
        assert!(!e.is_pure());
        assert_eq!(e.writes.len(), 1);
        assert_eq!(e.to_string(), "reads [env] writes [world]");
    }
}
