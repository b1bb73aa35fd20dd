use crate::{LocalId, Name};

use std::collections::{BTreeSet, HashMap};

// ---------------------------------------------------------------------------
// FreeList
// ---------------------------------------------------------------------------

/// Tracks which disambiguators of a single base name are in use.
///
/// Everything below `next` is in use unless it appears in `free`, and
/// everything at or above `next` is free. `get` always answers with the
/// smallest free disambiguator.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FreeList {
    next: u32,
    free: BTreeSet<u32>,
}

impl FreeList {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the smallest disambiguator not currently in use.
    #[inline]
    pub fn get(&self) -> u32 {
        self.free.first().copied().unwrap_or(self.next)
    }

    #[inline]
    pub fn is_used(&self, d: u32) -> bool {
        d < self.next && !self.free.contains(&d)
    }

    /// Returns `true` if no disambiguator is in use.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }

    /// Marks `d` as used. Returns `false` if it already was.
    pub fn add(&mut self, d: u32) -> bool {
        if d < self.next {
            return self.free.remove(&d);
        }
        self.free.extend(self.next..d);
        self.next = d + 1;
        true
    }

    /// Marks `d` as free. Returns `false` if it was not in use.
    pub fn remove(&mut self, d: u32) -> bool {
        if !self.is_used(d) {
            return false;
        }
        if d + 1 == self.next {
            self.next = d;
            while self.next > 0 && self.free.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.free.insert(d);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// NameAllocator
// ---------------------------------------------------------------------------

/// Allocates unique [`LocalId`]s, one [`FreeList`] per base name.
#[derive(Debug, Default, Clone)]
pub struct NameAllocator {
    lists: HashMap<Name, FreeList>,
}

impl NameAllocator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the smallest free identifier with base `name`.
    pub fn next(&mut self, name: &Name) -> LocalId {
        let list = self.lists.entry(name.clone()).or_default();
        let d = list.get();
        list.add(d);
        LocalId::new(name.clone(), d)
    }

    /// Returns what `next` would allocate, without allocating it.
    pub fn peek(&self, name: &Name) -> LocalId {
        let d = self.lists.get(name).map_or(0, FreeList::get);
        LocalId::new(name.clone(), d)
    }

    /// Marks a specific identifier as used. Returns `false` if it already was.
    pub fn reserve(&mut self, id: &LocalId) -> bool {
        self.lists
            .entry(id.name().clone())
            .or_default()
            .add(id.disambiguator())
    }

    /// Frees an identifier. Returns `false` if it was not in use.
    pub fn release(&mut self, id: &LocalId) -> bool {
        let Some(list) = self.lists.get_mut(id.name()) else {
            return false;
        };
        let released = list.remove(id.disambiguator());
        if list.is_empty() {
            self.lists.remove(id.name());
        }
        released
    }

    #[inline]
    pub fn contains(&self, id: &LocalId) -> bool {
        self.lists
            .get(id.name())
            .is_some_and(|list| list.is_used(id.disambiguator()))
    }

    pub fn clear(&mut self) {
        self.lists.clear();
    }
}
