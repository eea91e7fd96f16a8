//! HitIndex: which rule was last counted for which element
//!
//! Keyed by element identity and backed by a weak association, so an element
//! that leaves the page can be reclaimed even though it was counted.

use crate::hits::record::RuleKey;

/// Identity-keyed weak association `node → rule key`
pub trait HitStore<N> {
    /// Key last recorded for exactly this node
    fn get(&self, node: &N) -> Option<RuleKey>;
    /// Record a key, replacing any previous one for this node
    fn insert(&mut self, node: &N, key: RuleKey);
}

#[derive(Debug, Default)]
pub struct HitIndex<S> {
    store: S,
    marked: u64,
}

impl<S> HitIndex<S> {
    pub fn new(store: S) -> Self {
        Self { store, marked: 0 }
    }

    /// Number of `set_counted` calls so far
    pub fn marked(&self) -> u64 {
        self.marked
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_counted<N>(&self, node: &N, key: &RuleKey) -> bool
    where
        S: HitStore<N>,
    {
        self.store.get(node).is_some_and(|counted| &counted == key)
    }

    pub fn set_counted<N>(&mut self, node: &N, key: RuleKey)
    where
        S: HitStore<N>,
    {
        self.marked += 1;
        self.store.insert(node, key);
    }
}
