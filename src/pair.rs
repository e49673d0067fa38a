use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::types::*;

/// Two values whose order does not matter for equality or hashing.
///
/// Hashing orders the two operand hashes before combining them, so
/// `(a, b)` and `(b, a)` land in the same bucket.
#[derive(Copy, Clone, Debug)]
pub struct UnorderedPair<K> {
    pub first: K,
    pub second: K,
}

impl<K> UnorderedPair<K> {
    pub fn new(first: K, second: K) -> Self {
        Self { first, second }
    }
}

impl<K: PartialEq> UnorderedPair<K> {
    pub fn contains(&self, k: &K) -> bool {
        self.first == *k || self.second == *k
    }
}

fn hash_one<K: Hash>(k: &K) -> u64 {
    let mut h = DefaultHasher::new();
    k.hash(&mut h);
    h.finish()
}

impl<K: Hash> Hash for UnorderedPair<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (x, y) = (hash_one(&self.first), hash_one(&self.second));
        state.write_u64(x.min(y));
        state.write_u64(x.max(y));
    }
}

impl<K: PartialEq> PartialEq for UnorderedPair<K> {
    fn eq(&self, other: &Self) -> bool {
        (self.first == other.first && self.second == other.second)
            || (self.first == other.second && self.second == other.first)
    }
}

impl<K: Eq> Eq for UnorderedPair<K> {}

/// What keeps a pair alive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PairSource {
    /// Reported by the rigid-body engine; `contacts` counts touching fixture pairs.
    Engine { contacts: u32 },
    /// Found by the overlap pass; must be confirmed every tick.
    Overlap,
}

/// One active collision between two entities.
///
/// `a` and `b` follow the declared type order of the handler that owns the pair.
#[derive(Clone, Debug)]
pub struct CollisionPair<T: EntityType> {
    a: EntityId,
    b: EntityId,
    handler: UnorderedPair<T>,
    pub(crate) source: PairSource,
}

impl<T: EntityType> CollisionPair<T> {
    pub fn new(a: EntityId, b: EntityId, handler: UnorderedPair<T>, source: PairSource) -> Self {
        Self { a, b, handler, source }
    }

    pub fn a(&self) -> EntityId {
        self.a
    }

    pub fn b(&self) -> EntityId {
        self.b
    }

    pub fn key(&self) -> UnorderedPair<EntityId> {
        UnorderedPair::new(self.a, self.b)
    }

    pub fn handler_key(&self) -> UnorderedPair<T> {
        self.handler
    }

    pub fn source(&self) -> PairSource {
        self.source
    }

    pub fn involves(&self, id: EntityId) -> bool {
        self.a == id || self.b == id
    }
}

/// Active pairs keyed by their unordered entity ids. One record per entity pair.
#[derive(Clone, Debug)]
pub struct PairTracker<T: EntityType> {
    pairs: HashMap<UnorderedPair<EntityId>, CollisionPair<T>>,
}

impl<T: EntityType> Default for PairTracker<T> {
    fn default() -> Self {
        Self { pairs: HashMap::new() }
    }
}

impl<T: EntityType> PairTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, a: EntityId, b: EntityId) -> Option<&CollisionPair<T>> {
        self.pairs.get(&UnorderedPair::new(a, b))
    }

    pub fn get_mut(&mut self, a: EntityId, b: EntityId) -> Option<&mut CollisionPair<T>> {
        self.pairs.get_mut(&UnorderedPair::new(a, b))
    }

    pub fn contains(&self, a: EntityId, b: EntityId) -> bool {
        self.pairs.contains_key(&UnorderedPair::new(a, b))
    }

    /// Insert `pair`, replacing any record for the same two entities.
    pub fn put(&mut self, pair: CollisionPair<T>) -> Option<CollisionPair<T>> {
        self.pairs.insert(pair.key(), pair)
    }

    pub fn remove(&mut self, a: EntityId, b: EntityId) -> Option<CollisionPair<T>> {
        self.pairs.remove(&UnorderedPair::new(a, b))
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollisionPair<T>> {
        self.pairs.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut CollisionPair<T>> {
        self.pairs.values_mut()
    }

    /// Keys of every pair matching `pred`.
    pub(crate) fn keys_where(&self, mut pred: impl FnMut(&CollisionPair<T>) -> bool) -> Vec<UnorderedPair<EntityId>> {
        self.pairs.iter().filter(|(_, p)| pred(p)).map(|(k, _)| *k).collect()
    }

    pub(crate) fn take(&mut self, key: &UnorderedPair<EntityId>) -> Option<CollisionPair<T>> {
        self.pairs.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::collections::HashSet;

    fn ids(n: usize) -> Vec<EntityId> {
        let mut sm: SlotMap<EntityId, ()> = SlotMap::with_key();
        (0..n).map(|_| sm.insert(())).collect()
    }

    #[test]
    fn test_unordered_hash_is_symmetric() {
        let k = ids(2);
        assert_eq!(hash_one(&UnorderedPair::new(k[0], k[1])), hash_one(&UnorderedPair::new(k[1], k[0])));
        assert_eq!(UnorderedPair::new(k[0], k[1]), UnorderedPair::new(k[1], k[0]));
        assert_eq!(hash_one(&UnorderedPair::new("x", "y")), hash_one(&UnorderedPair::new("y", "x")));

        let mut set = HashSet::new();
        assert!(set.insert(UnorderedPair::new(3, 7)));
        assert!(!set.insert(UnorderedPair::new(7, 3)));
        assert!(set.insert(UnorderedPair::new(3, 3)));
    }

    #[test]
    fn test_tracker_lookup_either_order() {
        let k = ids(3);
        let mut tracker: PairTracker<u8> = PairTracker::new();
        tracker.put(CollisionPair::new(k[0], k[1], UnorderedPair::new(1, 2), PairSource::Overlap));

        let fwd = tracker.get(k[0], k[1]).map(CollisionPair::key);
        let rev = tracker.get(k[1], k[0]).map(CollisionPair::key);
        assert!(fwd.is_some());
        assert_eq!(fwd, rev);
        assert!(tracker.get(k[0], k[2]).is_none());
        // oriented operands are kept as inserted
        assert_eq!(tracker.get(k[1], k[0]).map(|p| p.a()), Some(k[0]));
    }

    #[test]
    fn test_put_never_duplicates() {
        let k = ids(2);
        let mut tracker: PairTracker<u8> = PairTracker::new();
        assert!(tracker.put(CollisionPair::new(k[0], k[1], UnorderedPair::new(1, 2), PairSource::Overlap)).is_none());
        let old = tracker.put(CollisionPair::new(k[1], k[0], UnorderedPair::new(2, 1), PairSource::Engine { contacts: 1 }));
        assert_eq!(old.map(|p| p.source()), Some(PairSource::Overlap));
        assert_eq!(tracker.len(), 1);

        if let Some(p) = tracker.get_mut(k[0], k[1]) {
            p.source = PairSource::Engine { contacts: 2 };
        }
        assert_eq!(tracker.get(k[0], k[1]).map(|p| p.source()), Some(PairSource::Engine { contacts: 2 }));

        assert!(tracker.remove(k[0], k[1]).is_some());
        assert!(tracker.is_empty());
        assert!(tracker.remove(k[0], k[1]).is_none());
    }

    #[test]
    fn test_keys_where_and_clear() {
        let k = ids(4);
        let mut tracker: PairTracker<u8> = PairTracker::new();
        tracker.put(CollisionPair::new(k[0], k[1], UnorderedPair::new(1, 2), PairSource::Overlap));
        tracker.put(CollisionPair::new(k[0], k[2], UnorderedPair::new(1, 3), PairSource::Overlap));
        tracker.put(CollisionPair::new(k[3], k[2], UnorderedPair::new(1, 3), PairSource::Overlap));

        assert_eq!(tracker.keys_where(|p| p.involves(k[0])).len(), 2);
        assert_eq!(tracker.keys_where(|p| p.handler_key() == UnorderedPair::new(3, 1)).len(), 2);

        tracker.clear();
        assert_eq!(tracker.len(), 0);
    }
}
