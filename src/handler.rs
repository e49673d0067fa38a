use std::collections::HashMap;

use crate::api::CollisionHandler;
use crate::pair::UnorderedPair;
use crate::types::*;

struct Registered<T: EntityType> {
    type_a: T,
    handler: Box<dyn CollisionHandler<T>>,
}

/// Collision handlers keyed by the unordered pair of their two entity types.
pub struct HandlerRegistry<T: EntityType> {
    handlers: HashMap<UnorderedPair<T>, Registered<T>>,
}

impl<T: EntityType> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self { handlers: HashMap::new() }
    }
}

impl<T: EntityType> HandlerRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `(type_a, type_b)`, returning the one it replaces.
    pub fn insert(
        &mut self,
        type_a: T,
        type_b: T,
        handler: Box<dyn CollisionHandler<T>>,
    ) -> Option<Box<dyn CollisionHandler<T>>> {
        self.handlers
            .insert(UnorderedPair::new(type_a, type_b), Registered { type_a, handler })
            .map(|r| r.handler)
    }

    pub fn remove(&mut self, type_a: T, type_b: T) -> Option<Box<dyn CollisionHandler<T>>> {
        self.handlers.remove(&UnorderedPair::new(type_a, type_b)).map(|r| r.handler)
    }

    pub fn contains(&self, type_a: T, type_b: T) -> bool {
        self.handlers.contains_key(&UnorderedPair::new(type_a, type_b))
    }

    pub fn get_mut(&mut self, key: &UnorderedPair<T>) -> Option<&mut (dyn CollisionHandler<T> + 'static)> {
        self.handlers.get_mut(key).map(|r| r.handler.as_mut())
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Find the handler for `x` and `y` and put the two operands in its declared
    /// type order. Returns the handler key and whether the operands were swapped.
    pub fn orient<V>(&self, type_x: T, x: V, type_y: T, y: V) -> Option<(UnorderedPair<T>, V, V, bool)> {
        let key = UnorderedPair::new(type_x, type_y);
        let registered = self.handlers.get(&key)?;
        if registered.type_a == type_x {
            Some((key, x, y, false))
        } else {
            Some((key, y, x, true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    enum Kind {
        Player,
        Enemy,
        Coin,
    }

    struct Noop;

    impl CollisionHandler<Kind> for Noop {}

    #[test]
    fn test_orient_follows_declared_order() {
        let mut reg = HandlerRegistry::new();
        reg.insert(Kind::Player, Kind::Enemy, Box::new(Noop));

        let (_, a, b, swapped) = reg.orient(Kind::Player, "p", Kind::Enemy, "e").unwrap();
        assert_eq!((a, b, swapped), ("p", "e", false));

        let (key, a, b, swapped) = reg.orient(Kind::Enemy, "e", Kind::Player, "p").unwrap();
        assert_eq!((a, b, swapped), ("p", "e", true));
        assert_eq!(key, UnorderedPair::new(Kind::Player, Kind::Enemy));

        assert!(reg.orient(Kind::Player, "p", Kind::Coin, "c").is_none());
    }

    #[test]
    fn test_same_type_pair_keeps_discovery_order() {
        let mut reg = HandlerRegistry::new();
        reg.insert(Kind::Coin, Kind::Coin, Box::new(Noop));
        let (_, a, b, swapped) = reg.orient(Kind::Coin, 1, Kind::Coin, 2).unwrap();
        assert_eq!((a, b, swapped), (1, 2, false));
    }

    #[test]
    fn test_insert_replaces_and_remove_is_unordered() {
        let mut reg = HandlerRegistry::new();
        assert!(reg.insert(Kind::Player, Kind::Enemy, Box::new(Noop)).is_none());
        assert!(reg.insert(Kind::Enemy, Kind::Player, Box::new(Noop)).is_some());
        assert_eq!(reg.len(), 1);
        // the latest registration defines the order
        let (_, a, _, _) = reg.orient(Kind::Player, "p", Kind::Enemy, "e").unwrap();
        assert_eq!(a, "e");

        assert!(reg.contains(Kind::Player, Kind::Enemy));
        assert!(reg.remove(Kind::Player, Kind::Enemy).is_some());
        assert!(reg.is_empty());
        assert!(reg.get_mut(&UnorderedPair::new(Kind::Enemy, Kind::Player)).is_none());
    }
}
