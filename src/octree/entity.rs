// Copyright 2016 The Cartographer Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity records and the store that owns them.
//!
//! The store is the single owner of entity content; nodes hold ids only
//! and resolve them here. An entity's location set and the node entity
//! sets are the two halves of one bidirectional relation, maintained
//! together by the index under its writer lock.

use crate::geometry::Aabb;
use crate::octree::NodeKey;
use fnv::{FnvHashMap, FnvHashSet};
use nalgebra::Point3;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An opaque entity identifier handed out by an [`EntityIdGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub fn from_u64(id: u64) -> Self {
        EntityId(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// The only process-wide state the index consumes. Implementations must be
/// thread-safe; the default is a plain atomic counter.
pub trait EntityIdGenerator: Send + Sync {
    fn next(&self) -> EntityId;
}

#[derive(Debug, Default)]
pub struct AtomicIdGenerator {
    counter: AtomicU64,
}

impl EntityIdGenerator for AtomicIdGenerator {
    fn next(&self) -> EntityId {
        EntityId(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// One stored entity: its content, where it is, and which nodes file it.
#[derive(Debug, Clone)]
pub struct Entity<C> {
    content: Arc<C>,
    position: Point3<f64>,
    bounds: Option<Aabb>,
    locations: FnvHashSet<NodeKey>,
}

impl<C> Entity<C> {
    pub fn new(content: C, position: Point3<f64>, bounds: Option<Aabb>) -> Self {
        Entity {
            content: Arc::new(content),
            position,
            bounds,
            locations: FnvHashSet::default(),
        }
    }

    /// A shared handle to the content; the record itself stays the owner.
    pub fn content_handle(&self) -> Arc<C> {
        Arc::clone(&self.content)
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn position(&self) -> &Point3<f64> {
        &self.position
    }

    pub fn bounds(&self) -> Option<&Aabb> {
        self.bounds.as_ref()
    }

    pub fn locations(&self) -> &FnvHashSet<NodeKey> {
        &self.locations
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }
}

/// The map from entity id to record.
#[derive(Debug)]
pub struct EntityStore<C> {
    entities: FnvHashMap<EntityId, Entity<C>>,
}

impl<C> Default for EntityStore<C> {
    fn default() -> Self {
        EntityStore {
            entities: FnvHashMap::default(),
        }
    }
}

impl<C> EntityStore<C> {
    /// Creates or replaces the record for `id`. An existing record keeps
    /// nothing: content, position, bounds and locations are all reset.
    pub fn put(&mut self, id: EntityId, content: C, position: Point3<f64>, bounds: Option<Aabb>) {
        self.entities.insert(id, Entity::new(content, position, bounds));
    }

    /// Updates position and bounds without touching content or locations.
    pub fn set_placement(&mut self, id: EntityId, position: Point3<f64>, bounds: Option<Aabb>) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.position = position;
            entity.bounds = bounds;
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity<C>> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn position(&self, id: EntityId) -> Option<&Point3<f64>> {
        self.entities.get(&id).map(Entity::position)
    }

    pub fn bounds(&self, id: EntityId) -> Option<&Aabb> {
        self.entities.get(&id).and_then(Entity::bounds)
    }

    pub fn locations(&self, id: EntityId) -> Option<&FnvHashSet<NodeKey>> {
        self.entities.get(&id).map(Entity::locations)
    }

    pub fn add_location(&mut self, id: EntityId, key: NodeKey) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.locations.insert(key);
        }
    }

    pub fn remove_location(&mut self, id: EntityId, key: &NodeKey) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.locations.remove(key);
        }
    }

    /// Empties the location set and returns the keys it held.
    pub fn clear_locations(&mut self, id: EntityId) -> Vec<NodeKey> {
        match self.entities.get_mut(&id) {
            Some(entity) => entity.locations.drain().collect(),
            None => Vec::new(),
        }
    }

    /// Removes the record, returning it for the caller to inspect.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity<C>> {
        self.entities.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Entity<C>)> {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_unique() {
        let generator = AtomicIdGenerator::default();
        let a = generator.next();
        let b = generator.next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_put_get_remove() {
        let mut store = EntityStore::default();
        let id = EntityId::from_u64(7);
        store.put(id, "anchor", Point3::new(1.0, 2.0, 3.0), None);
        assert!(store.contains(id));
        assert_eq!(*store.get(id).unwrap().content(), "anchor");
        assert_eq!(*store.position(id).unwrap(), Point3::new(1.0, 2.0, 3.0));
        let removed = store.remove(id).unwrap();
        assert_eq!(*removed.content(), "anchor");
        assert!(!store.contains(id));
    }

    #[test]
    fn test_locations_bookkeeping() {
        let mut store = EntityStore::default();
        let id = EntityId::from_u64(1);
        store.put(id, (), Point3::new(0.0, 0.0, 0.0), None);
        let a = NodeKey::from_str("r0");
        let b = NodeKey::from_str("r17");
        store.add_location(id, a);
        store.add_location(id, b);
        store.add_location(id, b);
        assert_eq!(store.locations(id).unwrap().len(), 2);
        store.remove_location(id, &a);
        assert_eq!(store.locations(id).unwrap().len(), 1);
        let mut drained = store.clear_locations(id);
        drained.sort();
        assert_eq!(drained, vec![b]);
        assert!(store.locations(id).unwrap().is_empty());
    }

    #[test]
    fn test_put_replaces_record() {
        let mut store = EntityStore::default();
        let id = EntityId::from_u64(2);
        store.put(id, "old", Point3::new(0.0, 0.0, 0.0), None);
        store.add_location(id, NodeKey::from_str("r3"));
        store.put(id, "new", Point3::new(5.0, 5.0, 5.0), None);
        assert_eq!(*store.get(id).unwrap().content(), "new");
        assert!(store.locations(id).unwrap().is_empty());
    }

    #[test]
    fn test_content_handle_shares_ownership() {
        let mut store = EntityStore::default();
        let id = EntityId::from_u64(3);
        store.put(id, vec![1, 2, 3], Point3::new(0.0, 0.0, 0.0), None);
        let handle = store.get(id).unwrap().content_handle();
        store.remove(id);
        // The handle keeps the content alive after removal.
        assert_eq!(*handle, vec![1, 2, 3]);
    }
}
