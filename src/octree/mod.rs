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

//! The octree index: SFC-keyed nodes over a store of entities.

use crate::errors::*;
use crate::geometry::Aabb;
use nalgebra::Point3;
use serde_derive::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub mod builder;
pub mod entity;
pub mod key;
pub mod node;
pub mod query;

#[cfg(test)]
mod tests;

pub use self::builder::{BulkBuildStats, BulkLoader, BulkStrategy};
pub use self::entity::{AtomicIdGenerator, Entity, EntityId, EntityIdGenerator, EntityStore};
pub use self::key::{ChildIndex, Grid, NodeKey, MAX_LEVEL};
pub use self::node::{Node, NodeStore};
pub use self::query::{QueryResult, QueryStats};

use crate::executor::ExecutorOptions;

/// Recognised configuration of an [`Octree`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Soft upper bound on entity ids per node before subdivision.
    pub node_capacity: usize,
    /// The finest refinement level, `0..=21`. Also fixes the world scale:
    /// cells at `max_level` have edge length 1.
    pub max_level: u8,
    /// File bounded entities into every cell their bounds touch.
    pub spanning_enabled: bool,
    /// One entity per node, no subdivision; a later insert into an
    /// occupied node evicts the resident entity.
    pub single_content_mode: bool,
    pub bulk_strategy: BulkStrategy,
    /// Sort bulk loads by key before building, for locality.
    pub pre_sort: bool,
    /// Remember every id handed out, for caller-side rollback.
    pub track_inserted_ids: bool,
    /// Hard ceiling on the bulk builder's frame stack.
    pub max_stack_depth: usize,
    /// Let the bulk builder pick leaf levels from local density.
    pub adaptive_subdivision: bool,
    pub parallel: ExecutorOptions,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            node_capacity: 10,
            max_level: MAX_LEVEL,
            spanning_enabled: false,
            single_content_mode: false,
            bulk_strategy: BulkStrategy::TopDown,
            pre_sort: true,
            track_inserted_ids: false,
            max_stack_depth: 256,
            adaptive_subdivision: false,
            parallel: ExecutorOptions::default(),
        }
    }
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        if self.node_capacity == 0 {
            return Err(
                ErrorKind::InvalidConfiguration("node_capacity must be positive".into()).into(),
            );
        }
        if self.max_level > MAX_LEVEL {
            return Err(ErrorKind::InvalidConfiguration(format!(
                "max_level must be in 0..={}, got {}",
                MAX_LEVEL, self.max_level
            ))
            .into());
        }
        if self.max_stack_depth == 0 {
            return Err(
                ErrorKind::InvalidConfiguration("max_stack_depth must be positive".into()).into(),
            );
        }
        self.parallel.validate()
    }

    /// Single-content mode overrides the configured capacity.
    pub fn effective_capacity(&self) -> usize {
        if self.single_content_mode {
            1
        } else {
            self.node_capacity
        }
    }
}

/// Everything the writer lock guards: both halves of the entity ↔ node
/// relation, plus the optional insertion log.
#[derive(Debug)]
pub(crate) struct TreeState<C> {
    pub(crate) entities: EntityStore<C>,
    pub(crate) nodes: NodeStore,
    pub(crate) inserted_ids: Vec<EntityId>,
}

impl<C> TreeState<C> {
    /// Files `id` under `key`, maintaining both sides of the relation.
    /// Returns whether the node overflowed `capacity`.
    fn file_at(&mut self, id: EntityId, key: NodeKey, capacity: usize) -> bool {
        let should_split = self.nodes.get_or_insert(key).add(id, capacity);
        self.entities.add_location(id, key);
        should_split
    }

    /// Unfiles `id` from `key`, dropping the node once it is empty and
    /// childless.
    fn unfile(&mut self, id: EntityId, key: &NodeKey) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.remove(id);
        }
        self.nodes.remove_if_empty(key);
        self.entities.remove_location(id, key);
    }

    /// Evicts every resident of `key` from the index. Single-content mode
    /// only; residents never have other locations there.
    fn evict_residents(&mut self, key: &NodeKey) {
        let residents = match self.nodes.get_mut(key) {
            Some(node) => node.drain(),
            None => return,
        };
        for resident in residents {
            self.entities.remove_location(resident, key);
            let orphaned = self
                .entities
                .locations(resident)
                .map_or(false, |locations| locations.is_empty());
            if orphaned {
                self.entities.remove(resident);
            }
        }
    }
}

/// A hierarchical spatial index over the positive octant.
///
/// Reads take the shared lock and may run concurrently; insert, update,
/// remove and subdivision serialise on the writer lock, which covers the
/// node store, the entity records and their location sets together.
pub struct Octree<C> {
    options: Options,
    grid: Grid,
    id_generator: Arc<dyn EntityIdGenerator>,
    state: RwLock<TreeState<C>>,
}

impl<C> Octree<C> {
    pub fn new(options: Options) -> Result<Self> {
        Self::with_id_generator(options, Arc::new(AtomicIdGenerator::default()))
    }

    pub fn with_id_generator(
        options: Options,
        id_generator: Arc<dyn EntityIdGenerator>,
    ) -> Result<Self> {
        options.validate()?;
        let grid = Grid::new(options.max_level)?;
        Ok(Octree {
            options,
            grid,
            id_generator,
            state: RwLock::new(TreeState {
                entities: EntityStore::default(),
                nodes: NodeStore::default(),
                inserted_ids: Vec::new(),
            }),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, TreeState<C>> {
        self.state.read().unwrap()
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, TreeState<C>> {
        self.state.write().unwrap()
    }

    pub(crate) fn next_id(&self) -> EntityId {
        self.id_generator.next()
    }

    fn check_level(&self, level: u8) -> Result<()> {
        if level > self.options.max_level {
            return Err(ErrorKind::InvalidConfiguration(format!(
                "level {} exceeds the configured max_level {}",
                level, self.options.max_level
            ))
            .into());
        }
        Ok(())
    }

    /// Inserts a point entity at `position`, filed at `level`.
    pub fn insert(&self, content: C, position: Point3<f64>, level: u8) -> Result<EntityId> {
        self.check_level(level)?;
        let key = self.grid.key_at(&position, level)?;
        let mut state = self.write_state();
        let id = self.id_generator.next();
        state.entities.put(id, content, position, None);
        self.place(&mut state, id, key, level)?;
        if self.options.track_inserted_ids {
            state.inserted_ids.push(id);
        }
        Ok(id)
    }

    /// Inserts a bounded entity. With spanning enabled the id is filed into
    /// every cell at `level` whose cube intersects the bounds; spanning
    /// insertions never trigger subdivision. Without spanning the entity is
    /// filed at its position cell like a point entity.
    pub fn insert_with_bounds(
        &self,
        content: C,
        position: Point3<f64>,
        bounds: Aabb,
        level: u8,
    ) -> Result<EntityId> {
        self.check_level(level)?;
        if bounds.min().x < 0.0 || bounds.min().y < 0.0 || bounds.min().z < 0.0 {
            let m = bounds.min();
            return Err(ErrorKind::InvalidCoordinate(m.x, m.y, m.z).into());
        }
        let position_key = self.grid.key_at(&position, level)?;
        let span_keys = if self.options.spanning_enabled {
            self.spanned_keys(&bounds, level)?
        } else {
            Vec::new()
        };
        let mut state = self.write_state();
        let id = self.id_generator.next();
        state.entities.put(id, content, position, Some(bounds));
        if self.options.spanning_enabled {
            let capacity = self.options.effective_capacity();
            for key in span_keys {
                if self.options.single_content_mode {
                    state.evict_residents(&key);
                }
                state.file_at(id, key, capacity);
            }
        } else {
            self.place(&mut state, id, position_key, level)?;
        }
        if self.options.track_inserted_ids {
            state.inserted_ids.push(id);
        }
        Ok(id)
    }

    /// All cell keys at `level` whose closed cube intersects `bounds`.
    pub(crate) fn spanned_keys(&self, bounds: &Aabb, level: u8) -> Result<Vec<NodeKey>> {
        let step = self.grid.length_at_level(level);
        // Widen by one step so cells merely touching a face are candidates,
        // then let the closed predicate decide.
        let lo = Point3::new(
            (bounds.min().x - step).max(0.0),
            (bounds.min().y - step).max(0.0),
            (bounds.min().z - step).max(0.0),
        );
        let (x0, y0, z0) = self.grid.cell_of(&lo, level)?;
        let (x1, y1, z1) = self.grid.cell_of(bounds.max(), level)?;
        let mut keys = Vec::new();
        for x in x0..=x1 {
            for y in y0..=y1 {
                for z in z0..=z1 {
                    let key = NodeKey::from_cell(x, y, z, level);
                    if bounds.intersects_cube(&self.grid.bounding_cube(&key)) {
                        keys.push(key);
                    }
                }
            }
        }
        Ok(keys)
    }

    /// Files `id` at `key` and subdivides on overflow.
    fn place(
        &self,
        state: &mut TreeState<C>,
        id: EntityId,
        key: NodeKey,
        level: u8,
    ) -> Result<()> {
        if self.options.single_content_mode {
            state.evict_residents(&key);
        }
        let should_split = state.file_at(id, key, self.options.effective_capacity());
        if should_split && level < self.options.max_level && !self.options.single_content_mode {
            self.subdivide(state, key)?;
        }
        Ok(())
    }

    /// Redistributes the node's entities one level deeper by their position
    /// keys. Children that overflow in turn are left alone; subdivision
    /// does not cascade within one call.
    fn subdivide(&self, state: &mut TreeState<C>, parent_key: NodeKey) -> Result<()> {
        let child_level = parent_key.level() + 1;
        debug_assert!(child_level <= self.options.max_level);
        let ids = match state.nodes.get_mut(&parent_key) {
            Some(node) => node.drain(),
            None => return Ok(()),
        };
        let capacity = self.options.effective_capacity();
        for id in ids {
            let position = *state
                .entities
                .position(id)
                .ok_or_else(|| Error::from(ErrorKind::EntityNotFound(id.as_u64())))?;
            // The position was validated on insert.
            let child_key = self.grid.key_at(&position, child_level)?;
            state.nodes.get_or_insert(child_key).add(id, capacity);
            state.entities.add_location(id, child_key);
            state.entities.remove_location(id, &parent_key);
        }
        if let Some(parent) = state.nodes.get_mut(&parent_key) {
            parent.set_has_children(true);
        }
        Ok(())
    }

    /// The ids filed at `position`'s cell. A present-but-subdivided node
    /// delegates to the next finer level until something is found or the
    /// grid bottoms out.
    pub fn lookup(&self, position: &Point3<f64>, level: u8) -> Result<Vec<EntityId>> {
        self.check_level(level)?;
        let state = self.read_state();
        let mut level = level;
        loop {
            let key = self.grid.key_at(position, level)?;
            match state.nodes.get(&key) {
                None => return Ok(Vec::new()),
                Some(node) => {
                    if !node.is_empty() {
                        return Ok(node.ids().cloned().collect());
                    }
                    if node.has_children() && level < self.options.max_level {
                        level += 1;
                        continue;
                    }
                    return Ok(Vec::new());
                }
            }
        }
    }

    /// The ids filed at exactly `position`'s cell at `level`, without
    /// descending into a subdivided node's children.
    pub fn lookup_exact(&self, position: &Point3<f64>, level: u8) -> Result<Vec<EntityId>> {
        self.check_level(level)?;
        let key = self.grid.key_at(position, level)?;
        let state = self.read_state();
        Ok(state
            .nodes
            .get(&key)
            .map(|node| node.ids().cloned().collect())
            .unwrap_or_default())
    }

    /// Removes the entity everywhere it is filed and returns a handle to
    /// its content.
    pub fn remove(&self, id: EntityId) -> Result<Arc<C>> {
        let mut state = self.write_state();
        let record = state
            .entities
            .remove(id)
            .ok_or_else(|| Error::from(ErrorKind::EntityNotFound(id.as_u64())))?;
        for key in record.locations() {
            state.unfile(id, key);
        }
        Ok(record.content_handle())
    }

    /// Moves the entity: clears its old locations, then re-files it at the
    /// new position. Stored bounds are kept on the record but spanning is
    /// not reconsidered; reissue `insert_with_bounds` for that.
    pub fn update(&self, id: EntityId, new_position: Point3<f64>, level: u8) -> Result<()> {
        self.check_level(level)?;
        let key = self.grid.key_at(&new_position, level)?;
        let mut state = self.write_state();
        if !state.entities.contains(id) {
            return Err(ErrorKind::EntityNotFound(id.as_u64()).into());
        }
        for old_key in state.entities.clear_locations(id) {
            state.unfile(id, &old_key);
        }
        let bounds = state.entities.bounds(id).cloned();
        state.entities.set_placement(id, new_position, bounds);
        self.place(&mut state, id, key, level)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.read_state().entities.contains(id)
    }

    pub fn content(&self, id: EntityId) -> Result<Arc<C>> {
        self.read_state()
            .entities
            .get(id)
            .map(Entity::content_handle)
            .ok_or_else(|| ErrorKind::EntityNotFound(id.as_u64()).into())
    }

    pub fn position(&self, id: EntityId) -> Result<Point3<f64>> {
        self.read_state()
            .entities
            .position(id)
            .cloned()
            .ok_or_else(|| ErrorKind::EntityNotFound(id.as_u64()).into())
    }

    pub fn bounds(&self, id: EntityId) -> Result<Option<Aabb>> {
        let state = self.read_state();
        if !state.entities.contains(id) {
            return Err(ErrorKind::EntityNotFound(id.as_u64()).into());
        }
        Ok(state.entities.bounds(id).cloned())
    }

    /// The keys at which `id` is currently filed, in key order.
    pub fn locations(&self, id: EntityId) -> Result<Vec<NodeKey>> {
        let state = self.read_state();
        let locations = state
            .entities
            .locations(id)
            .ok_or_else(|| Error::from(ErrorKind::EntityNotFound(id.as_u64())))?;
        let mut keys: Vec<_> = locations.iter().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// How many nodes file this entity; 1 for point entities, more for
    /// spanning ones.
    pub fn location_count(&self, id: EntityId) -> Result<usize> {
        self.read_state()
            .entities
            .get(id)
            .map(Entity::location_count)
            .ok_or_else(|| ErrorKind::EntityNotFound(id.as_u64()).into())
    }

    pub fn entity_count(&self) -> usize {
        self.read_state().entities.len()
    }

    pub fn node_count(&self) -> usize {
        self.read_state().nodes.len()
    }

    /// Ids recorded while `track_inserted_ids` was on.
    pub fn tracked_ids(&self) -> Vec<EntityId> {
        self.read_state().inserted_ids.clone()
    }

    /// Structural counts, mostly for diagnostics and tests.
    pub fn index_stats(&self) -> IndexStats {
        let state = self.read_state();
        let mut nodes_per_level = vec![0usize; usize::from(self.options.max_level) + 1];
        let mut max_occupied_level = 0;
        for (key, node) in state.nodes.iter() {
            nodes_per_level[usize::from(key.level())] += 1;
            if !node.is_empty() {
                max_occupied_level = max_occupied_level.max(key.level());
            }
        }
        IndexStats {
            entity_count: state.entities.len(),
            node_count: state.nodes.len(),
            nodes_per_level,
            max_occupied_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub entity_count: usize,
    pub node_count: usize,
    pub nodes_per_level: Vec<usize>,
    pub max_occupied_level: u8,
}
