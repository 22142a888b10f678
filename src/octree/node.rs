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

//! Nodes and the ordered key → node mapping.

use crate::octree::{EntityId, NodeKey};
use fnv::FnvHashSet;
use std::collections::BTreeMap;

/// The container at one grid cell: the entity ids resident there and a
/// flag recording that its entities were redistributed to deeper cells.
#[derive(Debug, Clone, Default)]
pub struct Node {
    entities: FnvHashSet<EntityId>,
    has_children: bool,
}

impl Node {
    pub fn new() -> Self {
        Node::default()
    }

    /// Adds `id` and reports whether the node now exceeds `capacity` and
    /// the caller should consider subdividing. The node itself never
    /// splits; that decision stays with the index.
    pub fn add(&mut self, id: EntityId, capacity: usize) -> bool {
        self.entities.insert(id);
        self.entities.len() > capacity
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        self.entities.remove(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.iter()
    }

    /// Empties the entity set and returns the ids it held, for
    /// redistribution into children.
    pub fn drain(&mut self) -> Vec<EntityId> {
        self.entities.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn has_children(&self) -> bool {
        self.has_children
    }

    pub fn set_has_children(&mut self, has_children: bool) {
        self.has_children = has_children;
    }
}

/// The ordered mapping from SFC key to node. Keys sort by (level, code),
/// so one level's nodes form a contiguous, curve-ordered run.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: BTreeMap<NodeKey, Node>,
}

impl NodeStore {
    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: &NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn get_or_insert(&mut self, key: NodeKey) -> &mut Node {
        self.nodes.entry(key).or_insert_with(Node::new)
    }

    pub fn contains_key(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn remove(&mut self, key: &NodeKey) -> Option<Node> {
        self.nodes.remove(key)
    }

    /// Removes the node if it holds nothing and leads nowhere.
    pub fn remove_if_empty(&mut self, key: &NodeKey) {
        if let Some(node) = self.nodes.get(key) {
            if node.is_empty() && !node.has_children() {
                self.nodes.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeKey, &Node)> {
        self.nodes.iter()
    }

    /// The nodes of one level, in curve order.
    pub fn level_iter(&self, level: u8) -> impl Iterator<Item = (&NodeKey, &Node)> {
        self.nodes
            .range(NodeKey::from_level_code(level, 0)..)
            .take_while(move |(key, _)| key.level() == level)
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_reports_overflow() {
        let mut node = Node::new();
        assert!(!node.add(EntityId::from_u64(1), 2));
        assert!(!node.add(EntityId::from_u64(2), 2));
        assert!(node.add(EntityId::from_u64(3), 2));
        // Re-adding an existing id does not grow the set.
        assert!(node.add(EntityId::from_u64(3), 2));
        assert_eq!(node.len(), 3);
    }

    #[test]
    fn test_remove_if_empty_spares_parents() {
        let mut store = NodeStore::default();
        let key = NodeKey::from_str("r4");
        store.get_or_insert(key).set_has_children(true);
        store.remove_if_empty(&key);
        assert!(store.contains_key(&key));
        store.get_mut(&key).unwrap().set_has_children(false);
        store.remove_if_empty(&key);
        assert!(!store.contains_key(&key));
    }

    #[test]
    fn test_level_iter_is_ordered_and_bounded() {
        let mut store = NodeStore::default();
        for name in &["r", "r1", "r5", "r0", "r22", "r71"] {
            store.get_or_insert(NodeKey::from_str(name));
        }
        let level_one: Vec<_> = store
            .level_iter(1)
            .map(|(key, _)| key.to_string())
            .collect();
        assert_eq!(level_one, vec!["r0", "r1", "r5"]);
        let level_two: Vec<_> = store
            .level_iter(2)
            .map(|(key, _)| key.to_string())
            .collect();
        assert_eq!(level_two, vec!["r22", "r71"]);
    }
}
