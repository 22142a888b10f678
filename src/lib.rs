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

//! A hierarchical spatial index for point and bounded entities over a
//! cubic decomposition of the positive octant.
//!
//! Entities carry opaque content and are filed into grid cells addressed
//! by space-filling-curve keys; queries classify them against cubes,
//! spheres, planes, boxes, frusta, tetrahedra and convex hulls.

#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;

pub mod codec;
pub mod errors;
pub mod executor;
pub mod geometry;
pub mod math;
pub mod octree;

pub use crate::codec::ContentCodec;
pub use crate::executor::{Execution, ExecutionReport, ExecutorOptions, ParallelExecutor};
pub use crate::octree::{
    AtomicIdGenerator, BulkBuildStats, BulkLoader, BulkStrategy, EntityId, EntityIdGenerator,
    Grid, NodeKey, Octree, Options, QueryResult, QueryStats, MAX_LEVEL,
};

use crate::errors::Result;
use crate::geometry::{Aabb, Volume};
use nalgebra::Point3;
use std::sync::Arc;

/// The capability surface shared by the spatial indices.
///
/// The octree implements it directly; a sibling index over another cell
/// shape can slot in beside it without sharing any data layout.
pub trait SpatialIndex<C> {
    fn insert(&self, content: C, position: Point3<f64>, level: u8) -> Result<EntityId>;
    fn insert_with_bounds(
        &self,
        content: C,
        position: Point3<f64>,
        bounds: Aabb,
        level: u8,
    ) -> Result<EntityId>;
    fn lookup(&self, position: &Point3<f64>, level: u8) -> Result<Vec<EntityId>>;
    fn remove(&self, id: EntityId) -> Result<Arc<C>>;
    fn update(&self, id: EntityId, new_position: Point3<f64>, level: u8) -> Result<()>;
    fn range(&self, volume: &Volume, reference: &Point3<f64>) -> Result<Vec<QueryResult<C>>>;
    fn k_nearest(&self, q: &Point3<f64>, k: usize) -> Result<Vec<QueryResult<C>>>;
}

impl<C> SpatialIndex<C> for Octree<C> {
    fn insert(&self, content: C, position: Point3<f64>, level: u8) -> Result<EntityId> {
        Octree::insert(self, content, position, level)
    }

    fn insert_with_bounds(
        &self,
        content: C,
        position: Point3<f64>,
        bounds: Aabb,
        level: u8,
    ) -> Result<EntityId> {
        Octree::insert_with_bounds(self, content, position, bounds, level)
    }

    fn lookup(&self, position: &Point3<f64>, level: u8) -> Result<Vec<EntityId>> {
        Octree::lookup(self, position, level)
    }

    fn remove(&self, id: EntityId) -> Result<Arc<C>> {
        Octree::remove(self, id)
    }

    fn update(&self, id: EntityId, new_position: Point3<f64>, level: u8) -> Result<()> {
        Octree::update(self, id, new_position, level)
    }

    fn range(&self, volume: &Volume, reference: &Point3<f64>) -> Result<Vec<QueryResult<C>>> {
        Octree::range(self, volume, reference)
    }

    fn k_nearest(&self, q: &Point3<f64>, k: usize) -> Result<Vec<QueryResult<C>>> {
        Octree::k_nearest(self, q, k)
    }
}
