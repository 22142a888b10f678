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

//! Geometric queries over the index.
//!
//! Every query walks the node store in key order, prunes cells whose cube
//! is outside the query volume, then classifies each surviving entity with
//! the matching kernel. Results are ordered by Euclidean distance from the
//! caller's reference point.

use crate::errors::*;
use crate::executor::{Execution, ParallelExecutor};
use crate::geometry::{Aabb, ConvexHull, Plane, Ray, Sphere, Volume};
use crate::math::{Relation, EPSILON};
use crate::octree::{Entity, EntityId, Octree, TreeState};
use fnv::FnvHashSet;
use nalgebra::Point3;
use ordered_float::NotNan;
use std::sync::Arc;

/// One classified entity, as handed back by a query.
#[derive(Debug, Clone)]
pub struct QueryResult<C> {
    pub id: EntityId,
    pub content: Arc<C>,
    pub position: Point3<f64>,
    pub bounds: Option<Aabb>,
    pub distance_to_ref: f64,
    /// Distance from the hull's cached centroid; only hull queries set it.
    pub distance_to_hull_center: Option<f64>,
    pub classification: Relation,
    /// Depth inside the hull surface; zero for non-hull queries.
    pub penetration: f64,
}

/// Classification counts over a whole query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStats {
    pub inside: usize,
    pub intersecting: usize,
    pub outside: usize,
    pub penetration_sum: f64,
    /// Mean penetration over the non-outside entities; zero when there are
    /// none.
    pub penetration_avg: f64,
}

fn check_reference(reference: &Point3<f64>) -> Result<()> {
    if reference.x < 0.0 || reference.y < 0.0 || reference.z < 0.0 {
        return Err(ErrorKind::InvalidCoordinate(reference.x, reference.y, reference.z).into());
    }
    Ok(())
}

fn sort_by_distance<C>(results: &mut Vec<QueryResult<C>>) {
    // Positive-octant distances are never NaN.
    results.sort_by_key(|r| NotNan::new(r.distance_to_ref).unwrap());
}

impl<C> Octree<C> {
    /// The ids in all cells the volume touches, deduplicated (a spanning
    /// entity appears in several cells).
    fn candidate_ids(&self, state: &TreeState<C>, volume: &Volume) -> FnvHashSet<EntityId> {
        let mut ids = FnvHashSet::default();
        for (key, node) in state.nodes.iter() {
            if node.is_empty() {
                continue;
            }
            let cube = self.grid().bounding_cube(key);
            if volume.relation_to_cube(&cube).touches() {
                ids.extend(node.ids().cloned());
            }
        }
        ids
    }

    /// Classifies one entity against the volume; None when it is outside.
    fn classify(
        &self,
        entity: &Entity<C>,
        id: EntityId,
        volume: &Volume,
        reference: &Point3<f64>,
    ) -> Option<QueryResult<C>> {
        let classification = match entity.bounds() {
            Some(bounds) => volume.relation_to_aabb(bounds),
            None => {
                if volume.contains_point(entity.position()) {
                    Relation::In
                } else {
                    Relation::Out
                }
            }
        };
        if classification == Relation::Out {
            return None;
        }
        let (distance_to_hull_center, penetration) = match volume {
            Volume::ConvexHull(hull) => {
                let penetration = match entity.bounds() {
                    Some(bounds) => hull.penetration_of_aabb(bounds),
                    None => hull.penetration_of_point(entity.position()),
                };
                (
                    Some((entity.position() - hull.centroid()).norm()),
                    penetration,
                )
            }
            _ => (None, 0.0),
        };
        Some(QueryResult {
            id,
            content: entity.content_handle(),
            position: *entity.position(),
            bounds: entity.bounds().cloned(),
            distance_to_ref: (entity.position() - reference).norm(),
            distance_to_hull_center,
            classification,
            penetration,
        })
    }

    /// All entities inside or intersecting the volume, ordered by distance
    /// from `reference`.
    ///
    /// Cells are pruned by their cube geometry and every surviving entity
    /// is classified individually, so entities in a merely-touched cell
    /// that lie outside the volume are filtered out.
    pub fn range(&self, volume: &Volume, reference: &Point3<f64>) -> Result<Vec<QueryResult<C>>> {
        check_reference(reference)?;
        let state = self.read_state();
        let mut results = Vec::new();
        for id in self.candidate_ids(&state, volume) {
            if let Some(entity) = state.entities.get(id) {
                if let Some(result) = self.classify(entity, id, volume, reference) {
                    results.push(result);
                }
            }
        }
        sort_by_distance(&mut results);
        Ok(results)
    }

    /// Like [`range`](#method.range), with entity classification fanned
    /// out over the configured worker pool. Timeouts and worker failures
    /// are reported on the execution, not raised.
    pub fn range_parallel(
        &self,
        volume: &Volume,
        reference: &Point3<f64>,
    ) -> Result<Execution<QueryResult<C>>>
    where
        C: Send + Sync,
    {
        check_reference(reference)?;
        let executor = ParallelExecutor::new(self.options().parallel.clone())?;
        let state = self.read_state();
        let candidates: Vec<EntityId> = self.candidate_ids(&state, volume).into_iter().collect();
        let state_ref = &*state;
        let mut run = executor.map_chunks(&candidates, |chunk| {
            Ok(chunk
                .iter()
                .filter_map(|id| {
                    state_ref
                        .entities
                        .get(*id)
                        .and_then(|entity| self.classify(entity, *id, volume, reference))
                })
                .collect())
        });
        sort_by_distance(&mut run.results);
        Ok(run)
    }

    pub fn sphere(
        &self,
        center: Point3<f64>,
        radius: f64,
        reference: &Point3<f64>,
    ) -> Result<Vec<QueryResult<C>>> {
        self.range(&Volume::Sphere(Sphere::new(center, radius)), reference)
    }

    pub fn aabb(&self, aabb: Aabb, reference: &Point3<f64>) -> Result<Vec<QueryResult<C>>> {
        self.range(&Volume::Aabb(aabb), reference)
    }

    pub fn frustum(
        &self,
        frustum: crate::geometry::Frustum,
        reference: &Point3<f64>,
    ) -> Result<Vec<QueryResult<C>>> {
        self.range(&Volume::Frustum(frustum), reference)
    }

    /// Entities behind or straddling the plane (the non-positive side of
    /// its half-space), ordered by distance from `reference`.
    pub fn plane(&self, plane: &Plane, reference: &Point3<f64>) -> Result<Vec<QueryResult<C>>> {
        check_reference(reference)?;
        let state = self.read_state();
        let mut seen = FnvHashSet::default();
        let mut results = Vec::new();
        for (key, node) in state.nodes.iter() {
            if node.is_empty() {
                continue;
            }
            let cell = self.grid().bounding_cube(key).to_aabb();
            if plane.relation_to_aabb(&cell) == Relation::Out {
                continue;
            }
            for id in node.ids() {
                if !seen.insert(*id) {
                    continue;
                }
                let entity = match state.entities.get(*id) {
                    Some(entity) => entity,
                    None => continue,
                };
                let classification = match entity.bounds() {
                    Some(bounds) => plane.relation_to_aabb(bounds),
                    None => {
                        let d = plane.signed_distance(entity.position());
                        if d > EPSILON {
                            Relation::Out
                        } else if d < -EPSILON {
                            Relation::In
                        } else {
                            Relation::Cross
                        }
                    }
                };
                if classification == Relation::Out {
                    continue;
                }
                results.push(QueryResult {
                    id: *id,
                    content: entity.content_handle(),
                    position: *entity.position(),
                    bounds: entity.bounds().cloned(),
                    distance_to_ref: (entity.position() - reference).norm(),
                    distance_to_hull_center: None,
                    classification,
                    penetration: 0.0,
                });
            }
        }
        sort_by_distance(&mut results);
        Ok(results)
    }

    /// Entities hit by the ray within `t_max` of its origin. Bounded
    /// entities hit through their box; point entities only when they lie
    /// on the ray within tolerance.
    pub fn ray(
        &self,
        ray: &Ray,
        t_max: f64,
        reference: &Point3<f64>,
    ) -> Result<Vec<QueryResult<C>>> {
        check_reference(reference)?;
        let state = self.read_state();
        let mut seen = FnvHashSet::default();
        let mut results = Vec::new();
        for (key, node) in state.nodes.iter() {
            if node.is_empty() {
                continue;
            }
            let cell = self.grid().bounding_cube(key);
            match ray.intersect_cube(&cell) {
                Some(t) if t <= t_max => (),
                _ => continue,
            }
            for id in node.ids() {
                if !seen.insert(*id) {
                    continue;
                }
                let entity = match state.entities.get(*id) {
                    Some(entity) => entity,
                    None => continue,
                };
                let hit = match entity.bounds() {
                    Some(bounds) => ray.intersect_aabb(bounds).filter(|t| *t <= t_max),
                    None => {
                        let to_entity = entity.position() - ray.origin();
                        let t = to_entity.dot(ray.direction());
                        let off_axis = (to_entity - ray.direction() * t).norm();
                        if t >= 0.0 && t <= t_max && off_axis <= EPSILON {
                            Some(t)
                        } else {
                            None
                        }
                    }
                };
                if hit.is_none() {
                    continue;
                }
                results.push(QueryResult {
                    id: *id,
                    content: entity.content_handle(),
                    position: *entity.position(),
                    bounds: entity.bounds().cloned(),
                    distance_to_ref: (entity.position() - reference).norm(),
                    distance_to_hull_center: None,
                    classification: Relation::Cross,
                    penetration: 0.0,
                });
            }
        }
        sort_by_distance(&mut results);
        Ok(results)
    }

    pub fn convex_hull(
        &self,
        hull: ConvexHull,
        reference: &Point3<f64>,
    ) -> Result<Vec<QueryResult<C>>> {
        self.range(&Volume::ConvexHull(hull), reference)
    }

    /// The `k` entities nearest to `q` in ascending distance order.
    ///
    /// The initial candidate radius comes from the observed entity density
    /// (occupied cell volume per entity); it doubles until enough
    /// candidates are found or the whole index has been covered.
    pub fn k_nearest(&self, q: &Point3<f64>, k: usize) -> Result<Vec<QueryResult<C>>> {
        check_reference(q)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let state = self.read_state();
        let entity_count = state.entities.len();
        if entity_count == 0 {
            return Ok(Vec::new());
        }

        let mut occupied_volume = 0.0;
        for (key, node) in state.nodes.iter() {
            if !node.is_empty() {
                let edge = self.grid().length_at_level(key.level());
                occupied_volume += edge * edge * edge;
            }
        }
        // Radius of a ball expected to hold k entities at the observed
        // density, with headroom for uneven distributions.
        let per_entity = occupied_volume / entity_count as f64;
        let expected = (3.0 * k as f64 * per_entity / (4.0 * std::f64::consts::PI)).cbrt();
        let mut radius = (expected * 1.5).max(1.0);
        let world_edge = self.grid().length_at_level(0);
        let limit = world_edge * 3f64.sqrt();

        loop {
            let volume = Volume::Sphere(Sphere::new(*q, radius));
            let mut results = Vec::new();
            for id in self.candidate_ids(&state, &volume) {
                if let Some(entity) = state.entities.get(id) {
                    if let Some(result) = self.classify(entity, id, &volume, q) {
                        results.push(result);
                    }
                }
            }
            if results.len() >= k || radius >= limit {
                sort_by_distance(&mut results);
                results.truncate(k);
                return Ok(results);
            }
            radius *= 2.0;
        }
    }

    /// Classification counts over every entity in the index, not just the
    /// candidates, so the outside count is meaningful.
    pub fn statistics(&self, volume: &Volume) -> QueryStats {
        let state = self.read_state();
        let mut stats = QueryStats {
            inside: 0,
            intersecting: 0,
            outside: 0,
            penetration_sum: 0.0,
            penetration_avg: 0.0,
        };
        for (_, entity) in state.entities.iter() {
            let classification = match entity.bounds() {
                Some(bounds) => volume.relation_to_aabb(bounds),
                None => {
                    if volume.contains_point(entity.position()) {
                        Relation::In
                    } else {
                        Relation::Out
                    }
                }
            };
            match classification {
                Relation::In => stats.inside += 1,
                Relation::Cross | Relation::Contains => stats.intersecting += 1,
                Relation::Out => stats.outside += 1,
            }
            if classification != Relation::Out {
                if let Volume::ConvexHull(hull) = volume {
                    stats.penetration_sum += match entity.bounds() {
                        Some(bounds) => hull.penetration_of_aabb(bounds),
                        None => hull.penetration_of_point(entity.position()),
                    };
                }
            }
        }
        let counted = stats.inside + stats.intersecting;
        if counted > 0 {
            stats.penetration_avg = stats.penetration_sum / counted as f64;
        }
        stats
    }

    /// Maps each query volume to its result list, all against one
    /// reference point.
    pub fn batch(
        &self,
        queries: &[Volume],
        reference: &Point3<f64>,
    ) -> Result<Vec<Vec<QueryResult<C>>>> {
        queries
            .iter()
            .map(|volume| self.range(volume, reference))
            .collect()
    }
}
