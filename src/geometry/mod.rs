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

//! Geometric primitives and the query volumes built from them.

mod aabb;
mod convex_hull;
mod cube;
mod frustum;
mod obb;
mod plane;
mod ray;
mod sphere;
mod tetrahedron;

pub use self::aabb::Aabb;
pub use self::convex_hull::ConvexHull;
pub use self::cube::Cube;
pub use self::frustum::{Frustum, Perspective};
pub use self::obb::Obb;
pub use self::plane::Plane;
pub use self::ray::Ray;
pub use self::sphere::Sphere;
pub use self::tetrahedron::Tetrahedron;

use crate::math::{ConvexPolyhedron, PointCulling, Relation};
use nalgebra::Point3;
use serde_derive::{Deserialize, Serialize};

/// The closed set of query volumes.
///
/// Cell classification is a match per volume type rather than a virtual
/// method, so each volume gets its specialized cube predicate.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Volume {
    Cube(Cube),
    Sphere(Sphere),
    Aabb(Aabb),
    Obb(Obb),
    Tetrahedron(Tetrahedron),
    Frustum(Frustum),
    ConvexHull(ConvexHull),
}

impl Volume {
    /// Classifies a box against this volume. Only the tetrahedron
    /// distinguishes full enclosure (`Contains`).
    pub fn relation_to_aabb(&self, aabb: &Aabb) -> Relation {
        match self {
            Volume::Cube(c) => aabb.relation_to_aabb(&c.to_aabb()),
            Volume::Sphere(sphere) => sphere.relation_to_aabb(aabb),
            Volume::Aabb(b) => aabb.relation_to_aabb(b),
            Volume::Obb(obb) => polyhedron_relation(obb, aabb),
            Volume::Tetrahedron(tetra) => tetra.relation_to_aabb(aabb),
            Volume::Frustum(frustum) => polyhedron_relation(frustum, aabb),
            Volume::ConvexHull(hull) => hull.relation_to_aabb(aabb),
        }
    }

    /// Where `cube` (a grid cell) sits relative to this volume. Cell
    /// enumeration has no use for the enclosure case; an enclosed cell
    /// still overlaps, so `Contains` folds into `Cross`.
    pub fn relation_to_cube(&self, cube: &Cube) -> Relation {
        match self.relation_to_aabb(&cube.to_aabb()) {
            Relation::Contains => Relation::Cross,
            r => r,
        }
    }

    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        match self {
            Volume::Cube(c) => c.contains_point(p),
            Volume::Sphere(sphere) => sphere.contains_point(p),
            Volume::Aabb(aabb) => aabb.contains_point(p),
            Volume::Obb(obb) => obb.contains_point(p),
            Volume::Tetrahedron(tetra) => tetra.contains_point(p),
            Volume::Frustum(frustum) => PointCulling::contains(frustum, p),
            Volume::ConvexHull(hull) => hull.contains_point(p),
        }
    }
}

/// `In` when all corners are inside, otherwise the SAT verdict.
fn polyhedron_relation<P: ConvexPolyhedron + PointCulling>(volume: &P, cell: &Aabb) -> Relation {
    let corners = cell.corners();
    if corners.iter().all(|c| volume.contains(c)) {
        return Relation::In;
    }
    volume.intersector().intersect(&cell.intersector())
}
