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

use crate::geometry::{Cube, Plane};
use crate::math::{ConvexPolyhedron, PointCulling, Relation, EPSILON};
use arrayvec::ArrayVec;
use nalgebra::{Point3, Vector3};
use serde_derive::{Deserialize, Serialize};

/// An axis-aligned bounding box.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Aabb {
    mins: Point3<f64>,
    maxs: Point3<f64>,
}

impl Aabb {
    pub fn new(mins: Point3<f64>, maxs: Point3<f64>) -> Self {
        debug_assert!(
            mins.x <= maxs.x && mins.y <= maxs.y && mins.z <= maxs.z,
            "inverted box"
        );
        Aabb { mins, maxs }
    }

    pub fn zero() -> Self {
        Self {
            mins: Point3::origin(),
            maxs: Point3::origin(),
        }
    }

    /// The smallest box containing all of `points`. None for an empty slice.
    pub fn bounding(points: &[Point3<f64>]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Aabb::new(*first, *first);
        for p in rest {
            aabb.grow(*p);
        }
        Some(aabb)
    }

    pub fn min(&self) -> &Point3<f64> {
        &self.mins
    }

    pub fn max(&self) -> &Point3<f64> {
        &self.maxs
    }

    pub fn grow(&mut self, p: Point3<f64>) {
        self.mins = nalgebra::inf(&self.mins, &p);
        self.maxs = nalgebra::sup(&self.maxs, &p);
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.mins, &self.maxs)
    }

    pub fn diagonal(&self) -> Vector3<f64> {
        self.maxs - self.mins
    }

    pub fn corners(&self) -> [Point3<f64>; 8] {
        [
            self.mins,
            Point3::new(self.maxs.x, self.mins.y, self.mins.z),
            Point3::new(self.mins.x, self.maxs.y, self.mins.z),
            Point3::new(self.maxs.x, self.maxs.y, self.mins.z),
            Point3::new(self.mins.x, self.mins.y, self.maxs.z),
            Point3::new(self.maxs.x, self.mins.y, self.maxs.z),
            Point3::new(self.mins.x, self.maxs.y, self.maxs.z),
            self.maxs,
        ]
    }

    /// Closed containment: the boundary counts as inside.
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        p.x >= self.mins.x - EPSILON
            && p.y >= self.mins.y - EPSILON
            && p.z >= self.mins.z - EPSILON
            && p.x <= self.maxs.x + EPSILON
            && p.y <= self.maxs.y + EPSILON
            && p.z <= self.maxs.z + EPSILON
    }

    /// Open containment: points on (or within tolerance of) the boundary are
    /// not inside.
    pub fn strictly_contains_point(&self, p: &Point3<f64>) -> bool {
        p.x > self.mins.x + EPSILON
            && p.y > self.mins.y + EPSILON
            && p.z > self.mins.z + EPSILON
            && p.x < self.maxs.x - EPSILON
            && p.y < self.maxs.y - EPSILON
            && p.z < self.maxs.z - EPSILON
    }

    /// Standard six-interval overlap test, closed at the boundary.
    pub fn intersects_aabb(&self, other: &Aabb) -> bool {
        self.mins.x <= other.maxs.x + EPSILON
            && self.maxs.x >= other.mins.x - EPSILON
            && self.mins.y <= other.maxs.y + EPSILON
            && self.maxs.y >= other.mins.y - EPSILON
            && self.mins.z <= other.maxs.z + EPSILON
            && self.maxs.z >= other.mins.z - EPSILON
    }

    pub fn intersects_cube(&self, cube: &Cube) -> bool {
        self.intersects_aabb(&cube.to_aabb())
    }

    /// Sign test over the eight corners: both signs observed means the plane
    /// straddles the box.
    pub fn intersects_plane(&self, plane: &Plane) -> bool {
        let mut above = false;
        let mut below = false;
        for corner in &self.corners() {
            let d = plane.signed_distance(corner);
            if d > EPSILON {
                above = true;
            } else if d < -EPSILON {
                below = true;
            } else {
                // A corner on the plane touches it regardless of the rest.
                return true;
            }
            if above && below {
                return true;
            }
        }
        false
    }

    /// Where this box sits relative to `other`: `In` if fully contained,
    /// `Out` if disjoint, `Cross` otherwise.
    pub fn relation_to_aabb(&self, other: &Aabb) -> Relation {
        if !self.intersects_aabb(other) {
            return Relation::Out;
        }
        if other.contains_point(&self.mins) && other.contains_point(&self.maxs) {
            return Relation::In;
        }
        Relation::Cross
    }

    /// It is convenient to have the unit axes as an associated function for
    /// intersection testing, so they can be handed to
    /// `cache_separating_axes` without referencing a specific box.
    pub fn axes() -> [Vector3<f64>; 3] {
        [Vector3::x(), Vector3::y(), Vector3::z()]
    }
}

impl PointCulling for Aabb {
    fn contains(&self, p: &Point3<f64>) -> bool {
        self.contains_point(p)
    }
}

impl ConvexPolyhedron for Aabb {
    fn compute_corners(&self) -> ArrayVec<[Point3<f64>; 8]> {
        self.corners().iter().cloned().collect()
    }

    fn compute_edges(&self) -> ArrayVec<[Vector3<f64>; 6]> {
        let mut edges = ArrayVec::new();
        edges.push(Vector3::x());
        edges.push(Vector3::y());
        edges.push(Vector3::z());
        edges
    }

    fn compute_face_normals(&self) -> ArrayVec<[Vector3<f64>; 6]> {
        self.compute_edges()
    }
}
