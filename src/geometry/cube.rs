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

//! An axis-aligned cube, the cell shape of the hierarchical grid.

use crate::geometry::Aabb;
use crate::math::{clamp, EPSILON};
use nalgebra::Point3;
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cube {
    min: Point3<f64>,
    edge_length: f64,
}

impl Cube {
    pub fn new(min: Point3<f64>, edge_length: f64) -> Self {
        Cube { min, edge_length }
    }

    /// The smallest cube sharing `aabb`'s min corner that covers it.
    pub fn bounding(aabb: &Aabb) -> Self {
        let edge_length = (aabb.max().x - aabb.min().x)
            .max(aabb.max().y - aabb.min().y)
            .max(aabb.max().z - aabb.min().z);
        Cube {
            min: *aabb.min(),
            edge_length,
        }
    }

    pub fn to_aabb(&self) -> Aabb {
        Aabb::new(self.min(), self.max())
    }

    pub fn edge_length(&self) -> f64 {
        self.edge_length
    }

    pub fn min(&self) -> Point3<f64> {
        self.min
    }

    pub fn max(&self) -> Point3<f64> {
        Point3::new(
            self.min.x + self.edge_length,
            self.min.y + self.edge_length,
            self.min.z + self.edge_length,
        )
    }

    pub fn center(&self) -> Point3<f64> {
        let min = self.min();
        let max = self.max();
        Point3::new(
            (min.x + max.x) / 2.,
            (min.y + max.y) / 2.,
            (min.z + max.z) / 2.,
        )
    }

    /// Closed containment, consistent with `Aabb::contains_point`.
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        let max = self.max();
        p.x >= self.min.x - EPSILON
            && p.y >= self.min.y - EPSILON
            && p.z >= self.min.z - EPSILON
            && p.x <= max.x + EPSILON
            && p.y <= max.y + EPSILON
            && p.z <= max.z + EPSILON
    }

    /// The point of the cube closest to `p` (i.e. `p` clamped to the cube).
    pub fn closest_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let max = self.max();
        Point3::new(
            clamp(p.x, self.min.x, max.x),
            clamp(p.y, self.min.y, max.y),
            clamp(p.z, self.min.z, max.z),
        )
    }

    /// Squared distance from `p` to the cube surface, zero inside.
    pub fn distance_squared_to_point(&self, p: &Point3<f64>) -> f64 {
        (self.closest_point(p) - p).norm_squared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_covers_aabb() {
        let aabb = Aabb::new(Point3::new(1.0, 1.0, 1.0), Point3::new(3.0, 5.0, 2.0));
        let cube = Cube::bounding(&aabb);
        assert_eq!(cube.min(), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(cube.edge_length(), 4.0);
        assert!(cube.contains_point(aabb.max()));
    }

    #[test]
    fn test_closest_point() {
        let cube = Cube::new(Point3::new(8.0, 8.0, 8.0), 2.0);
        // A point outside along the diagonal clamps to the nearest corner.
        let closest = cube.closest_point(&Point3::new(12.0, 12.0, 12.0));
        assert_eq!(closest, Point3::new(10.0, 10.0, 10.0));
        // A point inside is its own closest point.
        let inside = Point3::new(9.0, 8.5, 9.5);
        assert_eq!(cube.closest_point(&inside), inside);
        assert_relative_eq!(cube.distance_squared_to_point(&inside), 0.0);
    }

    #[test]
    fn test_distance_squared() {
        let cube = Cube::new(Point3::new(8.0, 8.0, 8.0), 2.0);
        // (10,10,10) is the closest corner to (11,10,10).
        assert_relative_eq!(
            cube.distance_squared_to_point(&Point3::new(11.0, 10.0, 10.0)),
            1.0
        );
    }
}
