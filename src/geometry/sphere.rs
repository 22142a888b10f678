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

use crate::geometry::{Aabb, Cube};
use crate::math::{PointCulling, Relation, EPSILON};
use nalgebra::Point3;
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    center: Point3<f64>,
    radius: f64,
}

impl Sphere {
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        debug_assert!(radius >= 0.0, "negative radius");
        Sphere { center, radius }
    }

    pub fn center(&self) -> &Point3<f64> {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        (p - self.center).norm_squared() <= (self.radius + EPSILON) * (self.radius + EPSILON)
    }

    /// The classic closest-point-on-cube test: the cube is outside when the
    /// clamped distance exceeds the radius, inside when even its farthest
    /// corner is within the radius.
    pub fn relation_to_cube(&self, cube: &Cube) -> Relation {
        self.relation_to_aabb(&cube.to_aabb())
    }

    pub fn relation_to_aabb(&self, aabb: &Aabb) -> Relation {
        let closest = Point3::new(
            self.center.x.max(aabb.min().x).min(aabb.max().x),
            self.center.y.max(aabb.min().y).min(aabb.max().y),
            self.center.z.max(aabb.min().z).min(aabb.max().z),
        );
        let r_sq = self.radius * self.radius;
        if (closest - self.center).norm_squared() > r_sq + EPSILON {
            return Relation::Out;
        }
        let all_corners_in = aabb
            .corners()
            .iter()
            .all(|c| (c - self.center).norm_squared() <= r_sq + EPSILON);
        if all_corners_in {
            Relation::In
        } else {
            Relation::Cross
        }
    }
}

impl PointCulling for Sphere {
    fn contains(&self, p: &Point3<f64>) -> bool {
        self.contains_point(p)
    }
}
