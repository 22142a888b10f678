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
use crate::math::EPSILON;
use nalgebra::{Point3, Vector3};
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    origin: Point3<f64>,
    direction: Vector3<f64>,
}

impl Ray {
    /// The direction is normalized so that `t` parameters are distances.
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        debug_assert!(direction.norm() > EPSILON, "null ray direction");
        Ray {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    pub fn direction(&self) -> &Vector3<f64> {
        &self.direction
    }

    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }

    /// Slab test: the entry distance into the box, or None when the ray
    /// misses it or only hits behind the origin. An origin inside the box
    /// yields `t = 0`.
    pub fn intersect_aabb(&self, aabb: &Aabb) -> Option<f64> {
        let mut t_min = 0.0f64;
        let mut t_max = f64::MAX;
        for axis in 0..3 {
            let origin = self.origin.coords[axis];
            let dir = self.direction[axis];
            let slab_min = aabb.min().coords[axis];
            let slab_max = aabb.max().coords[axis];
            if dir.abs() < EPSILON {
                // Running parallel to the slab: either always between the
                // two planes or never.
                if origin < slab_min - EPSILON || origin > slab_max + EPSILON {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let mut t0 = (slab_min - origin) * inv;
            let mut t1 = (slab_max - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max + EPSILON {
                return None;
            }
        }
        Some(t_min)
    }

    pub fn intersect_cube(&self, cube: &Cube) -> Option<f64> {
        self.intersect_aabb(&cube.to_aabb())
    }
}
