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

use crate::errors::*;
use crate::geometry::Aabb;
use crate::math::{Relation, EPSILON};
use nalgebra::{Point3, Vector3};
use serde_derive::{Deserialize, Serialize};

/// A plane stored as the coefficients (a, b, c, d) of
/// `a·x + b·y + c·z + d = 0`, with (a, b, c) kept at unit length so that
/// [`signed_distance`](#method.signed_distance) is metric.
///
/// Used both standalone and as the half-space building block of
/// [`ConvexHull`](crate::geometry::ConvexHull), where the half-space is the
/// point set with non-positive signed distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    normal: Vector3<f64>,
    d: f64,
}

impl Plane {
    /// Builds the plane from raw coefficients, rescaling (a, b, c) to unit
    /// length. Panics on a null normal; use the checked constructors for
    /// untrusted input.
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        let normal = Vector3::new(a, b, c);
        let norm = normal.norm();
        assert!(norm > EPSILON, "null plane normal");
        Plane {
            normal: normal / norm,
            d: d / norm,
        }
    }

    pub fn from_point_normal(point: &Point3<f64>, normal: &Vector3<f64>) -> Result<Self> {
        let norm = normal.norm();
        if norm <= EPSILON {
            return Err(ErrorKind::DegeneratePlane.into());
        }
        let unit = normal / norm;
        Ok(Plane {
            normal: unit,
            d: -unit.dot(&point.coords),
        })
    }

    /// Fails with `DegeneratePlane` when the points are collinear within
    /// tolerance.
    pub fn from_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Result<Self> {
        let normal = (b - a).cross(&(c - a));
        if normal.norm() <= EPSILON {
            return Err(ErrorKind::DegeneratePlane.into());
        }
        Plane::from_point_normal(a, &normal)
    }

    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    pub fn offset(&self) -> f64 {
        self.d
    }

    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) + self.d
    }

    /// The point of the plane closest to the origin.
    pub fn foot_point(&self) -> Point3<f64> {
        Point3::origin() - self.normal * self.d
    }

    /// Projects `p` onto the plane.
    pub fn project_point(&self, p: &Point3<f64>) -> Point3<f64> {
        p - self.normal * self.signed_distance(p)
    }

    /// Classifies the box against the half-space `signed_distance ≤ 0`:
    /// `In` when every corner is on the non-positive side, `Out` when every
    /// corner is strictly positive, `Cross` when the signs split.
    pub fn relation_to_aabb(&self, aabb: &Aabb) -> Relation {
        let mut positive = false;
        let mut non_positive = false;
        for corner in &aabb.corners() {
            if self.signed_distance(corner) > EPSILON {
                positive = true;
            } else {
                non_positive = true;
            }
            if positive && non_positive {
                return Relation::Cross;
            }
        }
        if positive {
            Relation::Out
        } else {
            Relation::In
        }
    }
}
