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
use crate::geometry::{Aabb, Plane};
use crate::math::{ConvexPolyhedron, PointCulling, EPSILON};
use arrayvec::ArrayVec;
use nalgebra::{Point3, Vector3};
use serde_derive::{Deserialize, Serialize};

/// An oriented bounding box given by its center, three unit axes and three
/// positive half extents.
///
/// Construction is checked: the axes must be unit length, the extents
/// positive, and every corner must stay inside the positive octant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obb {
    center: Point3<f64>,
    axes: [Vector3<f64>; 3],
    half_extent: Vector3<f64>,
}

impl Obb {
    pub fn new(
        center: Point3<f64>,
        axes: [Vector3<f64>; 3],
        half_extent: Vector3<f64>,
    ) -> Result<Self> {
        for axis in &axes {
            if (axis.norm() - 1.0).abs() > EPSILON {
                return Err(
                    ErrorKind::InvalidConfiguration("box axes must be unit length".into()).into(),
                );
            }
        }
        if half_extent.x <= 0.0 || half_extent.y <= 0.0 || half_extent.z <= 0.0 {
            return Err(
                ErrorKind::InvalidConfiguration("box extents must be positive".into()).into(),
            );
        }
        let obb = Obb {
            center,
            axes,
            half_extent,
        };
        for corner in &obb.corners() {
            if corner.x < 0.0 || corner.y < 0.0 || corner.z < 0.0 {
                return Err(ErrorKind::InvalidCoordinate(corner.x, corner.y, corner.z).into());
            }
        }
        Ok(obb)
    }

    pub fn from_aabb(aabb: &Aabb) -> Result<Self> {
        Obb::new(
            aabb.center(),
            [Vector3::x(), Vector3::y(), Vector3::z()],
            aabb.max() - aabb.center(),
        )
    }

    pub fn center(&self) -> &Point3<f64> {
        &self.center
    }

    pub fn half_extent(&self) -> &Vector3<f64> {
        &self.half_extent
    }

    pub fn corners(&self) -> ArrayVec<[Point3<f64>; 8]> {
        let mut corners = ArrayVec::new();
        for &sx in &[-1.0, 1.0] {
            for &sy in &[-1.0, 1.0] {
                for &sz in &[-1.0, 1.0] {
                    corners.push(
                        self.center
                            + self.axes[0] * (sx * self.half_extent.x)
                            + self.axes[1] * (sy * self.half_extent.y)
                            + self.axes[2] * (sz * self.half_extent.z),
                    );
                }
            }
        }
        corners
    }

    /// True when every axis is parallel to a coordinate axis within
    /// tolerance.
    pub fn is_axis_aligned(&self) -> bool {
        self.axes.iter().all(|axis| {
            let a = Vector3::new(axis.x.abs(), axis.y.abs(), axis.z.abs());
            (a.x - 1.0).abs() < EPSILON && a.y < EPSILON && a.z < EPSILON
                || (a.y - 1.0).abs() < EPSILON && a.x < EPSILON && a.z < EPSILON
                || (a.z - 1.0).abs() < EPSILON && a.x < EPSILON && a.y < EPSILON
        })
    }

    /// The world-aligned box covering this one.
    pub fn to_aabb(&self) -> Aabb {
        let corners = self.corners();
        let mut aabb = Aabb::new(corners[0], corners[0]);
        for corner in &corners[1..] {
            aabb.grow(*corner);
        }
        aabb
    }

    /// The six face half-spaces, inside where the signed distance is
    /// non-positive. Axis-aligned boxes emit their face planes with exact
    /// unit normals instead of the rotated axes.
    pub fn face_planes(&self) -> Vec<Plane> {
        if self.is_axis_aligned() {
            let aabb = self.to_aabb();
            return vec![
                Plane::new(-1.0, 0.0, 0.0, aabb.min().x),
                Plane::new(1.0, 0.0, 0.0, -aabb.max().x),
                Plane::new(0.0, -1.0, 0.0, aabb.min().y),
                Plane::new(0.0, 1.0, 0.0, -aabb.max().y),
                Plane::new(0.0, 0.0, -1.0, aabb.min().z),
                Plane::new(0.0, 0.0, 1.0, -aabb.max().z),
            ];
        }
        let mut planes = Vec::with_capacity(6);
        for (axis, half) in self.axes.iter().zip(&[
            self.half_extent.x,
            self.half_extent.y,
            self.half_extent.z,
        ]) {
            for &sign in &[1.0, -1.0] {
                let normal = axis * sign;
                let on_face = self.center + normal * *half;
                planes.push(Plane::new(
                    normal.x,
                    normal.y,
                    normal.z,
                    -normal.dot(&on_face.coords),
                ));
            }
        }
        planes
    }

    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        let offset = p - self.center;
        self.axes[0].dot(&offset).abs() <= self.half_extent.x + EPSILON
            && self.axes[1].dot(&offset).abs() <= self.half_extent.y + EPSILON
            && self.axes[2].dot(&offset).abs() <= self.half_extent.z + EPSILON
    }
}

impl PointCulling for Obb {
    fn contains(&self, p: &Point3<f64>) -> bool {
        self.contains_point(p)
    }
}

impl ConvexPolyhedron for Obb {
    fn compute_corners(&self) -> ArrayVec<[Point3<f64>; 8]> {
        self.corners()
    }

    fn compute_edges(&self) -> ArrayVec<[Vector3<f64>; 6]> {
        let mut edges = ArrayVec::new();
        edges.push(self.axes[0]);
        edges.push(self.axes[1]);
        edges.push(self.axes[2]);
        edges
    }

    fn compute_face_normals(&self) -> ArrayVec<[Vector3<f64>; 6]> {
        self.compute_edges()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_axes() -> [Vector3<f64>; 3] {
        [Vector3::x(), Vector3::y(), Vector3::z()]
    }

    #[test]
    fn test_rejects_negative_octant_corners() {
        let err = Obb::new(
            Point3::new(1.0, 1.0, 1.0),
            unit_axes(),
            Vector3::new(2.0, 1.0, 1.0),
        )
        .unwrap_err();
        match err.kind() {
            ErrorKind::InvalidCoordinate(..) => (),
            other => panic!("expected InvalidCoordinate, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_non_unit_axes() {
        let axes = [Vector3::new(2.0, 0.0, 0.0), Vector3::y(), Vector3::z()];
        assert!(Obb::new(Point3::new(5.0, 5.0, 5.0), axes, Vector3::new(1.0, 1.0, 1.0)).is_err());
    }

    #[test]
    fn test_axis_aligned_planes_match_aabb() {
        let obb = Obb::new(
            Point3::new(5.0, 5.0, 5.0),
            unit_axes(),
            Vector3::new(1.0, 2.0, 3.0),
        )
        .unwrap();
        assert!(obb.is_axis_aligned());
        let planes = obb.face_planes();
        assert_eq!(planes.len(), 6);
        // Inside point is non-positive against every face.
        for plane in &planes {
            assert!(plane.signed_distance(&Point3::new(5.0, 5.0, 5.0)) <= 0.0);
        }
        // A point past the +y face is positive against exactly one.
        let outside = Point3::new(5.0, 7.5, 5.0);
        let positive = planes
            .iter()
            .filter(|p| p.signed_distance(&outside) > 0.0)
            .count();
        assert_eq!(positive, 1);
    }

    #[test]
    fn test_rotated_contains() {
        let inv_sqrt2 = 1.0 / 2.0f64.sqrt();
        let axes = [
            Vector3::new(inv_sqrt2, inv_sqrt2, 0.0),
            Vector3::new(-inv_sqrt2, inv_sqrt2, 0.0),
            Vector3::z(),
        ];
        let obb = Obb::new(Point3::new(5.0, 5.0, 5.0), axes, Vector3::new(1.0, 1.0, 1.0)).unwrap();
        assert!(!obb.is_axis_aligned());
        assert!(obb.contains_point(&Point3::new(5.0, 5.0, 5.0)));
        // Along the rotated first axis the box reaches out one unit.
        assert!(obb.contains_point(&Point3::new(5.0 + inv_sqrt2, 5.0 + inv_sqrt2, 5.0)));
        // Along world x its support is sqrt(2), so 1.5 units out is too far.
        assert!(!obb.contains_point(&Point3::new(6.5, 5.0, 5.0)));
    }
}
