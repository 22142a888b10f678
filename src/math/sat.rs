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

//! Intersection checking by means of the separating axis theorem (SAT).
//!
//! Often, you want to do multiple intersection tests of the same object
//! against many other objects. To not recompute the same things – namely
//! corners, edges and face normals – each time, the
//! [`Intersector`](struct.Intersector.html) struct can be reused between
//! intersection tests in these cases. If the edges and face normals of the
//! other objects do not change between tests (as with axis-aligned boxes),
//! create a [`CachedAxesIntersector`](struct.CachedAxesIntersector.html)
//! and reuse that instead.

use crate::math::{Relation, EPSILON};
use arrayvec::ArrayVec;
use nalgebra::{Point3, Vector3};

/// A convex polyhedron that can take part in separating-axis tests.
///
/// The possible separating axes between two convex polyhedra are the face
/// normals of either polyhedron and the cross products between all edge
/// combinations of the two. Together with the corners, these are the
/// sufficient statistics for the SAT test, so corners, edges and face
/// normals must be provided by implementors.
///
/// Capacities are fixed at 8 corners and 6 edges/face normals; boxes and
/// frusta fill them, the tetrahedron uses fewer. Arrays are cheaper than
/// allocating a vector per test.
pub trait ConvexPolyhedron {
    fn compute_corners(&self) -> ArrayVec<[Point3<f64>; 8]>;
    /// Edge direction vectors, unique up to sign.
    fn compute_edges(&self) -> ArrayVec<[Vector3<f64>; 6]>;
    /// Face normals, unique up to sign.
    fn compute_face_normals(&self) -> ArrayVec<[Vector3<f64>; 6]>;

    fn intersector(&self) -> Intersector {
        Intersector {
            corners: self.compute_corners(),
            edges: self.compute_edges(),
            face_normals: self.compute_face_normals(),
        }
    }
}

/// When one object is intersection tested against many others, compute this
/// once and reuse it.
#[derive(Debug, Clone)]
pub struct Intersector {
    pub corners: ArrayVec<[Point3<f64>; 8]>,
    pub edges: ArrayVec<[Vector3<f64>; 6]>,
    pub face_normals: ArrayVec<[Vector3<f64>; 6]>,
}

impl Intersector {
    fn separating_axes_iter<'a>(
        &'a self,
        other_edges: &'a [Vector3<f64>],
        other_face_normals: &'a [Vector3<f64>],
    ) -> impl Iterator<Item = Vector3<f64>> + 'a {
        let self_normals = self.face_normals.iter().cloned();
        let other_normals = other_face_normals.iter().cloned();
        let cross_products = self
            .edges
            .iter()
            .flat_map(move |e1| other_edges.iter().map(move |e2| (e1, e2)))
            .filter_map(|(e1, e2)| {
                // Parallel edge pairs contribute a null axis; skip them.
                let cross = e1.cross(e2);
                if cross.norm() > EPSILON {
                    Some(cross.normalize())
                } else {
                    None
                }
            });
        self_normals.chain(other_normals).chain(cross_products)
    }

    /// If the edges and normals of the other objects do not change,
    /// precompute the separating axes with this function. It is essentially
    /// a partial application of [`intersect`](#method.intersect), leaving
    /// only the corners to be supplied.
    pub fn cache_separating_axes(
        self,
        other_edges: &[Vector3<f64>],
        other_face_normals: &[Vector3<f64>],
    ) -> CachedAxesIntersector {
        let axes: Vec<_> = self
            .separating_axes_iter(other_edges, other_face_normals)
            .collect();
        CachedAxesIntersector {
            axes,
            corners: self.corners,
        }
    }

    /// Like [`cache_separating_axes`](#method.cache_separating_axes) for the
    /// common case of testing against axis-aligned boxes, whose edges and
    /// face normals are both the unit axes.
    pub fn cache_separating_axes_for_aabb(self) -> CachedAxesIntersector {
        let unit_axes = [Vector3::x(), Vector3::y(), Vector3::z()];
        self.cache_separating_axes(&unit_axes, &unit_axes)
    }

    pub fn intersect(&self, other: &Intersector) -> Relation {
        sat(
            self.separating_axes_iter(&other.edges, &other.face_normals),
            &self.corners,
            &other.corners,
        )
    }
}

/// The separating axes of one polyhedron against a fixed class of others,
/// precomputed.
#[derive(Debug, Clone)]
pub struct CachedAxesIntersector {
    pub axes: Vec<Vector3<f64>>,
    pub corners: ArrayVec<[Point3<f64>; 8]>,
}

impl CachedAxesIntersector {
    pub fn intersect(&self, corners: &[Point3<f64>]) -> Relation {
        sat(self.axes.iter().cloned(), &self.corners, corners)
    }
}

/// Projects both corner sets onto each candidate axis; a strict gap between
/// the projection intervals on any axis separates the polyhedra.
///
/// Returns `Out` or `Cross` only. Callers that distinguish full containment
/// do so with corner containment checks on top of this.
pub fn sat<I>(separating_axes: I, corners_a: &[Point3<f64>], corners_b: &[Point3<f64>]) -> Relation
where
    I: IntoIterator<Item = Vector3<f64>>,
{
    for sep_axis in separating_axes {
        let mut a_min_proj = f64::MAX;
        let mut a_max_proj = f64::MIN;
        for corner in corners_a {
            let corner_proj = corner.coords.dot(&sep_axis);
            a_min_proj = a_min_proj.min(corner_proj);
            a_max_proj = a_max_proj.max(corner_proj);
        }
        let mut b_min_proj = f64::MAX;
        let mut b_max_proj = f64::MIN;
        for corner in corners_b {
            let corner_proj = corner.coords.dot(&sep_axis);
            b_min_proj = b_min_proj.min(corner_proj);
            b_max_proj = b_max_proj.max(corner_proj);
        }
        if b_min_proj > a_max_proj || b_max_proj < a_min_proj {
            return Relation::Out;
        }
    }
    Relation::Cross
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnitBoxAt {
        min: Point3<f64>,
    }

    impl ConvexPolyhedron for UnitBoxAt {
        fn compute_corners(&self) -> ArrayVec<[Point3<f64>; 8]> {
            let mut corners = ArrayVec::new();
            for &x in &[self.min.x, self.min.x + 1.0] {
                for &y in &[self.min.y, self.min.y + 1.0] {
                    for &z in &[self.min.z, self.min.z + 1.0] {
                        corners.push(Point3::new(x, y, z));
                    }
                }
            }
            corners
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

    #[test]
    fn test_disjoint_boxes_separate() {
        let a = UnitBoxAt {
            min: Point3::new(0.0, 0.0, 0.0),
        };
        let b = UnitBoxAt {
            min: Point3::new(3.0, 0.0, 0.0),
        };
        assert_eq!(a.intersector().intersect(&b.intersector()), Relation::Out);
    }

    #[test]
    fn test_overlapping_boxes_cross() {
        let a = UnitBoxAt {
            min: Point3::new(0.0, 0.0, 0.0),
        };
        let b = UnitBoxAt {
            min: Point3::new(0.5, 0.5, 0.5),
        };
        assert_eq!(a.intersector().intersect(&b.intersector()), Relation::Cross);
    }

    #[test]
    fn test_cached_axes_match_direct_test() {
        let a = UnitBoxAt {
            min: Point3::new(0.0, 0.0, 0.0),
        };
        let cached = a.intersector().cache_separating_axes_for_aabb();
        let near = UnitBoxAt {
            min: Point3::new(0.9, 0.0, 0.0),
        };
        let far = UnitBoxAt {
            min: Point3::new(2.1, 0.0, 0.0),
        };
        assert_eq!(cached.intersect(&near.compute_corners()), Relation::Cross);
        assert_eq!(cached.intersect(&far.compute_corners()), Relation::Out);
    }

    #[test]
    fn test_parallel_edges_do_not_poison_axes() {
        // Axis-aligned boxes share all edge directions; every cross product
        // is null and must be skipped rather than normalized into NaN.
        let a = UnitBoxAt {
            min: Point3::new(0.0, 0.0, 0.0),
        };
        let b = UnitBoxAt {
            min: Point3::new(0.0, 0.0, 5.0),
        };
        assert_eq!(a.intersector().intersect(&b.intersector()), Relation::Out);
    }
}
