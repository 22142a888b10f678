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
use crate::math::{sat, ConvexPolyhedron, PointCulling, Relation, EPSILON};
use arrayvec::ArrayVec;
use nalgebra::{Point3, Vector3};
use serde_derive::{Deserialize, Serialize};

/// A tetrahedral cell given by its four vertices.
///
/// The four face half-spaces are derived at construction and oriented so
/// that the interior is where every signed distance is non-positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tetrahedron {
    vertices: [Point3<f64>; 4],
    faces: [Plane; 4],
}

impl Tetrahedron {
    pub fn new(vertices: [Point3<f64>; 4]) -> Result<Self> {
        // Each face is spanned by three vertices and oriented away from the
        // fourth. A coplanar vertex set degenerates one of the faces.
        let faces = [
            Self::face(&vertices, 1, 2, 3, 0)?,
            Self::face(&vertices, 0, 2, 3, 1)?,
            Self::face(&vertices, 0, 1, 3, 2)?,
            Self::face(&vertices, 0, 1, 2, 3)?,
        ];
        Ok(Tetrahedron { vertices, faces })
    }

    fn face(
        vertices: &[Point3<f64>; 4],
        a: usize,
        b: usize,
        c: usize,
        opposite: usize,
    ) -> Result<Plane> {
        let plane = Plane::from_points(&vertices[a], &vertices[b], &vertices[c])
            .chain_err(|| "tetrahedron vertices are coplanar")?;
        if plane.signed_distance(&vertices[opposite]) > 0.0 {
            // Flip so the interior is the non-positive side.
            let n = plane.normal();
            Ok(Plane::new(-n.x, -n.y, -n.z, -plane.offset()))
        } else {
            Ok(plane)
        }
    }

    pub fn vertices(&self) -> &[Point3<f64>; 4] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Plane; 4] {
        &self.faces
    }

    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        self.faces
            .iter()
            .all(|face| face.signed_distance(p) <= EPSILON)
    }

    pub fn to_aabb(&self) -> Aabb {
        Aabb::bounding(&self.vertices).expect("four vertices are never empty")
    }

    /// Classifies the box against this cell. `In` when every box corner is
    /// inside the cell, `Contains` when the box encloses all four vertices,
    /// `Out` on a separating axis, `Cross` otherwise.
    pub fn relation_to_aabb(&self, aabb: &Aabb) -> Relation {
        let box_corners = aabb.corners();
        if box_corners.iter().all(|c| self.contains_point(c)) {
            return Relation::In;
        }
        if self.vertices.iter().all(|v| aabb.contains_point(v)) {
            return Relation::Contains;
        }
        let tetra = self.intersector();
        let box_poly = aabb.intersector();
        match sat(
            tetra
                .face_normals
                .iter()
                .cloned()
                .chain(box_poly.face_normals.iter().cloned())
                .chain(tetra.edges.iter().flat_map(|e1| {
                    box_poly.edges.iter().filter_map(move |e2| {
                        let cross = e1.cross(e2);
                        if cross.norm() > EPSILON {
                            Some(cross.normalize())
                        } else {
                            None
                        }
                    })
                }))
                .collect::<Vec<_>>(),
            &tetra.corners,
            &box_poly.corners,
        ) {
            Relation::Out => Relation::Out,
            _ => Relation::Cross,
        }
    }
}

impl PointCulling for Tetrahedron {
    fn contains(&self, p: &Point3<f64>) -> bool {
        self.contains_point(p)
    }
}

impl ConvexPolyhedron for Tetrahedron {
    fn compute_corners(&self) -> ArrayVec<[Point3<f64>; 8]> {
        self.vertices.iter().cloned().collect()
    }

    fn compute_edges(&self) -> ArrayVec<[Vector3<f64>; 6]> {
        let v = &self.vertices;
        let mut edges = ArrayVec::new();
        edges.push((v[1] - v[0]).normalize());
        edges.push((v[2] - v[0]).normalize());
        edges.push((v[3] - v[0]).normalize());
        edges.push((v[2] - v[1]).normalize());
        edges.push((v[3] - v[1]).normalize());
        edges.push((v[3] - v[2]).normalize());
        edges
    }

    fn compute_face_normals(&self) -> ArrayVec<[Vector3<f64>; 6]> {
        self.faces.iter().map(|f| *f.normal()).collect()
    }
}
