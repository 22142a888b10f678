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

//! An asymmetric frustum with an arbitrary 3D pose.

use crate::math::{ConvexPolyhedron, PointCulling};
use arrayvec::ArrayVec;
use nalgebra::{Isometry3, Matrix4, Point3, Vector3};
use serde_derive::{Deserialize, Serialize};

/// A perspective projection matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perspective {
    matrix: Matrix4<f64>,
}

impl Perspective {
    pub fn new(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Self {
        assert!(
            left < right,
            "`left` cannot be greater than `right`, found: left: {:?} right: {:?}",
            left,
            right
        );
        assert!(
            bottom < top,
            "`bottom` cannot be greater than `top`, found: bottom: {:?} top: {:?}",
            bottom,
            top
        );
        assert!(
            near > 0.0 && near < far,
            "`near` must be greater than 0 and cannot be greater than `far`, found: near: {:?} far: {:?}",
            near,
            far
        );

        let r0c0 = (2.0 * near) / (right - left);
        let r0c2 = (right + left) / (right - left);

        let r1c1 = (2.0 * near) / (top - bottom);
        let r1c2 = (top + bottom) / (top - bottom);

        let r2c2 = -(far + near) / (far - near);
        let r2c3 = -(2.0 * far * near) / (far - near);

        #[rustfmt::skip]
        let matrix = Matrix4::new(
            r0c0, 0.0,  r0c2,  0.0,
            0.0,  r1c1, r1c2,  0.0,
            0.0,  0.0,  r2c2,  r2c3,
            0.0,  0.0,  -1.0,  0.0,
        );
        Self { matrix }
    }

    pub fn new_fov(fovy: f64, aspect: f64, near: f64, far: f64) -> Self {
        assert!(
            fovy > 0.0 && fovy < std::f64::consts::PI,
            "`fovy` must be a number between 0 and π, found: {:?}",
            fovy
        );
        assert!(
            aspect > 0.0,
            "`aspect` must be a positive number, found: {:?}",
            aspect
        );
        let ymax = near * (0.5 * fovy).tan();
        let xmax = ymax * aspect;

        Self::new(-xmax, xmax, -ymax, ymax, near, far)
    }

    pub fn as_matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> Matrix4<f64> {
        let r0c0 = self.matrix[(0, 0)].recip();
        let r0c3 = self.matrix[(0, 2)] / self.matrix[(0, 0)];

        let r1c1 = self.matrix[(1, 1)].recip();
        let r1c3 = self.matrix[(1, 2)] / self.matrix[(1, 1)];

        let r3c2 = self.matrix[(2, 3)].recip();
        let r3c3 = self.matrix[(2, 2)] / self.matrix[(2, 3)];

        #[rustfmt::skip]
        let matrix = Matrix4::new(
            r0c0, 0.0,  0.0,  r0c3,
            0.0,  r1c1, 0.0,  r1c3,
            0.0,  0.0,  0.0,  -1.0,
            0.0,  0.0,  r3c2, r3c3,
        );
        matrix
    }
}

/// A frustum is defined in eye coordinates, where x points right, y points
/// up, and z points against the viewing direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frustum {
    world_from_clip: Matrix4<f64>,
    clip_from_world: Matrix4<f64>,
}

impl Frustum {
    pub fn new(world_from_eye: Isometry3<f64>, clip_from_eye: Perspective) -> Self {
        let clip_from_world = clip_from_eye.as_matrix() * world_from_eye.inverse().to_homogeneous();
        let world_from_clip = world_from_eye.to_homogeneous() * clip_from_eye.inverse();
        Frustum {
            world_from_clip,
            clip_from_world,
        }
    }

    /// Fails if the matrix is not invertible.
    pub fn from_matrix4(clip_from_world: Matrix4<f64>) -> Option<Self> {
        let world_from_clip = clip_from_world.try_inverse()?;
        Some(Self {
            world_from_clip,
            clip_from_world,
        })
    }
}

impl PointCulling for Frustum {
    fn contains(&self, point: &Point3<f64>) -> bool {
        let p_clip = self.clip_from_world.transform_point(point);
        p_clip.coords.min() > -1.0 && p_clip.coords.max() < 1.0
    }
}

impl ConvexPolyhedron for Frustum {
    #[rustfmt::skip]
    fn compute_corners(&self) -> ArrayVec<[Point3<f64>; 8]> {
        let corner_from = |x, y, z| self.world_from_clip.transform_point(&Point3::new(x, y, z));
        let mut corners = ArrayVec::new();
        corners.push(corner_from(-1.0, -1.0, -1.0));
        corners.push(corner_from(-1.0, -1.0,  1.0));
        corners.push(corner_from(-1.0,  1.0, -1.0));
        corners.push(corner_from(-1.0,  1.0,  1.0));
        corners.push(corner_from( 1.0, -1.0, -1.0));
        corners.push(corner_from( 1.0, -1.0,  1.0));
        corners.push(corner_from( 1.0,  1.0, -1.0));
        corners.push(corner_from( 1.0,  1.0,  1.0));
        corners
    }

    fn compute_edges(&self) -> ArrayVec<[Vector3<f64>; 6]> {
        let corners = self.compute_corners();
        let mut edges = ArrayVec::new();
        edges.push((corners[4] - corners[0]).normalize()); // x
        edges.push((corners[2] - corners[0]).normalize()); // y
        edges.push((corners[1] - corners[0]).normalize()); // z lower left
        edges.push((corners[3] - corners[2]).normalize()); // z upper left
        edges.push((corners[5] - corners[4]).normalize()); // z lower right
        edges.push((corners[7] - corners[6]).normalize()); // z upper right
        edges
    }

    fn compute_face_normals(&self) -> ArrayVec<[Vector3<f64>; 6]> {
        let edges = self.compute_edges();
        let mut face_normals = ArrayVec::new();
        face_normals.push(edges[0].cross(&edges[1]).normalize()); // Front and back sides
        face_normals.push(edges[0].cross(&edges[2]).normalize()); // Lower side
        face_normals.push(edges[0].cross(&edges[3]).normalize()); // Upper side
        face_normals.push(edges[1].cross(&edges[2]).normalize()); // Left side
        face_normals.push(edges[1].cross(&edges[4]).normalize()); // Right side
        face_normals
    }
}
