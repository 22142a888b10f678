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

//! A convex hull as an intersection of closed half-spaces.

use crate::errors::*;
use crate::geometry::{Aabb, Obb, Plane};
use crate::math::{PointCulling, Relation, EPSILON};
use nalgebra::Point3;
use serde_derive::{Deserialize, Serialize};

/// Safety margin added to the cached bounding radius.
const BOUNDING_RADIUS_SLACK: f64 = 1e-3;

/// An intersection of closed half-spaces: a point is inside when its signed
/// distance against every plane is non-positive.
///
/// The plane list is fixed at construction. The centroid (the average of
/// the plane foot-points, clamped to the positive octant) and a bounding
/// radius are cached alongside it; both are descriptive metadata for
/// distance ordering, not exact hull geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvexHull {
    planes: Vec<Plane>,
    centroid: Point3<f64>,
    bounding_radius: f64,
}

impl ConvexHull {
    /// A hull needs at least four half-spaces to be bounded.
    pub fn from_planes(planes: Vec<Plane>) -> Result<Self> {
        if planes.len() < 4 {
            return Err(ErrorKind::InvalidConfiguration(format!(
                "a convex hull needs at least 4 bounding planes, got {}",
                planes.len()
            ))
            .into());
        }
        let mut centroid = Point3::origin();
        for plane in &planes {
            centroid += plane.foot_point().coords;
        }
        centroid /= planes.len() as f64;
        centroid = Point3::new(
            centroid.x.max(0.0),
            centroid.y.max(0.0),
            centroid.z.max(0.0),
        );
        let bounding_radius = planes
            .iter()
            .map(|p| p.signed_distance(&centroid).abs())
            .fold(0.0, f64::max)
            + BOUNDING_RADIUS_SLACK;
        Ok(ConvexHull {
            planes,
            centroid,
            bounding_radius,
        })
    }

    /// The six face half-spaces of an axis-aligned box.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        let planes = vec![
            Plane::new(-1.0, 0.0, 0.0, aabb.min().x),
            Plane::new(1.0, 0.0, 0.0, -aabb.max().x),
            Plane::new(0.0, -1.0, 0.0, aabb.min().y),
            Plane::new(0.0, 1.0, 0.0, -aabb.max().y),
            Plane::new(0.0, 0.0, -1.0, aabb.min().z),
            Plane::new(0.0, 0.0, 1.0, -aabb.max().z),
        ];
        // Six planes always pass the arity check.
        ConvexHull::from_planes(planes).expect("box hull construction cannot fail")
    }

    pub fn from_obb(obb: &Obb) -> Self {
        ConvexHull::from_planes(obb.face_planes()).expect("box hull construction cannot fail")
    }

    /// The axis-aligned hull of a vertex set.
    ///
    /// This is deliberately named like `Cube::bounding`: it is the box
    /// around the vertices, not their exact convex hull. Callers that need
    /// the exact hull get `HullFromVerticesNotSupported` from
    /// [`from_vertices`](#method.from_vertices) instead of a silently
    /// degraded result.
    pub fn bounding(vertices: &[Point3<f64>]) -> Result<Self> {
        if vertices.len() < 4 {
            return Err(ErrorKind::InvalidConfiguration(format!(
                "a convex hull needs at least 4 vertices, got {}",
                vertices.len()
            ))
            .into());
        }
        let aabb = Aabb::bounding(vertices).expect("vertex list checked non-empty");
        Ok(ConvexHull::from_aabb(&aabb))
    }

    /// Exact hull construction is not implemented; fails with
    /// `HullFromVerticesNotSupported` (after the arity check) so the
    /// degradation in [`bounding`](#method.bounding) stays opt-in.
    pub fn from_vertices(vertices: &[Point3<f64>]) -> Result<Self> {
        if vertices.len() < 4 {
            return Err(ErrorKind::InvalidConfiguration(format!(
                "a convex hull needs at least 4 vertices, got {}",
                vertices.len()
            ))
            .into());
        }
        Err(ErrorKind::HullFromVerticesNotSupported.into())
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn centroid(&self) -> &Point3<f64> {
        &self.centroid
    }

    pub fn bounding_radius(&self) -> f64 {
        self.bounding_radius
    }

    /// The largest signed distance over all half-spaces: non-positive
    /// inside the hull, positive outside.
    pub fn distance_to_point(&self, p: &Point3<f64>) -> f64 {
        self.planes
            .iter()
            .map(|plane| plane.signed_distance(p))
            .fold(f64::MIN, f64::max)
    }

    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        self.distance_to_point(p) <= EPSILON
    }

    pub fn strictly_contains_point(&self, p: &Point3<f64>) -> bool {
        self.distance_to_point(p) < -EPSILON
    }

    /// How deep `p` sits inside the hull; zero on or outside the surface.
    pub fn penetration_of_point(&self, p: &Point3<f64>) -> f64 {
        (-self.distance_to_point(p)).max(0.0)
    }

    /// The deepest corner of the box that is inside the hull; zero when no
    /// corner is.
    pub fn penetration_of_aabb(&self, aabb: &Aabb) -> f64 {
        aabb.corners()
            .iter()
            .map(|corner| self.distance_to_point(corner))
            .filter(|d| *d < 0.0)
            .map(f64::abs)
            .fold(0.0, f64::max)
    }

    /// Classifies the box: all eight corners inside means `In`; no corner
    /// inside means `Out` unless a half-space plane straddles the box (the
    /// box may still overlap or enclose the hull); a corner split means
    /// `Cross`.
    pub fn relation_to_aabb(&self, aabb: &Aabb) -> Relation {
        let corners = aabb.corners();
        let inside = corners
            .iter()
            .filter(|corner| self.contains_point(corner))
            .count();
        if inside == corners.len() {
            return Relation::In;
        }
        if inside == 0 {
            let straddles = self
                .planes
                .iter()
                .any(|plane| plane.relation_to_aabb(aabb) == Relation::Cross);
            return if straddles {
                Relation::Cross
            } else {
                Relation::Out
            };
        }
        Relation::Cross
    }

    pub fn relation_to_point(&self, p: &Point3<f64>) -> Relation {
        let d = self.distance_to_point(p);
        if d > EPSILON {
            Relation::Out
        } else if d < -EPSILON {
            Relation::In
        } else {
            Relation::Cross
        }
    }
}

impl PointCulling for ConvexHull {
    fn contains(&self, p: &Point3<f64>) -> bool {
        self.contains_point(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn box_hull() -> ConvexHull {
        ConvexHull::from_aabb(&Aabb::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 10.0, 10.0),
        ))
    }

    #[test]
    fn test_point_membership() {
        let hull = box_hull();
        assert!(hull.contains_point(&Point3::new(5.0, 5.0, 5.0)));
        assert!(!hull.contains_point(&Point3::new(11.0, 5.0, 5.0)));
    }

    #[test]
    fn test_signed_distance_values() {
        let hull = box_hull();
        assert_relative_eq!(hull.distance_to_point(&Point3::new(5.0, 5.0, 5.0)), -5.0);
        assert_relative_eq!(hull.distance_to_point(&Point3::new(11.0, 5.0, 5.0)), 1.0);
    }

    #[test]
    fn test_penetration() {
        let hull = box_hull();
        assert_relative_eq!(hull.penetration_of_point(&Point3::new(5.0, 5.0, 5.0)), 5.0);
        assert_relative_eq!(hull.penetration_of_point(&Point3::new(11.0, 5.0, 5.0)), 0.0);
        // The deepest corner of [8,9]^3 is (8,8,8), two units from the
        // nearest face.
        let aabb = Aabb::new(Point3::new(8.0, 8.0, 8.0), Point3::new(9.0, 9.0, 9.0));
        assert_relative_eq!(hull.penetration_of_aabb(&aabb), 2.0);
    }

    #[test]
    fn test_relation_to_aabb() {
        let hull = box_hull();
        let inside = Aabb::new(Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0));
        let crossing = Aabb::new(Point3::new(9.0, 9.0, 9.0), Point3::new(12.0, 12.0, 12.0));
        let outside = Aabb::new(Point3::new(20.0, 20.0, 20.0), Point3::new(21.0, 21.0, 21.0));
        // A box around the whole hull has no corner inside it but overlaps.
        let enclosing = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(50.0, 50.0, 50.0));
        assert_eq!(hull.relation_to_aabb(&inside), Relation::In);
        assert_eq!(hull.relation_to_aabb(&crossing), Relation::Cross);
        assert_eq!(hull.relation_to_aabb(&outside), Relation::Out);
        assert_eq!(hull.relation_to_aabb(&enclosing), Relation::Cross);
    }

    #[test]
    fn test_too_few_planes() {
        let planes = vec![
            Plane::new(1.0, 0.0, 0.0, 0.0),
            Plane::new(0.0, 1.0, 0.0, 0.0),
            Plane::new(0.0, 0.0, 1.0, 0.0),
        ];
        assert!(ConvexHull::from_planes(planes).is_err());
    }

    #[test]
    fn test_from_vertices_is_explicit_about_fallback() {
        let vertices = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
            Point3::new(0.0, 0.0, 4.0),
        ];
        let err = ConvexHull::from_vertices(&vertices).unwrap_err();
        match err.kind() {
            ErrorKind::HullFromVerticesNotSupported => (),
            other => panic!("expected HullFromVerticesNotSupported, got {:?}", other),
        }
        // The named fallback constructor does work and is the vertex AABB.
        let hull = ConvexHull::bounding(&vertices).unwrap();
        assert!(hull.contains_point(&Point3::new(3.9, 3.9, 3.9)));
        assert!(!hull.contains_point(&Point3::new(4.1, 0.0, 0.0)));
    }

    #[test]
    fn test_too_few_vertices() {
        let vertices = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)];
        assert!(ConvexHull::bounding(&vertices).is_err());
        assert!(ConvexHull::from_vertices(&vertices).is_err());
    }

    #[test]
    fn test_centroid_clamped_to_positive_octant() {
        // Plane feet average can dip below zero for hulls hugging the
        // origin; the cached centroid must not.
        let hull = ConvexHull::from_aabb(&Aabb::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        ));
        let c = hull.centroid();
        assert!(c.x >= 0.0 && c.y >= 0.0 && c.z >= 0.0);
        assert!(hull.bounding_radius() > 0.0);
    }
}
