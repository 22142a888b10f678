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

use nalgebra::Point3;
use serde_derive::{Deserialize, Serialize};

/// How a tested volume relates to a query volume.
///
/// The three base variants are mutually exclusive and total. `Contains` is
/// only produced by kernels that distinguish full enclosure of the query
/// volume (currently the tetrahedron vs. AABB test); every other kernel
/// folds that case into `In` or `Cross`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    /// Fully inside the query volume.
    In,
    /// Straddles the query volume's boundary.
    Cross,
    /// Fully outside the query volume.
    Out,
    /// Fully encloses the query volume.
    Contains,
}

impl Relation {
    /// True for every variant that admits at least one shared point.
    pub fn touches(self) -> bool {
        self != Relation::Out
    }
}

pub trait PointCulling: Sync + Send {
    fn contains(&self, point: &Point3<f64>) -> bool;
}
