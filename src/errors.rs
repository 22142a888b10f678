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

use std::io;

error_chain! {
    foreign_links {
        Io(io::Error);
    }

    errors {
        InvalidCoordinate(x: f64, y: f64, z: f64) {
            description("coordinate outside the positive octant")
            display("coordinate ({}, {}, {}) has a negative component; the index \
                     only covers the positive octant", x, y, z)
        }
        InvalidConfiguration(msg: String) {
            description("invalid configuration")
            display("invalid configuration: {}", msg)
        }
        EntityNotFound(id: u64) {
            description("entity not found")
            display("no entity with id {} is present in the index", id)
        }
        DegeneratePlane {
            description("degenerate plane")
            display("the three points are collinear within tolerance and do not \
                     define a plane")
        }
        HullFromVerticesNotSupported {
            description("exact hull construction from vertices is not supported")
            display("constructing an exact convex hull from an arbitrary vertex \
                     set is not supported; use ConvexHull::bounding for the \
                     axis-aligned hull of the vertices")
        }
        Timeout(elapsed_ms: u64) {
            description("query deadline exceeded")
            display("parallel query did not finish within its deadline \
                     ({} ms elapsed)", elapsed_ms)
        }
        WorkerFailure(msg: String) {
            description("worker failed")
            display("a parallel worker failed: {}", msg)
        }
    }
}
