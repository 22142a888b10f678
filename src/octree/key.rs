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

//! Space-filling-curve addressing of grid cells.
//!
//! A key names one cell of the hierarchical grid: a refinement level and
//! the Morton interleave of the cell's integer coordinates at that level.
//! One octal digit of the code is one step down the tree, so `parent` and
//! `child` are three-bit shifts. Keys are scale-free; [`Grid`] carries the
//! world scale and converts between positions and cells.

use crate::errors::*;
use crate::geometry::Cube;
use nalgebra::Point3;
use std::fmt;
use std::result;

/// The hard bound on refinement: grid coordinates use 21 bits per axis so
/// the interleaved code fits 63 bits.
pub const MAX_LEVEL: u8 = 21;

/// Represents a child of a grid cell.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ChildIndex(u8);

impl ChildIndex {
    pub fn from_u8(index: u8) -> Self {
        assert!(index < 8);
        ChildIndex(index)
    }

    /// Returns the index of the child octant of `cube` containing `p`.
    pub fn from_cell_point(cube: &Cube, p: &Point3<f64>) -> ChildIndex {
        // Due to floating point precision the chosen child box is not
        // guaranteed to contain p when p sits exactly on the split plane;
        // both choices address a cell whose closed boundary holds it.
        let center = cube.center();
        let gt_x = p.x > center.x;
        let gt_y = p.y > center.y;
        let gt_z = p.z > center.z;
        ChildIndex((gt_x as u8) << 2 | (gt_y as u8) << 1 | gt_z as u8)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

/// A unique identifier of a grid cell. Displayed as 'r' for the root and
/// r[0-7]+ for deeper cells, one octal digit per level.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeKey {
    // The root is level = 0, its children 1 and so on. Ordering is derived,
    // so keys sort by level first and code within one level.
    level: u8,
    // The Morton interleave of the cell coordinates at `level`. Multiple
    // cells share a code across levels, but not within one.
    code: u64,
}

impl fmt::Display for NodeKey {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        if self.level == 0 {
            "r".fmt(formatter)
        } else {
            write!(
                formatter,
                "r{code:0width$o}",
                code = self.code,
                width = self.level as usize
            )
        }
    }
}

impl NodeKey {
    /// Returns the root cell covering the whole grid.
    pub fn root() -> Self {
        NodeKey { level: 0, code: 0 }
    }

    /// Construct a NodeKey from its display form. No checking is done if
    /// this is a valid key.
    pub fn from_str(name: &str) -> Self {
        let level = (name.len() - 1) as u8;
        let code = if level > 0 {
            u64::from_str_radix(&name[1..], 8).unwrap()
        } else {
            0
        };
        NodeKey { level, code }
    }

    pub fn from_level_code(level: u8, code: u64) -> Self {
        debug_assert!(level <= MAX_LEVEL);
        debug_assert!(level == MAX_LEVEL || code < 1 << (3 * level));
        NodeKey { level, code }
    }

    /// The interleave of the cell coordinates, in (x, y, z) order with x
    /// occupying the top bit of each triple.
    pub fn from_cell(x: u32, y: u32, z: u32, level: u8) -> Self {
        debug_assert!(level <= MAX_LEVEL);
        let code = spread_by_3(u64::from(x)) << 2
            | spread_by_3(u64::from(y)) << 1
            | spread_by_3(u64::from(z));
        NodeKey { level, code }
    }

    /// Exact inverse of `from_cell`.
    pub fn cell(&self) -> (u32, u32, u32) {
        (
            compact_by_3(self.code >> 2) as u32,
            compact_by_3(self.code >> 1) as u32,
            compact_by_3(self.code) as u32,
        )
    }

    pub fn code(&self) -> u64 {
        self.code
    }

    /// Returns the level of this cell in the grid, with 0 being the root.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Returns the parent's key or None if this is the root.
    pub fn parent(&self) -> Option<NodeKey> {
        if self.level == 0 {
            return None;
        }
        Some(NodeKey {
            level: self.level - 1,
            code: self.code >> 3,
        })
    }

    /// Returns the key of the corresponding child cell.
    #[inline]
    pub fn child(&self, child_index: ChildIndex) -> NodeKey {
        debug_assert!(self.level < MAX_LEVEL);
        NodeKey {
            level: self.level + 1,
            code: (self.code << 3) + u64::from(child_index.0),
        }
    }

    /// The child index of this cell in its parent.
    pub fn child_index(&self) -> Option<ChildIndex> {
        if self.level == 0 {
            return None;
        }
        Some(ChildIndex(self.code as u8 & 7))
    }
}

/// The world scale of the hierarchical grid.
///
/// `max_level` is the finest refinement the index will use; cells at that
/// level have edge length 1, and every coarser level doubles it. The grid
/// covers the positive octant only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    max_level: u8,
}

impl Grid {
    pub fn new(max_level: u8) -> Result<Self> {
        if max_level > MAX_LEVEL {
            return Err(ErrorKind::InvalidConfiguration(format!(
                "max_level {} exceeds the codec bound of {}",
                max_level, MAX_LEVEL
            ))
            .into());
        }
        Ok(Grid { max_level })
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// The world-space edge length of cells at `level`.
    pub fn length_at_level(&self, level: u8) -> f64 {
        debug_assert!(level <= self.max_level);
        (1u64 << (self.max_level - level)) as f64
    }

    /// The integer grid coordinates of `position` at `level`.
    ///
    /// Fails with `InvalidCoordinate` on a negative component; coordinates
    /// beyond the grid saturate to its last cell per axis.
    pub fn cell_of(&self, position: &Point3<f64>, level: u8) -> Result<(u32, u32, u32)> {
        if position.x < 0.0 || position.y < 0.0 || position.z < 0.0 {
            return Err(ErrorKind::InvalidCoordinate(position.x, position.y, position.z).into());
        }
        let step = self.length_at_level(level);
        let last_cell = if level == 0 { 0 } else { (1u64 << level) - 1 };
        let cell = |c: f64| ((c / step) as u64).min(last_cell) as u32;
        Ok((cell(position.x), cell(position.y), cell(position.z)))
    }

    /// The key of the cell at `level` containing `position`.
    pub fn key_at(&self, position: &Point3<f64>, level: u8) -> Result<NodeKey> {
        let (x, y, z) = self.cell_of(position, level)?;
        Ok(NodeKey::from_cell(x, y, z, level))
    }

    /// Computes the world-space bounding cube of `key`'s cell.
    pub fn bounding_cube(&self, key: &NodeKey) -> Cube {
        let step = self.length_at_level(key.level());
        let (x, y, z) = key.cell();
        Cube::new(
            Point3::new(
                f64::from(x) * step,
                f64::from(y) * step,
                f64::from(z) * step,
            ),
            step,
        )
    }
}

// Bit tricks for the 21-bit Morton interleave: `spread` moves bit i of the
// input to bit 3i, `compact` is its inverse.

fn spread_by_3(v: u64) -> u64 {
    let mut x = v & 0x1f_ffff;
    x = (x | x << 32) & 0x001f_0000_0000_ffff;
    x = (x | x << 16) & 0x001f_0000_ff00_00ff;
    x = (x | x << 8) & 0x100f_00f0_0f00_f00f;
    x = (x | x << 4) & 0x10c3_0c30_c30c_30c3;
    x = (x | x << 2) & 0x1249_2492_4924_9249;
    x
}

fn compact_by_3(x: u64) -> u64 {
    let mut v = x & 0x1249_2492_4924_9249;
    v = (v ^ (v >> 2)) & 0x10c3_0c30_c30c_30c3;
    v = (v ^ (v >> 4)) & 0x100f_00f0_0f00_f00f;
    v = (v ^ (v >> 8)) & 0x001f_0000_ff00_00ff;
    v = (v ^ (v >> 16)) & 0x001f_0000_0000_ffff;
    v = (v ^ (v >> 32)) & 0x001f_ffff;
    v
}
