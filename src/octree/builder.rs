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

//! Bulk construction of the index from pre-collected entities.
//!
//! All three strategies drive an explicit frame stack instead of
//! recursion: top-down splits overcrowded cells toward the leaves,
//! bottom-up populates leaves first and lifts parents toward the start
//! level, and hybrid meets in the middle at an intermediate bulk level.
//! The stack has a hard ceiling; on overflow the oldest half is drained
//! into direct sequential insertion and the build resumes.

use crate::errors::*;
use crate::octree::{EntityId, NodeKey, Octree, TreeState};
use nalgebra::Point3;
use serde_derive::{Deserialize, Serialize};
use std::ops::Range;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkStrategy {
    TopDown,
    BottomUp,
    Hybrid,
}

/// What a build did: node and entity counters, the deepest level reached,
/// and wall-clock per phase.
#[derive(Debug, Clone)]
pub struct BulkBuildStats {
    pub strategy: BulkStrategy,
    pub nodes_created: usize,
    pub entities_processed: usize,
    pub max_depth_reached: u8,
    pub process_time: Duration,
    pub create_children_time: Duration,
    pub finalize_time: Duration,
    pub total_time: Duration,
    /// Ids that ended up filed in the tree.
    pub inserted: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Process,
    CreateChildren,
    Finalize,
}

#[derive(Debug)]
struct Frame {
    key: NodeKey,
    level: u8,
    range: Range<usize>,
    phase: Phase,
}

/// One prepared item: the id is already in the entity store; the deep code
/// is the Morton interleave at the finest level, from which the cell at
/// any coarser level is a shift.
#[derive(Debug, Clone)]
struct BuildRecord {
    id: EntityId,
    deep_code: u64,
}

/// Drives bulk construction of one octree.
pub struct BulkLoader<'a, C> {
    octree: &'a Octree<C>,
}

impl<'a, C> BulkLoader<'a, C> {
    pub fn new(octree: &'a Octree<C>) -> Self {
        BulkLoader { octree }
    }

    /// Builds the tree from parallel position/content lists, filing at
    /// `start_level` and refining below it as the strategy dictates.
    ///
    /// Preparation validates every position before anything is inserted;
    /// a bad coordinate aborts with nothing filed. Ids handed out by the
    /// build are listed in the returned statistics.
    pub fn build(
        &self,
        positions: Vec<Point3<f64>>,
        contents: Vec<C>,
        start_level: u8,
    ) -> Result<BulkBuildStats> {
        if positions.len() != contents.len() {
            return Err(ErrorKind::InvalidConfiguration(format!(
                "positions and contents must be parallel lists, got {} and {}",
                positions.len(),
                contents.len()
            ))
            .into());
        }
        let options = self.octree.options();
        if start_level > options.max_level {
            return Err(ErrorKind::InvalidConfiguration(format!(
                "start level {} exceeds the configured max_level {}",
                start_level, options.max_level
            ))
            .into());
        }
        let grid = self.octree.grid();
        let max_level = options.max_level;

        // Validate all positions up front so a bad record aborts before
        // any insertion.
        let mut deep_codes = Vec::with_capacity(positions.len());
        for position in &positions {
            deep_codes.push(grid.key_at(position, max_level)?.code());
        }

        let total_start = Instant::now();
        let strategy = options.bulk_strategy;
        let mut stats = BulkBuildStats {
            strategy,
            nodes_created: 0,
            entities_processed: 0,
            max_depth_reached: start_level,
            process_time: Duration::default(),
            create_children_time: Duration::default(),
            finalize_time: Duration::default(),
            total_time: Duration::default(),
            inserted: Vec::with_capacity(positions.len()),
        };

        let mut state = self.octree.write_state();
        let nodes_before = state.nodes.len();

        let mut records = Vec::with_capacity(positions.len());
        for ((position, content), deep_code) in
            positions.into_iter().zip(contents).zip(deep_codes)
        {
            let id = self.octree.next_id();
            state.entities.put(id, content, position, None);
            stats.inserted.push(id);
            records.push(BuildRecord { id, deep_code });
        }
        if options.pre_sort {
            records.sort_by_key(|record| record.deep_code);
        }

        match strategy {
            BulkStrategy::TopDown => {
                self.build_top_down(&mut state, &mut records, start_level, &mut stats)
            }
            BulkStrategy::BottomUp => {
                self.build_bottom_up(&mut state, &mut records, start_level, &mut stats)
            }
            BulkStrategy::Hybrid => {
                self.build_hybrid(&mut state, &mut records, start_level, &mut stats)
            }
        }

        if options.single_content_mode {
            // Eviction may have removed earlier records from the store.
            stats.inserted.retain(|id| state.entities.contains(*id));
        }
        if options.track_inserted_ids {
            let inserted = stats.inserted.clone();
            state.inserted_ids.extend(inserted);
        }
        stats.nodes_created = state.nodes.len() - nodes_before;
        stats.total_time = total_start.elapsed();
        Ok(stats)
    }

    /// The cell code of `record` at `level` is a right shift of its deep
    /// code.
    fn code_at(&self, record: &BuildRecord, level: u8) -> u64 {
        let max_level = self.octree.options().max_level;
        record.deep_code >> (3 * u32::from(max_level - level))
    }

    /// Overflow alone does not split a frame; tiny overflows deep in the
    /// tree are filed as-is. Adaptive subdivision raises the bar further.
    fn split_threshold(&self) -> usize {
        let capacity = self.octree.options().effective_capacity();
        if self.octree.options().adaptive_subdivision {
            capacity * 2
        } else {
            capacity + 1
        }
    }

    /// Files every record of `range` into the node at `key`.
    fn file_range(
        &self,
        state: &mut TreeState<C>,
        records: &[BuildRecord],
        range: Range<usize>,
        key: NodeKey,
        stats: &mut BulkBuildStats,
    ) {
        let options = self.octree.options();
        let capacity = options.effective_capacity();
        for record in &records[range] {
            if options.single_content_mode {
                state.evict_residents(&key);
            }
            state.file_at(record.id, key, capacity);
            stats.entities_processed += 1;
        }
        stats.max_depth_reached = stats.max_depth_reached.max(key.level());
    }

    /// Sorts `range` by the child cell and returns the contiguous child
    /// groups.
    fn child_groups(
        &self,
        records: &mut [BuildRecord],
        range: Range<usize>,
        child_level: u8,
    ) -> Vec<(NodeKey, Range<usize>)> {
        records[range.clone()].sort_by_key(|record| self.code_at(record, child_level));
        let mut groups = Vec::new();
        let mut begin = range.start;
        while begin < range.end {
            let code = self.code_at(&records[begin], child_level);
            let mut end = begin + 1;
            while end < range.end && self.code_at(&records[end], child_level) == code {
                end += 1;
            }
            groups.push((NodeKey::from_level_code(child_level, code), begin..end));
            begin = end;
        }
        groups
    }

    /// Groups the full record list at `level`; records must be sorted by
    /// deep code for the runs to be contiguous.
    fn groups_at(
        &self,
        records: &mut [BuildRecord],
        level: u8,
    ) -> Vec<(NodeKey, Range<usize>)> {
        let len = records.len();
        self.child_groups(records, 0..len, level)
    }

    /// Creates the ancestor chain of `key` up to `top_level`, flagging
    /// every ancestor as subdivided.
    fn lift_to(&self, state: &mut TreeState<C>, key: NodeKey, top_level: u8) {
        let mut current = key;
        while current.level() > top_level {
            let parent = match current.parent() {
                Some(parent) => parent,
                None => break,
            };
            let node = state.nodes.get_or_insert(parent);
            if node.has_children() {
                // The rest of the chain is already lifted.
                break;
            }
            node.set_has_children(true);
            current = parent;
        }
    }

    fn build_top_down(
        &self,
        state: &mut TreeState<C>,
        records: &mut Vec<BuildRecord>,
        start_level: u8,
        stats: &mut BulkBuildStats,
    ) {
        let mut stack: Vec<Frame> = Vec::new();
        for (key, range) in self.groups_at(records, start_level).into_iter().rev() {
            stack.push(Frame {
                key,
                level: start_level,
                range,
                phase: Phase::Process,
            });
        }
        self.drive_stack(state, records, &mut stack, stats);
    }

    /// Runs frames until the stack drains, spilling the oldest half into
    /// direct insertion whenever the depth ceiling is hit.
    fn drive_stack(
        &self,
        state: &mut TreeState<C>,
        records: &mut Vec<BuildRecord>,
        stack: &mut Vec<Frame>,
        stats: &mut BulkBuildStats,
    ) {
        let options = self.octree.options();
        let capacity = options.effective_capacity();
        let threshold = self.split_threshold();
        let max_level = options.max_level;
        let max_stack_depth = options.max_stack_depth;

        while let Some(frame) = stack.pop() {
            if stack.len() > max_stack_depth {
                let drained: Vec<Frame> = stack.drain(..stack.len() / 2).collect();
                let phase_start = Instant::now();
                for spilled in drained {
                    match spilled.phase {
                        // Unprocessed records are filed where they stand.
                        Phase::Process | Phase::CreateChildren => {
                            self.file_range(state, records, spilled.range, spilled.key, stats);
                        }
                        // A finalize frame's records already went to its
                        // children; only the flag is still owed.
                        Phase::Finalize => {
                            state.nodes.get_or_insert(spilled.key).set_has_children(true);
                        }
                    }
                }
                stats.process_time += phase_start.elapsed();
            }
            match frame.phase {
                Phase::Process => {
                    let phase_start = Instant::now();
                    let len = frame.range.len();
                    let splittable = len > capacity
                        && frame.level < max_level
                        && len >= threshold
                        && !options.single_content_mode;
                    if splittable {
                        stack.push(Frame {
                            phase: Phase::CreateChildren,
                            ..frame
                        });
                    } else {
                        self.file_range(state, records, frame.range, frame.key, stats);
                    }
                    stats.process_time += phase_start.elapsed();
                }
                Phase::CreateChildren => {
                    let phase_start = Instant::now();
                    let child_level = frame.level + 1;
                    let groups = self.child_groups(records, frame.range.clone(), child_level);
                    for (key, range) in groups.into_iter().rev() {
                        stack.push(Frame {
                            key,
                            level: child_level,
                            range,
                            phase: Phase::Process,
                        });
                    }
                    stack.push(Frame {
                        phase: Phase::Finalize,
                        ..frame
                    });
                    stats.create_children_time += phase_start.elapsed();
                }
                Phase::Finalize => {
                    let phase_start = Instant::now();
                    state.nodes.get_or_insert(frame.key).set_has_children(true);
                    stats.finalize_time += phase_start.elapsed();
                }
            }
        }
    }

    /// The level at which cells are expected to hold about `capacity`
    /// records each.
    fn fixed_leaf_level(&self, record_count: usize, start_level: u8) -> u8 {
        let capacity = self.octree.options().effective_capacity();
        let max_level = self.octree.options().max_level;
        let mut level = start_level;
        let mut cells: usize = 1;
        while level < max_level && cells.saturating_mul(capacity) < record_count {
            cells = cells.saturating_mul(8);
            level += 1;
        }
        level
    }

    fn build_bottom_up(
        &self,
        state: &mut TreeState<C>,
        records: &mut Vec<BuildRecord>,
        start_level: u8,
        stats: &mut BulkBuildStats,
    ) {
        // Grouping by shifted deep codes requires the full sort even when
        // pre_sort was disabled.
        records.sort_by_key(|record| record.deep_code);
        let leaf_level = self.fixed_leaf_level(records.len(), start_level);
        let adaptive = self.octree.options().adaptive_subdivision;
        let capacity = self.octree.options().effective_capacity();
        let max_level = self.octree.options().max_level;

        let phase_start = Instant::now();
        let mut groups = self.groups_at(records, leaf_level);
        if adaptive {
            // Overcrowded cells descend further; runs stay contiguous
            // because the records are sorted by deep code.
            let mut refined = Vec::with_capacity(groups.len());
            while let Some((key, range)) = groups.pop() {
                if range.len() > capacity && key.level() < max_level {
                    let deeper = self.child_groups(records, range, key.level() + 1);
                    groups.extend(deeper);
                } else {
                    refined.push((key, range));
                }
            }
            groups = refined;
        }
        stats.create_children_time += phase_start.elapsed();

        let phase_start = Instant::now();
        let mut leaf_keys = Vec::with_capacity(groups.len());
        for (key, range) in groups {
            self.file_range(state, records, range, key, stats);
            leaf_keys.push(key);
        }
        stats.process_time += phase_start.elapsed();

        // Lift: every present child gets its ancestor chain up to the
        // start level, flagged as subdivided.
        let phase_start = Instant::now();
        for key in leaf_keys {
            self.lift_to(state, key, start_level);
        }
        stats.finalize_time += phase_start.elapsed();
    }

    fn build_hybrid(
        &self,
        state: &mut TreeState<C>,
        records: &mut Vec<BuildRecord>,
        start_level: u8,
        stats: &mut BulkBuildStats,
    ) {
        records.sort_by_key(|record| record.deep_code);
        let leaf_level = self.fixed_leaf_level(records.len(), start_level);
        let bulk_level = start_level + (leaf_level - start_level) / 2;
        let capacity = self.octree.options().effective_capacity();

        let phase_start = Instant::now();
        let groups = self.groups_at(records, bulk_level);
        stats.create_children_time += phase_start.elapsed();

        let mut stack: Vec<Frame> = Vec::new();
        let mut bulk_keys = Vec::with_capacity(groups.len());
        for (key, range) in groups.into_iter().rev() {
            bulk_keys.push(key);
            if range.len() <= capacity {
                let phase_start = Instant::now();
                self.file_range(state, records, range, key, stats);
                stats.process_time += phase_start.elapsed();
            } else {
                stack.push(Frame {
                    key,
                    level: bulk_level,
                    range,
                    phase: Phase::Process,
                });
            }
        }
        self.drive_stack(state, records, &mut stack, stats);

        let phase_start = Instant::now();
        for key in bulk_keys {
            self.lift_to(state, key, start_level);
        }
        stats.finalize_time += phase_start.elapsed();
    }
}
