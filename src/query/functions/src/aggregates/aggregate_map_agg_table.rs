// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use log::info;
use log::warn;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;
use mapagg_common_expression::types::MapColumnBuilder;
use mapagg_common_expression::Column;
use mapagg_common_expression::ColumnRef;

use super::aggregate_map_agg_serde::check_snapshot;
use super::aggregate_map_agg_serde::deserialize_row;
use super::aggregate_map_agg_serde::snapshot_sources;
use super::aggregate_map_agg_state::StateCheckpoint;
use super::MapAccumulator;
use super::MapAggConfig;

// per group slot: the box in the table plus the accumulator it points to
const SLOT_SIZE: usize = size_of::<Box<MapAccumulator>>() + size_of::<MapAccumulator>();

/// The map accumulators of one aggregation operator, indexed by dense group id.
///
/// Accumulators are boxed so growing the table never moves them. The table is
/// owned by a single task and is dropped, with all its accumulators, when the
/// operator finishes.
///
/// Batch operations are all-or-nothing: a failed `accumulate_keys`,
/// `batch_merge` or `finalize_all` leaves every accumulator as it was.
pub struct MapAggStateTable {
    config: Arc<MapAggConfig>,
    max_group_id: i64,
    states: Vec<Box<MapAccumulator>>,
    // bytes charged to the memory tracker for the group slots themselves
    slot_bytes: usize,
    finalized: bool,
}

impl MapAggStateTable {
    pub fn create(config: Arc<MapAggConfig>, max_group_id: i64) -> MapAggStateTable {
        MapAggStateTable {
            config,
            max_group_id,
            states: vec![],
            slot_bytes: 0,
            finalized: false,
        }
    }

    pub fn config(&self) -> &Arc<MapAggConfig> {
        &self.config
    }

    pub fn max_group_id(&self) -> i64 {
        self.max_group_id
    }

    /// Number of groups currently tracked.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn get_or_create(&mut self, group_id: i64) -> Result<&mut MapAccumulator> {
        self.check_mutable()?;
        let index = self.check_group_id(group_id)?;
        if index >= self.states.len() {
            self.grow(index + 1)?;
        }
        Ok(self.states[index].as_mut())
    }

    pub fn get(&self, group_id: i64) -> Option<&MapAccumulator> {
        usize::try_from(group_id)
            .ok()
            .and_then(|index| self.states.get(index))
            .map(|state| state.as_ref())
    }

    pub fn get_mut(&mut self, group_id: i64) -> Option<&mut MapAccumulator> {
        usize::try_from(group_id)
            .ok()
            .and_then(|index| self.states.get_mut(index))
            .map(|state| state.as_mut())
    }

    /// Pre-grows the table so every id in `0..=max_group_id` has an accumulator.
    pub fn ensure_capacity(&mut self, max_group_id: i64) -> Result<()> {
        self.check_mutable()?;
        let index = self.check_group_id(max_group_id)?;
        if index >= self.states.len() {
            self.grow(index + 1)?;
        }
        Ok(())
    }

    /// Inserts row `i` of `keys` / `values` into group `group_ids[i]`.
    pub fn accumulate_keys(
        &mut self,
        group_ids: &[i64],
        keys: &ColumnRef,
        values: &ColumnRef,
    ) -> Result<()> {
        self.check_mutable()?;
        if keys.len() != group_ids.len() || values.len() != group_ids.len() {
            return Err(ErrorCode::BadArguments(format!(
                "map aggregate input has {} group ids, {} keys and {} values",
                group_ids.len(),
                keys.len(),
                values.len()
            )));
        }
        self.config.check_key_column(keys)?;
        self.config.check_value_column(values)?;

        self.apply_batch(group_ids, |row, state| {
            state.push_entry(keys, row, values, row)
        })
    }

    /// Snapshots the listed groups, one map row per group, for shipping to the
    /// next aggregation stage. The accumulators stay mutable.
    pub fn batch_serialize(&self, group_ids: &[i64]) -> Result<Column> {
        self.check_mutable()?;
        let mut builder = MapColumnBuilder::with_capacity(
            &self.config.key_type,
            &self.config.value_type,
            group_ids.len(),
        );

        for group_id in group_ids {
            let state = self.get(*group_id).ok_or_else(|| {
                ErrorCode::InvalidGroupId(format!(
                    "group id {} has no map aggregate state, the table has {} groups",
                    group_id,
                    self.states.len()
                ))
            })?;
            state
                .write_row(&mut builder)
                .map_err(|e| e.add_message_back(format!(" (group id: {})", group_id)))?;
        }
        Ok(Column::Map(Box::new(builder.build())))
    }

    /// Merges row `i` of the snapshot column `states` into group `group_ids[i]`.
    pub fn batch_merge(&mut self, group_ids: &[i64], states: &Column) -> Result<()> {
        self.check_mutable()?;
        let map = check_snapshot(states, &self.config)?;
        if map.len() != group_ids.len() {
            return Err(ErrorCode::MalformedStateSnapshot(format!(
                "map aggregate snapshot has {} rows for {} group ids",
                map.len(),
                group_ids.len()
            )));
        }

        let (keys, values) = snapshot_sources(map);
        let config = self.config.clone();
        self.apply_batch(group_ids, |row, state| {
            let other = deserialize_row(map, row, &keys, &values, &config)?;
            state.merge(other)
        })?;
        debug!("merged {} map aggregate snapshots", group_ids.len());
        Ok(())
    }

    /// Emits every accumulator in ascending group id order, one map row each.
    /// The table is terminal afterwards.
    ///
    /// Every group is resolved before anything reaches `builder`, so on error
    /// the builder is untouched and no accumulator is finalized.
    pub fn finalize_all(&mut self, builder: &mut MapColumnBuilder) -> Result<()> {
        self.check_mutable()?;
        self.config.check_builder(builder)?;

        let mut resolved = MapColumnBuilder::with_capacity(
            &self.config.key_type,
            &self.config.value_type,
            self.states.len(),
        );
        for (group_id, state) in self.states.iter().enumerate() {
            state
                .write_row(&mut resolved)
                .map_err(|e| e.add_message_back(format!(" (group id: {})", group_id)))?;
        }
        let resolved = resolved.build();
        for row in 0..resolved.len() {
            if let Some(map) = resolved.index(row) {
                builder.push(map)?;
            }
        }

        let retained_entries = self.retained_entries();
        for state in self.states.iter_mut() {
            state.finalize();
        }
        self.finalized = true;

        info!(
            "finalized {} map aggregate groups with {} retained entries",
            self.states.len(),
            retained_entries
        );
        Ok(())
    }

    pub fn spill_requested(&self) -> bool {
        self.states.iter().any(|state| state.spill_requested())
    }

    pub fn retained_entries(&self) -> usize {
        self.states.iter().map(|state| state.retained_entries()).sum()
    }

    /// Bytes charged to the memory tracker, group slots included.
    pub fn estimated_bytes(&self) -> usize {
        self.slot_bytes
            + self
                .states
                .iter()
                .map(|state| state.estimated_bytes())
                .sum::<usize>()
    }

    /// Runs `apply` for row `i` on group `group_ids[i]`. Group ids are checked
    /// and the table grown before any row is applied. If a row fails, every
    /// touched group is rolled back to where it was before the batch.
    fn apply_batch<F>(&mut self, group_ids: &[i64], mut apply: F) -> Result<()>
    where F: FnMut(usize, &mut MapAccumulator) -> Result<()> {
        let mut max_index = None;
        for group_id in group_ids {
            let index = self.check_group_id(*group_id)?;
            max_index = max_index.max(Some(index));
        }
        if let Some(index) = max_index {
            if index >= self.states.len() {
                self.grow(index + 1)?;
            }
        }

        let mut checkpoints: HashMap<usize, StateCheckpoint> = HashMap::new();
        for (row, group_id) in group_ids.iter().enumerate() {
            let index = *group_id as usize;
            let state = self.states[index].as_mut();
            checkpoints
                .entry(index)
                .or_insert_with(|| state.checkpoint());

            if let Err(cause) = apply(row, state) {
                debug!(
                    "roll back {} map aggregate groups after a failed batch row {}",
                    checkpoints.len(),
                    row
                );
                for (index, checkpoint) in checkpoints {
                    self.states[index].rollback(checkpoint);
                }
                return Err(cause.add_message_back(format!(" (group id: {})", group_id)));
            }
        }
        Ok(())
    }

    fn check_mutable(&self) -> Result<()> {
        if self.finalized {
            return Err(ErrorCode::FinalizedAggregateState(
                "map aggregate state table was already finalized",
            ));
        }
        Ok(())
    }

    fn check_group_id(&self, group_id: i64) -> Result<usize> {
        if group_id < 0 || group_id > self.max_group_id {
            return Err(ErrorCode::InvalidGroupId(format!(
                "group id {} is out of range [0, {}]",
                group_id, self.max_group_id
            )));
        }
        Ok(group_id as usize)
    }

    /// Charges the new slots to the memory tracker before allocating them.
    fn grow(&mut self, len: usize) -> Result<()> {
        let bytes = (len - self.states.len()) * SLOT_SIZE;
        let tracker = &self.config.memory.memory_tracking;
        if let Err(out_of_limit) = tracker.record_memory(bytes as i64) {
            warn!(
                "map aggregate state table denied {} groups ({} bytes) by memory tracker {:?}: {}",
                len,
                bytes,
                tracker.name(),
                out_of_limit
            );
            return Err(out_of_limit.into());
        }
        self.slot_bytes += bytes;

        debug!(
            "grow map aggregate state table from {} to {} groups",
            self.states.len(),
            len
        );
        let config = &self.config;
        self.states
            .resize_with(len, || Box::new(MapAccumulator::create(config.clone())));
        Ok(())
    }
}

impl fmt::Debug for MapAggStateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapAggStateTable")
            .field("mode", &self.config.mode)
            .field("max_group_id", &self.max_group_id)
            .field("groups", &self.states.len())
            .field("slot_bytes", &self.slot_bytes)
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl Drop for MapAggStateTable {
    fn drop(&mut self) {
        if self.slot_bytes > 0 {
            let _ = self
                .config
                .memory
                .memory_tracking
                .record_memory(-(self.slot_bytes as i64));
            self.slot_bytes = 0;
        }
    }
}
