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

use std::collections::hash_map::Entry as HashMapEntry;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use log::warn;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;
use mapagg_common_expression::types::DataType;
use mapagg_common_expression::types::MapColumnBuilder;
use mapagg_common_expression::Column;
use mapagg_common_expression::ColumnRef;
use mapagg_common_expression::ScalarRef;
use mapagg_common_settings::MemorySettings;
use mapagg_common_settings::NullKeyBehavior;

/// How a map aggregate treats a key that occurs more than once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateKeyMode {
    Reject,
    Overwrite,
}

pub trait DuplicateKeyPolicy: Send + Sync + 'static {
    const MODE: DuplicateKeyMode;

    /// Called when `key` is seen again while resolving the entry log.
    /// Returning `Ok` lets the newer value replace the older one.
    fn on_duplicate(key: ScalarRef<'_>) -> Result<()>;
}

#[derive(Default)]
pub struct RejectOnDuplicate;

impl DuplicateKeyPolicy for RejectOnDuplicate {
    const MODE: DuplicateKeyMode = DuplicateKeyMode::Reject;

    #[inline]
    fn on_duplicate(key: ScalarRef<'_>) -> Result<()> {
        Err(ErrorCode::DuplicateMapKey(format!(
            "Duplicate map key {} is not allowed",
            key
        )))
    }
}

#[derive(Default)]
pub struct OverwriteOnDuplicate;

impl DuplicateKeyPolicy for OverwriteOnDuplicate {
    const MODE: DuplicateKeyMode = DuplicateKeyMode::Overwrite;

    #[inline]
    fn on_duplicate(_: ScalarRef<'_>) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapAggPhase {
    Empty,
    Accumulating,
    Finalized,
}

/// Everything the accumulators of one map aggregate share.
#[derive(Clone)]
pub struct MapAggConfig {
    pub mode: DuplicateKeyMode,
    pub key_type: DataType,
    pub value_type: DataType,
    pub null_key_behavior: NullKeyBehavior,
    pub memory: MemorySettings,
}

impl MapAggConfig {
    pub fn create(
        mode: DuplicateKeyMode,
        key_type: DataType,
        value_type: DataType,
        null_key_behavior: NullKeyBehavior,
        memory: MemorySettings,
    ) -> Arc<MapAggConfig> {
        Arc::new(MapAggConfig {
            mode,
            key_type,
            value_type,
            null_key_behavior,
            memory,
        })
    }

    pub fn data_type(&self) -> DataType {
        DataType::new_map(self.key_type.clone(), self.value_type.clone())
    }

    /// Key columns may be the nullable form of the key type, NULL keys are
    /// handled per row.
    pub fn check_key_column(&self, keys: &Column) -> Result<()> {
        let ty = keys.data_type();
        if ty == self.key_type || ty.is_null() || ty.remove_nullable() == self.key_type {
            return Ok(());
        }
        Err(ErrorCode::TypeMismatch(format!(
            "map key column has type {}, expected {}",
            ty, self.key_type
        )))
    }

    pub fn check_value_column(&self, values: &Column) -> Result<()> {
        let ty = values.data_type();
        let fits = ty == self.value_type
            || (self.value_type.is_nullable()
                && (ty.is_null() || ty == self.value_type.remove_nullable()));
        if fits {
            return Ok(());
        }
        Err(ErrorCode::TypeMismatch(format!(
            "map value column has type {}, expected {}",
            ty, self.value_type
        )))
    }

    pub(crate) fn check_builder(&self, builder: &MapColumnBuilder) -> Result<()> {
        if builder.key_type() != self.key_type || builder.value_type() != self.value_type {
            return Err(ErrorCode::TypeMismatch(format!(
                "cannot write a {} map into a builder of type {}",
                self.data_type(),
                builder.data_type()
            )));
        }
        Ok(())
    }
}

/// One (key, value) reference into the columns retained by an accumulator.
#[derive(Clone, Copy, Debug)]
struct MapEntry {
    key_source: usize,
    key_pos: usize,
    value_source: usize,
    value_pos: usize,
}

const ENTRY_SIZE: usize = size_of::<MapEntry>();
const SOURCE_SIZE: usize = size_of::<ColumnRef>();

/// The retained size of an accumulator at some point, see
/// [`MapAccumulator::checkpoint`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct StateCheckpoint {
    sources: usize,
    entries: usize,
    phase: MapAggPhase,
    memory_size: usize,
}

/// The in-progress map of one group.
///
/// Entries are kept as an append-only log of positions into shared, immutable
/// input columns. Duplicate keys are resolved only when the map is written
/// out, by replaying the log oldest to newest.
pub struct MapAggState<P: DuplicateKeyPolicy> {
    config: Arc<MapAggConfig>,
    sources: Vec<ColumnRef>,
    entries: Vec<MapEntry>,
    phase: MapAggPhase,
    // bytes currently charged to the memory tracker
    memory_size: usize,
    spill_requested: bool,
    _p: PhantomData<P>,
}

impl<P: DuplicateKeyPolicy> MapAggState<P> {
    pub fn create(config: Arc<MapAggConfig>) -> Self {
        debug_assert_eq!(config.mode, P::MODE);
        MapAggState {
            config,
            sources: vec![],
            entries: vec![],
            phase: MapAggPhase::Empty,
            memory_size: 0,
            spill_requested: false,
            _p: PhantomData,
        }
    }

    pub fn config(&self) -> &Arc<MapAggConfig> {
        &self.config
    }

    pub fn phase(&self) -> MapAggPhase {
        self.phase
    }

    pub fn retained_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn estimated_bytes(&self) -> usize {
        self.memory_size
    }

    pub fn spill_requested(&self) -> bool {
        self.spill_requested
    }

    pub fn insert(
        &mut self,
        keys: &ColumnRef,
        key_pos: usize,
        values: &ColumnRef,
        value_pos: usize,
    ) -> Result<()> {
        self.check_mutable()?;
        self.config.check_key_column(keys)?;
        self.config.check_value_column(values)?;
        self.push_entry(keys, key_pos, values, value_pos)
    }

    /// Appends one entry, the column types must already have been checked.
    pub(crate) fn push_entry(
        &mut self,
        keys: &ColumnRef,
        key_pos: usize,
        values: &ColumnRef,
        value_pos: usize,
    ) -> Result<()> {
        self.check_mutable()?;

        let key = keys.index(key_pos).ok_or_else(|| {
            ErrorCode::BadArguments(format!(
                "key position {} is out of bounds, the column has {} rows",
                key_pos,
                keys.len()
            ))
        })?;
        let value = values.index(value_pos).ok_or_else(|| {
            ErrorCode::BadArguments(format!(
                "value position {} is out of bounds, the column has {} rows",
                value_pos,
                values.len()
            ))
        })?;

        if key.is_null() {
            return match self.config.null_key_behavior {
                NullKeyBehavior::Skip => Ok(()),
                NullKeyBehavior::Error => {
                    Err(ErrorCode::BadArguments("map key cannot be NULL"))
                }
            };
        }
        if value.is_null() && !self.config.value_type.is_nullable_or_null() {
            return Err(ErrorCode::TypeMismatch(format!(
                "NULL is not a valid value for map value type {}",
                self.config.value_type
            )));
        }

        let shared = Arc::ptr_eq(keys, values);
        let key_source = self.find_source(keys);
        let value_source = match shared {
            true => key_source,
            false => self.find_source(values),
        };
        let new_sources =
            key_source.is_none() as usize + (!shared && value_source.is_none()) as usize;

        self.grow(ENTRY_SIZE + key.memory_size() + value.memory_size() + new_sources * SOURCE_SIZE)?;

        let key_source = match key_source {
            Some(source) => source,
            None => self.add_source(keys),
        };
        let value_source = match value_source {
            Some(source) => source,
            None if shared => key_source,
            None => self.add_source(values),
        };

        self.entries.push(MapEntry {
            key_source,
            key_pos,
            value_source,
            value_pos,
        });
        self.phase = MapAggPhase::Accumulating;
        Ok(())
    }

    /// Appends the entries of `other` after the existing ones, in `other`'s order.
    pub fn merge(&mut self, mut other: MapAggState<P>) -> Result<()> {
        self.check_mutable()?;
        other.check_mutable()?;
        if other.config.key_type != self.config.key_type
            || other.config.value_type != self.config.value_type
        {
            return Err(ErrorCode::TypeMismatch(format!(
                "cannot merge a {} map aggregate state into a {} one",
                other.config.data_type(),
                self.config.data_type()
            )));
        }

        let bytes = other.memory_size;
        if Arc::ptr_eq(
            &self.config.memory.memory_tracking,
            &other.config.memory.memory_tracking,
        ) {
            // the bytes are already charged to the shared tracker, they move with the entries
            other.memory_size = 0;
            self.memory_size += bytes;
            self.check_spill();
        } else {
            self.grow(bytes)?;
        }

        let remap = std::mem::take(&mut other.sources)
            .into_iter()
            .map(|source| match self.find_source(&source) {
                Some(index) => index,
                None => self.add_source(&source),
            })
            .collect::<Vec<_>>();

        self.entries.extend(other.entries.iter().map(|entry| MapEntry {
            key_source: remap[entry.key_source],
            key_pos: entry.key_pos,
            value_source: remap[entry.value_source],
            value_pos: entry.value_pos,
        }));
        self.phase = MapAggPhase::Accumulating;
        Ok(())
    }

    /// Writes the resolved map as one row and finalizes the state.
    pub fn emit(&mut self, builder: &mut MapColumnBuilder) -> Result<()> {
        self.check_mutable()?;
        self.write_row(builder)?;
        self.finalize();
        Ok(())
    }

    /// Writes the resolved map as one row, leaving the state untouched.
    pub(crate) fn write_row(&self, builder: &mut MapColumnBuilder) -> Result<()> {
        self.check_mutable()?;
        self.config.check_builder(builder)?;

        let resolved = self.resolve()?;
        for (key, value) in resolved {
            builder.push_entry(key, value)?;
        }
        builder.commit_row();
        Ok(())
    }

    pub(crate) fn checkpoint(&self) -> StateCheckpoint {
        StateCheckpoint {
            sources: self.sources.len(),
            entries: self.entries.len(),
            phase: self.phase,
            memory_size: self.memory_size,
        }
    }

    /// Drops everything appended since `checkpoint` and returns its bytes to
    /// the tracker. Only valid while the state is still mutable.
    pub(crate) fn rollback(&mut self, checkpoint: StateCheckpoint) {
        debug_assert_ne!(self.phase, MapAggPhase::Finalized);
        self.sources.truncate(checkpoint.sources);
        self.entries.truncate(checkpoint.entries);
        self.phase = checkpoint.phase;
        if self.memory_size > checkpoint.memory_size {
            let bytes = self.memory_size - checkpoint.memory_size;
            let _ = self
                .config
                .memory
                .memory_tracking
                .record_memory(-(bytes as i64));
            self.memory_size = checkpoint.memory_size;
        }
    }

    /// Rebuilds a state whose entries are rows `positions` of a snapshot's
    /// key and value columns.
    pub(crate) fn from_snapshot(
        config: Arc<MapAggConfig>,
        keys: &ColumnRef,
        values: &ColumnRef,
        positions: Range<usize>,
    ) -> Result<Self> {
        let mut state = Self::create(config);
        if positions.is_empty() {
            return Ok(state);
        }

        let bytes = positions
            .clone()
            .map(|pos| {
                let key = keys.index(pos).unwrap_or_default();
                let value = values.index(pos).unwrap_or_default();
                ENTRY_SIZE + key.memory_size() + value.memory_size()
            })
            .sum::<usize>();
        state.grow(bytes + 2 * SOURCE_SIZE)?;

        let key_source = state.add_source(keys);
        let value_source = state.add_source(values);
        state.entries = positions
            .map(|pos| MapEntry {
                key_source,
                key_pos: pos,
                value_source,
                value_pos: pos,
            })
            .collect();
        state.phase = MapAggPhase::Accumulating;
        Ok(state)
    }

    /// Replays the entry log, keeping each key once at its first position
    /// with the value chosen by the policy.
    fn resolve(&self) -> Result<Vec<(ScalarRef<'_>, ScalarRef<'_>)>> {
        let mut slots: HashMap<ScalarRef<'_>, usize> = HashMap::with_capacity(self.entries.len());
        let mut resolved = Vec::with_capacity(self.entries.len());

        for entry in self.entries.iter() {
            let key = self.sources[entry.key_source]
                .index(entry.key_pos)
                .unwrap_or_default();
            let value = self.sources[entry.value_source]
                .index(entry.value_pos)
                .unwrap_or_default();

            match slots.entry(key) {
                HashMapEntry::Occupied(slot) => {
                    P::on_duplicate(key)?;
                    resolved[*slot.get()] = (key, value);
                }
                HashMapEntry::Vacant(slot) => {
                    slot.insert(resolved.len());
                    resolved.push((key, value));
                }
            }
        }
        Ok(resolved)
    }

    fn check_mutable(&self) -> Result<()> {
        if self.phase == MapAggPhase::Finalized {
            return Err(ErrorCode::FinalizedAggregateState(
                "map aggregate state was already emitted",
            ));
        }
        Ok(())
    }

    fn find_source(&self, column: &ColumnRef) -> Option<usize> {
        self.sources.iter().rposition(|s| Arc::ptr_eq(s, column))
    }

    fn add_source(&mut self, column: &ColumnRef) -> usize {
        self.sources.push(column.clone());
        self.sources.len() - 1
    }

    /// Charges `bytes` to the tracker before anything is retained, so a
    /// refusal leaves the state as it was.
    fn grow(&mut self, bytes: usize) -> Result<()> {
        let tracker = &self.config.memory.memory_tracking;
        if let Err(out_of_limit) = tracker.record_memory(bytes as i64) {
            warn!(
                "map aggregate state denied {} bytes by memory tracker {:?}: {}",
                bytes,
                tracker.name(),
                out_of_limit
            );
            return Err(out_of_limit.into());
        }
        self.memory_size += bytes;
        self.check_spill();
        Ok(())
    }

    fn check_spill(&mut self) {
        if !self.spill_requested && self.config.memory.check_spill() {
            warn!(
                "map aggregate state requests spill, {} entries retaining {} bytes",
                self.entries.len(),
                self.memory_size
            );
            self.spill_requested = true;
        }
    }

    fn release_memory(&mut self) {
        if self.memory_size > 0 {
            let _ = self
                .config
                .memory
                .memory_tracking
                .record_memory(-(self.memory_size as i64));
            self.memory_size = 0;
        }
    }

    pub(crate) fn finalize(&mut self) {
        self.entries = vec![];
        self.sources = vec![];
        self.release_memory();
        self.phase = MapAggPhase::Finalized;
    }
}

impl<P: DuplicateKeyPolicy> fmt::Debug for MapAggState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapAggState")
            .field("mode", &P::MODE)
            .field("phase", &self.phase)
            .field("entries", &self.entries.len())
            .field("sources", &self.sources.len())
            .field("memory_size", &self.memory_size)
            .finish()
    }
}

impl<P: DuplicateKeyPolicy> Drop for MapAggState<P> {
    fn drop(&mut self) {
        self.release_memory();
    }
}

/// A map accumulator with its duplicate key policy chosen at construction.
#[derive(Debug)]
pub enum MapAccumulator {
    Reject(MapAggState<RejectOnDuplicate>),
    Overwrite(MapAggState<OverwriteOnDuplicate>),
}

macro_rules! dispatch {
    ($self:expr, $state:ident => $body:expr) => {
        match $self {
            MapAccumulator::Reject($state) => $body,
            MapAccumulator::Overwrite($state) => $body,
        }
    };
}

impl MapAccumulator {
    pub fn create(config: Arc<MapAggConfig>) -> MapAccumulator {
        match config.mode {
            DuplicateKeyMode::Reject => MapAccumulator::Reject(MapAggState::create(config)),
            DuplicateKeyMode::Overwrite => MapAccumulator::Overwrite(MapAggState::create(config)),
        }
    }

    pub fn mode(&self) -> DuplicateKeyMode {
        match self {
            MapAccumulator::Reject(_) => RejectOnDuplicate::MODE,
            MapAccumulator::Overwrite(_) => OverwriteOnDuplicate::MODE,
        }
    }

    pub fn config(&self) -> &Arc<MapAggConfig> {
        dispatch!(self, state => state.config())
    }

    pub fn phase(&self) -> MapAggPhase {
        dispatch!(self, state => state.phase())
    }

    pub fn retained_entries(&self) -> usize {
        dispatch!(self, state => state.retained_entries())
    }

    pub fn estimated_bytes(&self) -> usize {
        dispatch!(self, state => state.estimated_bytes())
    }

    pub fn spill_requested(&self) -> bool {
        dispatch!(self, state => state.spill_requested())
    }

    pub fn insert(
        &mut self,
        keys: &ColumnRef,
        key_pos: usize,
        values: &ColumnRef,
        value_pos: usize,
    ) -> Result<()> {
        dispatch!(self, state => state.insert(keys, key_pos, values, value_pos))
    }

    pub(crate) fn push_entry(
        &mut self,
        keys: &ColumnRef,
        key_pos: usize,
        values: &ColumnRef,
        value_pos: usize,
    ) -> Result<()> {
        dispatch!(self, state => state.push_entry(keys, key_pos, values, value_pos))
    }

    pub fn merge(&mut self, other: MapAccumulator) -> Result<()> {
        match (self, other) {
            (MapAccumulator::Reject(state), MapAccumulator::Reject(other)) => state.merge(other),
            (MapAccumulator::Overwrite(state), MapAccumulator::Overwrite(other)) => {
                state.merge(other)
            }
            (state, other) => Err(ErrorCode::TypeMismatch(format!(
                "cannot merge a {:?} map aggregate state into a {:?} one",
                other.mode(),
                state.mode()
            ))),
        }
    }

    pub fn emit(&mut self, builder: &mut MapColumnBuilder) -> Result<()> {
        dispatch!(self, state => state.emit(builder))
    }

    pub(crate) fn write_row(&self, builder: &mut MapColumnBuilder) -> Result<()> {
        dispatch!(self, state => state.write_row(builder))
    }

    /// Marks the state as emitted without writing it, for a caller that
    /// already wrote the row through [`MapAccumulator::write_row`].
    pub(crate) fn finalize(&mut self) {
        dispatch!(self, state => state.finalize())
    }

    pub(crate) fn checkpoint(&self) -> StateCheckpoint {
        dispatch!(self, state => state.checkpoint())
    }

    pub(crate) fn rollback(&mut self, checkpoint: StateCheckpoint) {
        dispatch!(self, state => state.rollback(checkpoint))
    }

    pub(crate) fn from_snapshot(
        config: Arc<MapAggConfig>,
        keys: &ColumnRef,
        values: &ColumnRef,
        positions: Range<usize>,
    ) -> Result<MapAccumulator> {
        Ok(match config.mode {
            DuplicateKeyMode::Reject => MapAccumulator::Reject(MapAggState::from_snapshot(
                config, keys, values, positions,
            )?),
            DuplicateKeyMode::Overwrite => MapAccumulator::Overwrite(
                MapAggState::from_snapshot(config, keys, values, positions)?,
            ),
        })
    }
}
