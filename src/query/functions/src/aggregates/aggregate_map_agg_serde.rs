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

use std::sync::Arc;

use log::warn;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;
use mapagg_common_expression::deserialize_column;
use mapagg_common_expression::serialize_column;
use mapagg_common_expression::types::MapColumn;
use mapagg_common_expression::types::MapColumnBuilder;
use mapagg_common_expression::Column;
use mapagg_common_expression::ColumnRef;

use super::MapAccumulator;
use super::MapAggConfig;

/// Produces a single-row map column holding the resolved entries of `state`.
/// The state stays mutable.
pub fn serialize(state: &MapAccumulator) -> Result<Column> {
    let config = state.config();
    let mut builder = MapColumnBuilder::with_capacity(&config.key_type, &config.value_type, 1);
    state.write_row(&mut builder)?;
    Ok(Column::Map(Box::new(builder.build())))
}

/// Rebuilds an accumulator from a snapshot made by [`serialize`].
pub fn deserialize(snapshot: &Column, config: &Arc<MapAggConfig>) -> Result<MapAccumulator> {
    let map = check_snapshot(snapshot, config)?;
    if map.len() != 1 {
        return Err(ErrorCode::MalformedStateSnapshot(format!(
            "map aggregate snapshot must have exactly one row, got {}",
            map.len()
        )));
    }
    let (keys, values) = snapshot_sources(map);
    deserialize_row(map, 0, &keys, &values, config)
}

/// Encodes a snapshot with the block serialization used for every column.
pub fn serialize_to_bytes(state: &MapAccumulator) -> Result<Vec<u8>> {
    serialize_column(&serialize(state)?)
}

pub fn deserialize_from_bytes(bytes: &[u8], config: &Arc<MapAggConfig>) -> Result<MapAccumulator> {
    let snapshot = deserialize_column(bytes).map_err(|e| {
        warn!("cannot decode map aggregate snapshot of {} bytes: {}", bytes.len(), e);
        ErrorCode::MalformedStateSnapshot(format!(
            "cannot decode map aggregate snapshot: {}",
            e.message()
        ))
    })?;
    deserialize(&snapshot, config)
}

/// Checks that `states` is a map column of the configured key and value types.
pub(crate) fn check_snapshot<'a>(
    states: &'a Column,
    config: &MapAggConfig,
) -> Result<&'a MapColumn> {
    let map = states.as_map().ok_or_else(|| {
        ErrorCode::MalformedStateSnapshot(format!(
            "map aggregate snapshot must be a map column, got {}",
            states.data_type()
        ))
    })?;

    if map.key_type() != config.key_type || map.value_type() != config.value_type {
        return Err(ErrorCode::MalformedStateSnapshot(format!(
            "map aggregate snapshot has type {}, expected {}",
            states.data_type(),
            config.data_type()
        )));
    }
    map.check_valid().map_err(|e| {
        warn!("invalid map aggregate snapshot: {}", e);
        ErrorCode::MalformedStateSnapshot(format!(
            "invalid map aggregate snapshot: {}",
            e.message()
        ))
    })?;
    Ok(map)
}

/// Key and value columns of a snapshot, shared by all accumulators rebuilt from it.
pub(crate) fn snapshot_sources(map: &MapColumn) -> (ColumnRef, ColumnRef) {
    (Arc::new(map.keys.clone()), Arc::new(map.values.clone()))
}

pub(crate) fn deserialize_row(
    map: &MapColumn,
    row: usize,
    keys: &ColumnRef,
    values: &ColumnRef,
    config: &Arc<MapAggConfig>,
) -> Result<MapAccumulator> {
    let entries = map.index(row).ok_or_else(|| {
        ErrorCode::MalformedStateSnapshot(format!(
            "map aggregate snapshot has no row {}",
            row
        ))
    })?;
    MapAccumulator::from_snapshot(config.clone(), keys, values, entries.positions())
}
