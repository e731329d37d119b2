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

use mapagg_common_exception::ErrorCode;
use mapagg_common_expression::deserialize_column;
use mapagg_common_expression::serialize_column;
use mapagg_common_expression::types::DataType;
use mapagg_common_expression::types::MapColumnBuilder;
use mapagg_common_expression::Column;
use mapagg_common_expression::Scalar;
use mapagg_common_expression::COLUMN_FORMAT_VERSION;
use mapagg_common_functions::aggregates::deserialize_map_agg_state;
use mapagg_common_functions::aggregates::deserialize_map_agg_state_from_bytes;
use mapagg_common_functions::aggregates::serialize_map_agg_state;
use mapagg_common_functions::aggregates::serialize_map_agg_state_to_bytes;
use mapagg_common_functions::aggregates::DuplicateKeyMode;
use mapagg_common_functions::aggregates::MapAccumulator;
use pretty_assertions::assert_eq;

use super::accumulator_of;
use super::config;
use super::config_with;
use super::emit_entries;
use super::pairs;

#[test]
fn test_snapshot_is_a_single_map_row() {
    let cfg = config(DuplicateKeyMode::Overwrite);
    let acc = accumulator_of(&cfg, &pairs(&[(2, "x"), (1, "y"), (2, "z")]));

    let snapshot = serialize_map_agg_state(&acc).unwrap();
    assert_eq!(
        snapshot.data_type(),
        DataType::new_map(DataType::Int64, DataType::String)
    );
    assert_eq!(snapshot.len(), 1);

    // duplicates are already resolved in the snapshot
    let map = snapshot.as_map().unwrap();
    assert_eq!(map.index(0).unwrap().len(), 2);
    assert_eq!(format!("{}", snapshot.index(0).unwrap()), "{2:'z', 1:'y'}");
}

#[test]
fn test_snapshot_of_empty_accumulator() {
    let cfg = config(DuplicateKeyMode::Reject);
    let acc = MapAccumulator::create(cfg.clone());

    let snapshot = serialize_map_agg_state(&acc).unwrap();
    assert_eq!(snapshot.len(), 1);

    let mut restored = deserialize_map_agg_state(&snapshot, &cfg).unwrap();
    assert_eq!(restored.retained_entries(), 0);
    assert!(emit_entries(&mut restored).unwrap().is_empty());
}

#[test]
fn test_snapshot_of_strict_accumulator_with_duplicates() {
    let cfg = config(DuplicateKeyMode::Reject);
    let acc = accumulator_of(&cfg, &pairs(&[(1, "a"), (1, "b")]));

    let err = serialize_map_agg_state(&acc).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DUPLICATE_MAP_KEY);
}

#[test]
fn test_deserialize_uses_callers_policy() {
    let overwrite = config(DuplicateKeyMode::Overwrite);
    let reject = config(DuplicateKeyMode::Reject);
    let acc = accumulator_of(&overwrite, &pairs(&[(1, "a"), (1, "b")]));

    let snapshot = serialize_map_agg_state(&acc).unwrap();
    let mut restored = deserialize_map_agg_state(&snapshot, &reject).unwrap();
    assert_eq!(restored.mode(), DuplicateKeyMode::Reject);

    // the restored state rejects a later duplicate of the shipped key
    restored.merge(accumulator_of(&reject, &pairs(&[(1, "c")]))).unwrap();
    let err = emit_entries(&mut restored).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DUPLICATE_MAP_KEY);
}

#[test]
fn test_bytes_round_trip() {
    let cfg = config(DuplicateKeyMode::Overwrite);
    let acc = accumulator_of(&cfg, &pairs(&[(1, "a"), (2, "b"), (1, "c")]));

    let bytes = serialize_map_agg_state_to_bytes(&acc).unwrap();
    assert_eq!(bytes[0], COLUMN_FORMAT_VERSION);

    // the state is an ordinary map column on the wire
    let column = deserialize_column(&bytes).unwrap();
    assert_eq!(column, serialize_map_agg_state(&acc).unwrap());

    let mut restored = deserialize_map_agg_state_from_bytes(&bytes, &cfg).unwrap();
    assert_eq!(emit_entries(&mut restored).unwrap(), vec![
        (Scalar::from(1i64), Scalar::from("c")),
        (Scalar::from(2i64), Scalar::from("b")),
    ]);
}

#[test]
fn test_malformed_snapshots() {
    let cfg = config(DuplicateKeyMode::Overwrite);

    // not a map
    let err = deserialize_map_agg_state(&Column::from(vec![1i64]), &cfg).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);

    // wrong key type
    let other = config_with(DuplicateKeyMode::Overwrite, DataType::UInt64, DataType::String);
    let snapshot = serialize_map_agg_state(&MapAccumulator::create(other)).unwrap();
    let err = deserialize_map_agg_state(&snapshot, &cfg).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);

    // two rows
    let mut builder = MapColumnBuilder::with_capacity(&DataType::Int64, &DataType::String, 2);
    builder.push_default();
    builder.push_default();
    let snapshot = Column::Map(Box::new(builder.build()));
    let err = deserialize_map_agg_state(&snapshot, &cfg).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);

    // zero rows
    let builder = MapColumnBuilder::with_capacity(&DataType::Int64, &DataType::String, 0);
    let snapshot = Column::Map(Box::new(builder.build()));
    let err = deserialize_map_agg_state(&snapshot, &cfg).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);
}

#[test]
fn test_malformed_bytes() {
    let cfg = config(DuplicateKeyMode::Overwrite);
    let acc = accumulator_of(&cfg, &pairs(&[(1, "a"), (2, "b")]));
    let bytes = serialize_map_agg_state_to_bytes(&acc).unwrap();

    let err = deserialize_map_agg_state_from_bytes(&[], &cfg).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);

    let err = deserialize_map_agg_state_from_bytes(&bytes[..bytes.len() - 1], &cfg).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);

    let mut wrong_version = bytes.clone();
    wrong_version[0] = COLUMN_FORMAT_VERSION + 1;
    let err = deserialize_map_agg_state_from_bytes(&wrong_version, &cfg).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);

    // a valid column of the wrong shape
    let bytes = serialize_column(&Column::from(vec!["a"])).unwrap();
    let err = deserialize_map_agg_state_from_bytes(&bytes, &cfg).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);
}
