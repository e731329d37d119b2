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

use mapagg_common_base::runtime::MemStat;
use mapagg_common_exception::ErrorCode;
use mapagg_common_expression::deserialize_column;
use mapagg_common_expression::serialize_column;
use mapagg_common_expression::types::DataType;
use mapagg_common_expression::types::MapColumnBuilder;
use mapagg_common_expression::Column;
use mapagg_common_expression::Scalar;
use mapagg_common_functions::aggregates::DuplicateKeyMode;
use mapagg_common_functions::aggregates::MapAggConfig;
use mapagg_common_functions::aggregates::MapAggPhase;
use mapagg_common_functions::aggregates::MapAggStateTable;
use mapagg_common_settings::MemorySettings;
use mapagg_common_settings::NullKeyBehavior;
use pretty_assertions::assert_eq;

use super::column_ref;
use super::config;
use super::config_with;
use super::finalize_table;
use super::row_entries;
use crate::ensure_tracing_initialized;

#[test]
fn test_get_or_create() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 100);
    assert_eq!(table.size(), 0);

    table.get_or_create(0).unwrap();
    assert_eq!(table.size(), 1);

    // ids above the current size fill the gap with empty accumulators
    table.get_or_create(4).unwrap();
    assert_eq!(table.size(), 5);
    assert_eq!(table.get(2).unwrap().phase(), MapAggPhase::Empty);

    table.get_or_create(100).unwrap();
    assert_eq!(table.size(), 101);
    assert!(table.get(101).is_none());
    assert!(table.get(-1).is_none());
}

#[test]
fn test_invalid_group_id() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 10);

    for group_id in [-1, 11, i64::MAX, i64::MIN] {
        let err = table.get_or_create(group_id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::INVALID_GROUP_ID);
        assert!(err.is_programmer_error());
    }
    assert_eq!(table.size(), 0);

    let err = table.ensure_capacity(11).unwrap_err();
    assert_eq!(err.code(), ErrorCode::INVALID_GROUP_ID);
}

#[test]
fn test_ensure_capacity() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 1000);
    table.ensure_capacity(9).unwrap();
    assert_eq!(table.size(), 10);

    // never shrinks
    table.ensure_capacity(3).unwrap();
    assert_eq!(table.size(), 10);
}

#[test]
fn test_state_survives_growth() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 1 << 20);
    let keys = column_ref(vec![1i64, 2]);
    let values = column_ref(vec!["a", "b"]);

    table
        .get_or_create(0)
        .unwrap()
        .insert(&keys, 0, &values, 0)
        .unwrap();
    table.get_or_create(10_000).unwrap();
    table
        .get_or_create(0)
        .unwrap()
        .insert(&keys, 1, &values, 1)
        .unwrap();

    assert_eq!(table.get(0).unwrap().retained_entries(), 2);
    assert_eq!(table.retained_entries(), 2);
}

#[test]
fn test_accumulate_keys_and_finalize_all() {
    ensure_tracing_initialized();

    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 100);
    let group_ids = [2, 0, 2, 1, 0];
    let keys = column_ref(vec![1i64, 1, 2, 3, 1]);
    let values = column_ref(vec!["a", "b", "c", "d", "e"]);
    table.accumulate_keys(&group_ids, &keys, &values).unwrap();

    assert_eq!(table.size(), 3);
    assert_eq!(table.retained_entries(), 5);

    let column = finalize_table(&mut table).unwrap();
    assert_eq!(column.len(), 3);
    assert_eq!(row_entries(&column, 0), vec![(
        Scalar::from(1i64),
        Scalar::from("e")
    )]);
    assert_eq!(row_entries(&column, 1), vec![(
        Scalar::from(3i64),
        Scalar::from("d")
    )]);
    assert_eq!(row_entries(&column, 2), vec![
        (Scalar::from(1i64), Scalar::from("a")),
        (Scalar::from(2i64), Scalar::from("c")),
    ]);

    assert!(table.is_finalized());
    assert_eq!(table.retained_entries(), 0);
}

#[test]
fn test_finalized_table() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 100);
    table.get_or_create(1).unwrap();
    finalize_table(&mut table).unwrap();

    let err = table.get_or_create(0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FINALIZED_AGGREGATE_STATE);

    let err = finalize_table(&mut table).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FINALIZED_AGGREGATE_STATE);

    let err = table
        .accumulate_keys(&[0], &column_ref(vec![1i64]), &column_ref(vec!["a"]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::FINALIZED_AGGREGATE_STATE);

    let err = table.batch_serialize(&[0]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FINALIZED_AGGREGATE_STATE);
}

#[test]
fn test_duplicate_key_names_the_group() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Reject), 100);
    let keys = column_ref(vec![1i64, 5, 5]);
    let values = column_ref(vec!["a", "b", "c"]);
    table.accumulate_keys(&[0, 1, 1], &keys, &values).unwrap();

    let err = finalize_table(&mut table).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DUPLICATE_MAP_KEY);
    assert_eq!(
        err.message(),
        "Duplicate map key 5 is not allowed (group id: 1)"
    );
}

#[test]
fn test_failed_finalize_all_changes_nothing() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Reject), 100);
    let keys = column_ref(vec![1i64, 5, 5]);
    let values = column_ref(vec!["a", "b", "c"]);
    table.accumulate_keys(&[0, 1, 1], &keys, &values).unwrap();

    let cfg = table.config().clone();
    let mut builder = MapColumnBuilder::with_capacity(&cfg.key_type, &cfg.value_type, 2);
    let err = table.finalize_all(&mut builder).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DUPLICATE_MAP_KEY);

    // group 0 resolves fine but must not be emitted ahead of group 1
    assert_eq!(builder.len(), 0);
    assert!(!table.is_finalized());
    assert_eq!(table.get(0).unwrap().phase(), MapAggPhase::Accumulating);
    assert_eq!(table.get(1).unwrap().phase(), MapAggPhase::Accumulating);
    assert_eq!(table.retained_entries(), 3);

    // a retry reports the same data error
    let err = table.finalize_all(&mut builder).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DUPLICATE_MAP_KEY);
    assert_eq!(builder.len(), 0);
}

#[test]
fn test_finalize_all_checks_builder_type() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 100);
    table
        .accumulate_keys(&[0], &column_ref(vec![1i64]), &column_ref(vec!["a"]))
        .unwrap();

    let mut builder = MapColumnBuilder::with_capacity(&DataType::String, &DataType::String, 1);
    let err = table.finalize_all(&mut builder).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TYPE_MISMATCH);
    assert!(!table.is_finalized());
    assert_eq!(table.get(0).unwrap().phase(), MapAggPhase::Accumulating);
}

fn limited_config(mode: DuplicateKeyMode, mem_stat: &Arc<MemStat>) -> Arc<MapAggConfig> {
    MapAggConfig::create(
        mode,
        DataType::Int64,
        DataType::String,
        NullKeyBehavior::Skip,
        MemorySettings {
            memory_tracking: mem_stat.clone(),
            ..MemorySettings::disable_spill()
        },
    )
}

#[test]
fn test_failed_accumulate_keys_is_rolled_back() {
    ensure_tracing_initialized();

    let mem_stat = MemStat::create("test_failed_accumulate_keys_is_rolled_back");
    mem_stat.set_limit(400);
    let mut table = MapAggStateTable::create(limited_config(DuplicateKeyMode::Reject, &mem_stat), 10);

    let keys = column_ref((0..10i64).collect::<Vec<_>>());
    let values = column_ref((0..10).map(|i| format!("value {}", i)).collect::<Vec<_>>());
    let err = table
        .accumulate_keys(&[0; 10], &keys, &values)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AGGREGATE_MEMORY_EXCEEDED);
    assert!(err.is_retryable_by_spill());

    // nothing from the batch is retained, only the group slot stays charged
    assert_eq!(table.retained_entries(), 0);
    assert_eq!(table.get(0).unwrap().phase(), MapAggPhase::Empty);
    assert_eq!(table.get(0).unwrap().estimated_bytes(), 0);
    assert_eq!(table.estimated_bytes(), mem_stat.get_memory_usage());

    // retrying the same batch with room to spare sees no duplicate keys
    mem_stat.set_limit(0);
    table.accumulate_keys(&[0; 10], &keys, &values).unwrap();
    assert_eq!(table.retained_entries(), 10);

    let column = finalize_table(&mut table).unwrap();
    assert_eq!(row_entries(&column, 0).len(), 10);
}

#[test]
fn test_failed_accumulate_keys_keeps_earlier_batches() {
    let mem_stat = MemStat::create("test_failed_accumulate_keys_keeps_earlier_batches");
    let mut table = MapAggStateTable::create(limited_config(DuplicateKeyMode::Reject, &mem_stat), 10);
    table
        .accumulate_keys(&[0, 1], &column_ref(vec![1i64, 2]), &column_ref(vec!["a", "b"]))
        .unwrap();
    let before = mem_stat.get_memory_usage();

    // group 1 gets a key, then group 0 is refused
    mem_stat.set_limit(before as i64 + 100);
    let values = column_ref(vec!["c".to_string(), "d".repeat(200)]);
    let err = table
        .accumulate_keys(&[1, 0], &column_ref(vec![3i64, 4]), &values)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AGGREGATE_MEMORY_EXCEEDED);
    assert!(err.message().ends_with("(group id: 0)"));

    assert_eq!(table.get(0).unwrap().retained_entries(), 1);
    assert_eq!(table.get(1).unwrap().retained_entries(), 1);
    assert_eq!(table.get(1).unwrap().phase(), MapAggPhase::Accumulating);
    assert_eq!(mem_stat.get_memory_usage(), before);
}

#[test]
fn test_failed_batch_merge_is_rolled_back() {
    let cfg = config(DuplicateKeyMode::Reject);
    let mut source = MapAggStateTable::create(cfg, 10);
    let keys = column_ref((0..10i64).collect::<Vec<_>>());
    let values = column_ref(vec!["v".repeat(200); 10]);
    source
        .accumulate_keys(&[0, 0, 0, 0, 0, 1, 1, 1, 1, 1], &keys, &values)
        .unwrap();
    let states = source.batch_serialize(&[0, 1]).unwrap();

    let mem_stat = MemStat::create("test_failed_batch_merge_is_rolled_back");
    mem_stat.set_limit(2000);
    let mut table = MapAggStateTable::create(limited_config(DuplicateKeyMode::Reject, &mem_stat), 10);

    // the first snapshot row fits, the second one does not
    let err = table.batch_merge(&[0, 1], &states).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AGGREGATE_MEMORY_EXCEEDED);
    assert_eq!(table.retained_entries(), 0);
    assert_eq!(table.get(0).unwrap().phase(), MapAggPhase::Empty);
    assert_eq!(table.estimated_bytes(), mem_stat.get_memory_usage());

    mem_stat.set_limit(0);
    table.batch_merge(&[0, 1], &states).unwrap();
    assert_eq!(table.retained_entries(), 10);
    let column = finalize_table(&mut table).unwrap();
    assert_eq!(row_entries(&column, 0).len(), 5);
    assert_eq!(row_entries(&column, 1).len(), 5);
}

#[test]
fn test_table_growth_is_charged() {
    let mem_stat = MemStat::create("test_table_growth_is_charged");
    mem_stat.set_limit(1024);
    let mut table =
        MapAggStateTable::create(limited_config(DuplicateKeyMode::Overwrite, &mem_stat), i32::MAX as i64);

    let err = table.get_or_create(2_000_000).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AGGREGATE_MEMORY_EXCEEDED);
    assert_eq!(table.size(), 0);
    assert_eq!(mem_stat.get_memory_usage(), 0);

    let err = table.ensure_capacity(2_000_000).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AGGREGATE_MEMORY_EXCEEDED);
    assert_eq!(table.size(), 0);

    table.ensure_capacity(2).unwrap();
    assert_eq!(table.size(), 3);
    assert!(mem_stat.get_memory_usage() > 0);
    assert_eq!(table.estimated_bytes(), mem_stat.get_memory_usage());

    drop(table);
    assert_eq!(mem_stat.get_memory_usage(), 0);
}

#[test]
fn test_table_debug() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Reject), 10);
    table.ensure_capacity(1).unwrap();
    let debug = format!("{:?}", table);
    assert!(debug.contains("groups: 2"));
    assert!(debug.contains("finalized: false"));
}

#[test]
fn test_accumulate_keys_checks_input() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 100);

    let err = table
        .accumulate_keys(&[0, 1], &column_ref(vec![1i64]), &column_ref(vec!["a"]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BAD_ARGUMENTS);

    let err = table
        .accumulate_keys(&[0], &column_ref(vec!["k"]), &column_ref(vec!["a"]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TYPE_MISMATCH);

    let err = table
        .accumulate_keys(&[-5], &column_ref(vec![1i64]), &column_ref(vec!["a"]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::INVALID_GROUP_ID);
    assert_eq!(table.size(), 0);
}

/// Splits the input between two partial tables, ships their states through
/// the column codec and merges them into a final table.
#[test]
fn test_two_stage_aggregation() {
    ensure_tracing_initialized();

    let cfg = config(DuplicateKeyMode::Overwrite);
    let keys = column_ref(vec![1i64, 2, 1, 3, 2, 4]);
    let values = column_ref(vec!["a", "b", "c", "d", "e", "f"]);
    let group_ids = [0, 1, 0, 1, 1, 0];

    let mut single = MapAggStateTable::create(cfg.clone(), 10);
    single.accumulate_keys(&group_ids, &keys, &values).unwrap();
    let expected = finalize_table(&mut single).unwrap();

    let mut partials = vec![];
    for range in [0..3, 3..6] {
        let mut partial = MapAggStateTable::create(cfg.clone(), 10);
        partial
            .accumulate_keys(
                &group_ids[range.clone()],
                &column_ref(keys.slice(range.clone())),
                &column_ref(values.slice(range)),
            )
            .unwrap();
        let states = partial.batch_serialize(&[0, 1]).unwrap();
        // partial states stay usable after shipping
        partial.get_or_create(0).unwrap();
        partials.push(serialize_column(&states).unwrap());
    }

    let mut merged = MapAggStateTable::create(cfg, 10);
    for bytes in partials {
        let states = deserialize_column(&bytes).unwrap();
        merged.batch_merge(&[0, 1], &states).unwrap();
    }
    let actual = finalize_table(&mut merged).unwrap();

    assert_eq!(actual.len(), 2);
    for row in 0..2 {
        assert_eq!(row_entries(&actual, row), row_entries(&expected, row));
    }
    assert_eq!(row_entries(&actual, 0), vec![
        (Scalar::from(1i64), Scalar::from("c")),
        (Scalar::from(4i64), Scalar::from("f")),
    ]);
}

#[test]
fn test_batch_serialize_unknown_group() {
    let table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 10);
    let err = table.batch_serialize(&[3]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::INVALID_GROUP_ID);
}

#[test]
fn test_batch_merge_malformed() {
    let mut table = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 10);

    let err = table
        .batch_merge(&[0], &Column::from(vec![1i64]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);

    let mut other = MapAggStateTable::create(
        config_with(DuplicateKeyMode::Overwrite, DataType::String, DataType::String),
        10,
    );
    other.get_or_create(0).unwrap();
    let states = other.batch_serialize(&[0]).unwrap();
    let err = table.batch_merge(&[0], &states).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);
    assert!(!err.is_programmer_error());

    let mut source = MapAggStateTable::create(config(DuplicateKeyMode::Overwrite), 10);
    source.ensure_capacity(1).unwrap();
    let states = source.batch_serialize(&[0, 1]).unwrap();
    let err = table.batch_merge(&[0], &states).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MALFORMED_STATE_SNAPSHOT);

    assert_eq!(table.size(), 0);
}

#[test]
fn test_table_memory_introspection() {
    let mem_stat = MemStat::create("test_table_memory_introspection");
    let cfg = MapAggConfig::create(
        DuplicateKeyMode::Overwrite,
        DataType::Int64,
        DataType::String,
        NullKeyBehavior::Skip,
        MemorySettings {
            max_memory_usage: 1 << 20,
            enable_spill: true,
            spill_threshold: 2000,
            memory_tracking: mem_stat.clone(),
        },
    );
    let mut table = MapAggStateTable::create(cfg, 10);

    table
        .accumulate_keys(&[0, 1], &column_ref(vec![1i64, 2]), &column_ref(vec!["a", "b"]))
        .unwrap();
    assert!(!table.spill_requested());
    assert_eq!(table.estimated_bytes(), mem_stat.get_memory_usage());

    let keys = column_ref((0..10i64).collect::<Vec<_>>());
    let values = column_ref(vec!["v".repeat(200); 10]);
    table
        .accumulate_keys(&[1; 10], &keys, &values)
        .unwrap();
    assert!(table.spill_requested());
    assert_eq!(table.retained_entries(), 12);
    assert_eq!(table.estimated_bytes(), mem_stat.get_memory_usage());

    drop(table);
    assert_eq!(mem_stat.get_memory_usage(), 0);
}
