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
use mapagg_common_expression::ScalarRef;
use pretty_assertions::assert_eq;

fn map_column() -> Column {
    let mut builder =
        MapColumnBuilder::with_capacity(&DataType::String, &DataType::Int64.wrap_nullable(), 2);
    builder.push_entry(ScalarRef::String("k1"), ScalarRef::Int64(1)).unwrap();
    builder.push_entry(ScalarRef::String("k2"), ScalarRef::Null).unwrap();
    builder.commit_row();
    builder.push_default();
    Column::Map(Box::new(builder.build()))
}

#[test]
fn test_serialize_columns() {
    let columns = vec![
        Column::Null { len: 3 },
        Column::from(vec![true, false]),
        Column::from(vec![-1i64, 0, 1]),
        Column::from(vec![u64::MAX]),
        Column::from(vec![1.5f64, -0.0]),
        Column::from(vec!["", "databend", "ünïcode"]),
        Column::from(vec![1u64, 2]).wrap_nullable(Some(vec![false, true])),
        map_column(),
    ];

    for column in columns {
        let bytes = serialize_column(&column).unwrap();
        let decoded = deserialize_column(&bytes).unwrap();
        assert_eq!(decoded, column);
        assert_eq!(decoded.data_type(), column.data_type());
    }
}

#[test]
fn test_deserialize_rejects_bad_bytes() {
    let bytes = serialize_column(&map_column()).unwrap();

    let err = deserialize_column(&[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BAD_BYTES);

    let mut wrong_version = bytes.clone();
    wrong_version[0] = 42;
    let err = deserialize_column(&wrong_version).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BAD_BYTES);

    let err = deserialize_column(&bytes[..bytes.len() - 3]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BAD_BYTES);
}

#[test]
fn test_deserialize_checks_structure() {
    let mut builder = MapColumnBuilder::with_capacity(&DataType::Int64, &DataType::Int64, 1);
    builder.push_entry(ScalarRef::Int64(1), ScalarRef::Int64(1)).unwrap();
    builder.commit_row();
    let mut map = builder.build();
    // points past the last entry
    map.offsets[1] = 5;

    let bytes = serialize_column(&Column::Map(Box::new(map))).unwrap();
    let err = deserialize_column(&bytes).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BAD_BYTES);
}
