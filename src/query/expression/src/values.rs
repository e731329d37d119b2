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

use borsh::BorshDeserialize;
use borsh::BorshSerialize;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;

use crate::types::DataType;
use crate::types::MapColumn;
use crate::types::MapColumnBuilder;
use crate::types::MapRef;
use crate::types::NullableColumn;
use crate::types::NullableColumnBuilder;
use crate::types::StringColumn;
use crate::types::StringColumnBuilder;
use crate::types::F64;

/// Input blocks are shared immutably between the operator and the aggregate
/// states that reference their rows.
pub type ColumnRef = Arc<Column>;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum ScalarRef<'a> {
    #[default]
    Null,
    Boolean(bool),
    Int64(i64),
    UInt64(u64),
    Float64(F64),
    String(&'a str),
    Map(MapRef<'a>),
}

#[derive(Clone, PartialEq, Debug)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Int64(i64),
    UInt64(u64),
    Float64(F64),
    String(String),
    Map(MapScalar),
}

/// An owned map value: parallel key and value columns of equal length.
#[derive(Clone, PartialEq, Debug)]
pub struct MapScalar {
    pub keys: Column,
    pub values: Column,
}

#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum Column {
    Null { len: usize },
    Boolean(Vec<bool>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float64(Vec<f64>),
    String(StringColumn),
    Nullable(Box<NullableColumn>),
    Map(Box<MapColumn>),
}

#[derive(Clone, Debug)]
pub enum ColumnBuilder {
    Null { len: usize },
    Boolean(Vec<bool>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float64(Vec<f64>),
    String(StringColumnBuilder),
    Nullable(Box<NullableColumnBuilder>),
    Map(Box<MapColumnBuilder>),
}

impl<'a> ScalarRef<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarRef::Null)
    }

    pub fn to_owned(&self) -> Scalar {
        match self {
            ScalarRef::Null => Scalar::Null,
            ScalarRef::Boolean(b) => Scalar::Boolean(*b),
            ScalarRef::Int64(i) => Scalar::Int64(*i),
            ScalarRef::UInt64(i) => Scalar::UInt64(*i),
            ScalarRef::Float64(f) => Scalar::Float64(*f),
            ScalarRef::String(s) => Scalar::String(s.to_string()),
            ScalarRef::Map(m) => {
                let positions = m.positions();
                Scalar::Map(MapScalar {
                    keys: m.keys().slice(positions.clone()),
                    values: m.values().slice(positions),
                })
            }
        }
    }

    /// Estimated bytes needed to hold an owned copy of the value.
    pub fn memory_size(&self) -> usize {
        match self {
            ScalarRef::Null => 0,
            ScalarRef::Boolean(_) => 1,
            ScalarRef::Int64(_) | ScalarRef::UInt64(_) | ScalarRef::Float64(_) => 8,
            ScalarRef::String(s) => s.len(),
            ScalarRef::Map(m) => m.memory_size(),
        }
    }

    pub fn as_map(&self) -> Option<&MapRef<'a>> {
        match self {
            ScalarRef::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl Scalar {
    pub fn as_ref(&self) -> ScalarRef<'_> {
        match self {
            Scalar::Null => ScalarRef::Null,
            Scalar::Boolean(b) => ScalarRef::Boolean(*b),
            Scalar::Int64(i) => ScalarRef::Int64(*i),
            Scalar::UInt64(i) => ScalarRef::UInt64(*i),
            Scalar::Float64(f) => ScalarRef::Float64(*f),
            Scalar::String(s) => ScalarRef::String(s.as_str()),
            Scalar::Map(m) => ScalarRef::Map(MapRef::new(&m.keys, &m.values)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int64(value)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::UInt64(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float64(F64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Boolean(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Scalar::Null,
        }
    }
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Null { len } => *len,
            Column::Boolean(col) => col.len(),
            Column::Int64(col) => col.len(),
            Column::UInt64(col) => col.len(),
            Column::Float64(col) => col.len(),
            Column::String(col) => col.len(),
            Column::Nullable(col) => col.len(),
            Column::Map(col) => col.len(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::Null { .. } => DataType::Null,
            Column::Boolean(_) => DataType::Boolean,
            Column::Int64(_) => DataType::Int64,
            Column::UInt64(_) => DataType::UInt64,
            Column::Float64(_) => DataType::Float64,
            Column::String(_) => DataType::String,
            Column::Nullable(col) => col.column.data_type().wrap_nullable(),
            Column::Map(col) => DataType::new_map(col.key_type(), col.value_type()),
        }
    }

    pub fn index(&self, index: usize) -> Option<ScalarRef<'_>> {
        match self {
            Column::Null { len } => (index < *len).then_some(ScalarRef::Null),
            Column::Boolean(col) => col.get(index).copied().map(ScalarRef::Boolean),
            Column::Int64(col) => col.get(index).copied().map(ScalarRef::Int64),
            Column::UInt64(col) => col.get(index).copied().map(ScalarRef::UInt64),
            Column::Float64(col) => col
                .get(index)
                .map(|v| ScalarRef::Float64(F64::from(*v))),
            Column::String(col) => col.index(index).map(ScalarRef::String),
            Column::Nullable(col) => col.index(index),
            Column::Map(col) => col.index(index).map(ScalarRef::Map),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ScalarRef<'_>> + '_ {
        (0..self.len()).map(move |index| self.index(index).unwrap_or_default())
    }

    /// Copies the rows in `range` into a new column.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Column {
        let mut builder = ColumnBuilder::with_capacity(&self.data_type(), range.len());
        for index in range {
            if let Some(item) = self.index(index) {
                builder.push_unchecked(item);
            }
        }
        builder.build()
    }

    pub fn memory_size(&self) -> usize {
        match self {
            Column::Null { .. } => size_of::<usize>(),
            Column::Boolean(col) => col.len(),
            Column::Int64(col) => col.len() * 8,
            Column::UInt64(col) => col.len() * 8,
            Column::Float64(col) => col.len() * 8,
            Column::String(col) => col.memory_size(),
            Column::Nullable(col) => col.memory_size(),
            Column::Map(col) => col.memory_size(),
        }
    }

    pub fn as_map(&self) -> Option<&MapColumn> {
        match self {
            Column::Map(col) => Some(col),
            _ => None,
        }
    }

    pub fn wrap_nullable(self, validity: Option<Vec<bool>>) -> Column {
        match self {
            col @ (Column::Null { .. } | Column::Nullable(_)) => col,
            col => {
                let validity = validity.unwrap_or_else(|| vec![true; col.len()]);
                Column::Nullable(Box::new(NullableColumn {
                    column: col,
                    validity,
                }))
            }
        }
    }

    /// Check structural invariants of columns that came from untrusted bytes.
    pub fn check_valid(&self) -> Result<()> {
        match self {
            Column::String(col) => col.check_valid(),
            Column::Nullable(col) => col.check_valid(),
            Column::Map(col) => col.check_valid(),
            _ => Ok(()),
        }
    }

    pub fn from_scalars(data_type: &DataType, scalars: &[Scalar]) -> Result<Column> {
        let mut builder = ColumnBuilder::with_capacity(data_type, scalars.len());
        for scalar in scalars {
            builder.push(scalar.as_ref())?;
        }
        Ok(builder.build())
    }
}

impl From<Vec<bool>> for Column {
    fn from(value: Vec<bool>) -> Self {
        Column::Boolean(value)
    }
}

impl From<Vec<i64>> for Column {
    fn from(value: Vec<i64>) -> Self {
        Column::Int64(value)
    }
}

impl From<Vec<u64>> for Column {
    fn from(value: Vec<u64>) -> Self {
        Column::UInt64(value)
    }
}

impl From<Vec<f64>> for Column {
    fn from(value: Vec<f64>) -> Self {
        Column::Float64(value)
    }
}

impl From<Vec<&str>> for Column {
    fn from(value: Vec<&str>) -> Self {
        Column::String(value.into_iter().collect())
    }
}

impl From<Vec<String>> for Column {
    fn from(value: Vec<String>) -> Self {
        Column::String(value.into_iter().collect())
    }
}

impl ColumnBuilder {
    pub fn with_capacity(data_type: &DataType, capacity: usize) -> ColumnBuilder {
        match data_type {
            DataType::Null => ColumnBuilder::Null { len: 0 },
            DataType::Boolean => ColumnBuilder::Boolean(Vec::with_capacity(capacity)),
            DataType::Int64 => ColumnBuilder::Int64(Vec::with_capacity(capacity)),
            DataType::UInt64 => ColumnBuilder::UInt64(Vec::with_capacity(capacity)),
            DataType::Float64 => ColumnBuilder::Float64(Vec::with_capacity(capacity)),
            DataType::String => ColumnBuilder::String(StringColumnBuilder::with_capacity(capacity)),
            DataType::Nullable(ty) => ColumnBuilder::Nullable(Box::new(
                NullableColumnBuilder::with_capacity(ty, capacity),
            )),
            DataType::Map(kv) => ColumnBuilder::Map(Box::new(MapColumnBuilder::with_capacity(
                &kv.0, &kv.1, capacity,
            ))),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuilder::Null { len } => *len,
            ColumnBuilder::Boolean(builder) => builder.len(),
            ColumnBuilder::Int64(builder) => builder.len(),
            ColumnBuilder::UInt64(builder) => builder.len(),
            ColumnBuilder::Float64(builder) => builder.len(),
            ColumnBuilder::String(builder) => builder.len(),
            ColumnBuilder::Nullable(builder) => builder.len(),
            ColumnBuilder::Map(builder) => builder.len(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnBuilder::Null { .. } => DataType::Null,
            ColumnBuilder::Boolean(_) => DataType::Boolean,
            ColumnBuilder::Int64(_) => DataType::Int64,
            ColumnBuilder::UInt64(_) => DataType::UInt64,
            ColumnBuilder::Float64(_) => DataType::Float64,
            ColumnBuilder::String(_) => DataType::String,
            ColumnBuilder::Nullable(builder) => builder.builder.data_type().wrap_nullable(),
            ColumnBuilder::Map(builder) => builder.data_type(),
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut MapColumnBuilder> {
        match self {
            ColumnBuilder::Map(builder) => Some(builder),
            _ => None,
        }
    }

    /// Appends one value, failing if its type does not fit the builder.
    pub fn push(&mut self, item: ScalarRef) -> Result<()> {
        match (self, item) {
            (ColumnBuilder::Null { len }, ScalarRef::Null) => *len += 1,
            (ColumnBuilder::Boolean(builder), ScalarRef::Boolean(v)) => builder.push(v),
            (ColumnBuilder::Int64(builder), ScalarRef::Int64(v)) => builder.push(v),
            (ColumnBuilder::UInt64(builder), ScalarRef::UInt64(v)) => builder.push(v),
            (ColumnBuilder::Float64(builder), ScalarRef::Float64(v)) => builder.push(v.0),
            (ColumnBuilder::String(builder), ScalarRef::String(v)) => {
                builder.put_str(v);
                builder.commit_row();
            }
            (ColumnBuilder::Nullable(builder), item) => builder.push(item)?,
            (ColumnBuilder::Map(builder), ScalarRef::Map(v)) => builder.push(v)?,
            (builder, item) => {
                return Err(ErrorCode::BadDataValueType(format!(
                    "cannot append {} to a column of type {}",
                    item,
                    builder.data_type()
                )));
            }
        }
        Ok(())
    }

    fn push_unchecked(&mut self, item: ScalarRef) {
        let result = self.push(item);
        debug_assert!(result.is_ok());
    }

    pub fn push_default(&mut self) {
        match self {
            ColumnBuilder::Null { len } => *len += 1,
            ColumnBuilder::Boolean(builder) => builder.push(false),
            ColumnBuilder::Int64(builder) => builder.push(0),
            ColumnBuilder::UInt64(builder) => builder.push(0),
            ColumnBuilder::Float64(builder) => builder.push(0.0),
            ColumnBuilder::String(builder) => builder.push_default(),
            ColumnBuilder::Nullable(builder) => builder.push_null(),
            ColumnBuilder::Map(builder) => builder.push_default(),
        }
    }

    pub fn append_column(&mut self, other: &Column) -> Result<()> {
        for item in other.iter() {
            self.push(item)?;
        }
        Ok(())
    }

    pub fn build(self) -> Column {
        match self {
            ColumnBuilder::Null { len } => Column::Null { len },
            ColumnBuilder::Boolean(builder) => Column::Boolean(builder),
            ColumnBuilder::Int64(builder) => Column::Int64(builder),
            ColumnBuilder::UInt64(builder) => Column::UInt64(builder),
            ColumnBuilder::Float64(builder) => Column::Float64(builder),
            ColumnBuilder::String(builder) => Column::String(builder.build()),
            ColumnBuilder::Nullable(builder) => Column::Nullable(Box::new(builder.build())),
            ColumnBuilder::Map(builder) => Column::Map(Box::new(builder.build())),
        }
    }
}
