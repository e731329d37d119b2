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

use std::cmp::Ordering;
use std::hash::Hash;
use std::hash::Hasher;

use borsh::BorshDeserialize;
use borsh::BorshSerialize;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;

use crate::types::DataType;
use crate::values::Column;
use crate::values::ColumnBuilder;
use crate::values::ScalarRef;

/// A column of maps: the entries of all rows are stored in the parallel `keys`
/// and `values` columns, row `i` owns entries `offsets[i]..offsets[i + 1]`.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct MapColumn {
    pub offsets: Vec<u64>,
    pub keys: Column,
    pub values: Column,
}

impl MapColumn {
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn key_type(&self) -> DataType {
        self.keys.data_type()
    }

    pub fn value_type(&self) -> DataType {
        self.values.data_type()
    }

    pub fn index(&self, row: usize) -> Option<MapRef<'_>> {
        if row + 1 >= self.offsets.len() {
            return None;
        }
        Some(MapRef {
            keys: &self.keys,
            values: &self.values,
            start: self.offsets[row] as usize,
            end: self.offsets[row + 1] as usize,
        })
    }

    pub fn memory_size(&self) -> usize {
        self.offsets.len() * 8 + self.keys.memory_size() + self.values.memory_size()
    }

    pub fn check_valid(&self) -> Result<()> {
        if self.offsets.is_empty() || self.offsets[0] != 0 {
            return Err(ErrorCode::BadBytes("map column offsets must start with 0"));
        }
        if self.keys.len() != self.values.len() {
            return Err(ErrorCode::BadBytes(format!(
                "map column has {} keys but {} values",
                self.keys.len(),
                self.values.len()
            )));
        }
        let mut prev = 0;
        for offset in self.offsets.iter().copied() {
            if offset < prev || offset as usize > self.keys.len() {
                return Err(ErrorCode::BadBytes(format!(
                    "map column offset {} out of range [{}, {}]",
                    offset,
                    prev,
                    self.keys.len()
                )));
            }
            prev = offset;
        }
        if prev as usize != self.keys.len() {
            return Err(ErrorCode::BadBytes(format!(
                "map column offsets end at {} but there are {} entries",
                prev,
                self.keys.len()
            )));
        }
        self.keys.check_valid()?;
        self.values.check_valid()
    }
}

/// One row of a map column, borrowed.
#[derive(Clone, Copy, Debug)]
pub struct MapRef<'a> {
    keys: &'a Column,
    values: &'a Column,
    start: usize,
    end: usize,
}

impl<'a> MapRef<'a> {
    pub fn new(keys: &'a Column, values: &'a Column) -> MapRef<'a> {
        debug_assert_eq!(keys.len(), values.len());
        MapRef {
            keys,
            values,
            start: 0,
            end: keys.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn key_type(&self) -> DataType {
        self.keys.data_type()
    }

    pub fn value_type(&self) -> DataType {
        self.values.data_type()
    }

    /// Positions of this row's entries in `keys()` / `values()`.
    pub fn positions(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    pub fn keys(&self) -> &'a Column {
        self.keys
    }

    pub fn values(&self) -> &'a Column {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScalarRef<'a>, ScalarRef<'a>)> + 'a {
        let keys = self.keys;
        let values = self.values;
        (self.start..self.end).map(move |i| {
            (
                keys.index(i).unwrap_or_default(),
                values.index(i).unwrap_or_default(),
            )
        })
    }

    pub fn memory_size(&self) -> usize {
        self.iter()
            .map(|(k, v)| k.memory_size() + v.memory_size())
            .sum()
    }
}

impl PartialEq for MapRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for MapRef<'_> {}

impl PartialOrd for MapRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MapRef<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl Hash for MapRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for (k, v) in self.iter() {
            k.hash(state);
            v.hash(state);
        }
    }
}

/// Builds a map column row by row: push the entries of a row with
/// `push_key`/`push_value` (or `push_entry`), then close the row with
/// `commit_row`.
#[derive(Clone, Debug)]
pub struct MapColumnBuilder {
    offsets: Vec<u64>,
    keys: ColumnBuilder,
    values: ColumnBuilder,
}

impl MapColumnBuilder {
    pub fn with_capacity(key_type: &DataType, value_type: &DataType, capacity: usize) -> Self {
        let mut offsets = Vec::with_capacity(capacity + 1);
        offsets.push(0);
        MapColumnBuilder {
            offsets,
            keys: ColumnBuilder::with_capacity(key_type, capacity),
            values: ColumnBuilder::with_capacity(value_type, capacity),
        }
    }

    /// Number of committed rows.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn key_type(&self) -> DataType {
        self.keys.data_type()
    }

    pub fn value_type(&self) -> DataType {
        self.values.data_type()
    }

    pub fn data_type(&self) -> DataType {
        DataType::new_map(self.key_type(), self.value_type())
    }

    pub fn push_key(&mut self, key: ScalarRef) -> Result<()> {
        self.keys.push(key)
    }

    pub fn push_value(&mut self, value: ScalarRef) -> Result<()> {
        self.values.push(value)
    }

    pub fn push_entry(&mut self, key: ScalarRef, value: ScalarRef) -> Result<()> {
        self.push_key(key)?;
        self.push_value(value)
    }

    #[inline]
    pub fn commit_row(&mut self) {
        debug_assert_eq!(self.keys.len(), self.values.len());
        self.offsets.push(self.keys.len() as u64);
    }

    /// Appends a whole map row.
    pub fn push(&mut self, item: MapRef) -> Result<()> {
        for (key, value) in item.iter() {
            self.push_entry(key, value)?;
        }
        self.commit_row();
        Ok(())
    }

    /// Appends an empty map row.
    pub fn push_default(&mut self) {
        self.commit_row();
    }

    pub fn build(self) -> MapColumn {
        MapColumn {
            offsets: self.offsets,
            keys: self.keys.build(),
            values: self.values.build(),
        }
    }
}
