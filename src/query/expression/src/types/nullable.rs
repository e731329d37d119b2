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

use borsh::BorshDeserialize;
use borsh::BorshSerialize;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;

use crate::types::DataType;
use crate::values::Column;
use crate::values::ColumnBuilder;
use crate::values::ScalarRef;

#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct NullableColumn {
    pub column: Column,
    pub validity: Vec<bool>,
}

impl NullableColumn {
    pub fn len(&self) -> usize {
        self.validity.len()
    }

    pub fn index(&self, index: usize) -> Option<ScalarRef<'_>> {
        match self.validity.get(index) {
            Some(true) => self.column.index(index),
            Some(false) => Some(ScalarRef::Null),
            None => None,
        }
    }

    pub fn memory_size(&self) -> usize {
        self.column.memory_size() + self.validity.len()
    }

    pub fn check_valid(&self) -> Result<()> {
        if self.column.len() != self.validity.len() {
            return Err(ErrorCode::BadBytes(format!(
                "nullable column length {} does not match validity length {}",
                self.column.len(),
                self.validity.len()
            )));
        }
        if self.column.data_type().is_nullable_or_null() {
            return Err(ErrorCode::BadBytes("nested nullable column"));
        }
        self.column.check_valid()
    }
}

#[derive(Clone, Debug)]
pub struct NullableColumnBuilder {
    pub builder: ColumnBuilder,
    pub validity: Vec<bool>,
}

impl NullableColumnBuilder {
    pub fn with_capacity(inner_type: &DataType, capacity: usize) -> Self {
        NullableColumnBuilder {
            builder: ColumnBuilder::with_capacity(inner_type, capacity),
            validity: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.validity.len()
    }

    pub fn push(&mut self, item: ScalarRef) -> Result<()> {
        if item.is_null() {
            self.push_null();
            return Ok(());
        }
        self.builder.push(item)?;
        self.validity.push(true);
        Ok(())
    }

    pub fn push_null(&mut self) {
        self.builder.push_default();
        self.validity.push(false);
    }

    pub fn build(self) -> NullableColumn {
        NullableColumn {
            column: self.builder.build(),
            validity: self.validity,
        }
    }
}
