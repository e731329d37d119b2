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

pub mod map;
pub mod nullable;
pub mod string;

use borsh::BorshDeserialize;
use borsh::BorshSerialize;
pub use ordered_float::OrderedFloat;

pub use self::map::MapColumn;
pub use self::map::MapColumnBuilder;
pub use self::map::MapRef;
pub use self::nullable::NullableColumn;
pub use self::nullable::NullableColumnBuilder;
pub use self::string::StringColumn;
pub use self::string::StringColumnBuilder;

pub type F64 = OrderedFloat<f64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum DataType {
    Null,
    Boolean,
    Int64,
    UInt64,
    Float64,
    String,
    Nullable(Box<DataType>),
    /// Key type and value type.
    Map(Box<(DataType, DataType)>),
}

impl DataType {
    pub fn new_map(key_type: DataType, value_type: DataType) -> DataType {
        DataType::Map(Box::new((key_type, value_type)))
    }

    pub fn wrap_nullable(&self) -> Self {
        match self {
            DataType::Null | DataType::Nullable(_) => self.clone(),
            _ => DataType::Nullable(Box::new(self.clone())),
        }
    }

    pub fn remove_nullable(&self) -> Self {
        match self {
            DataType::Nullable(ty) => (**ty).clone(),
            _ => self.clone(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, DataType::Nullable(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataType::Null)
    }

    pub fn is_nullable_or_null(&self) -> bool {
        matches!(self, DataType::Nullable(_) | DataType::Null)
    }

    pub fn is_map(&self) -> bool {
        matches!(self, DataType::Map(_))
    }

    pub fn as_map(&self) -> Option<(&DataType, &DataType)> {
        match self {
            DataType::Map(kv) => Some((&kv.0, &kv.1)),
            _ => None,
        }
    }
}
