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

use std::fmt::Display;
use std::fmt::Formatter;

use itertools::Itertools;

use crate::types::DataType;
use crate::types::MapRef;
use crate::values::Scalar;
use crate::values::ScalarRef;

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "NULL"),
            DataType::Boolean => write!(f, "Boolean"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::UInt64 => write!(f, "UInt64"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::String => write!(f, "String"),
            DataType::Nullable(inner) => write!(f, "Nullable({inner})"),
            DataType::Map(kv) => write!(f, "Map({}, {})", kv.0, kv.1),
        }
    }
}

impl Display for ScalarRef<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarRef::Null => write!(f, "NULL"),
            ScalarRef::Boolean(val) => write!(f, "{val}"),
            ScalarRef::Int64(val) => write!(f, "{val}"),
            ScalarRef::UInt64(val) => write!(f, "{val}"),
            ScalarRef::Float64(val) => write!(f, "{:?}", val.0),
            ScalarRef::String(s) => write!(f, "'{}'", s.escape_default()),
            ScalarRef::Map(map) => write!(f, "{map}"),
        }
    }
}

impl Display for MapRef<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.iter().map(|(k, v)| format!("{k}:{v}")).join(", ")
        )
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}
