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
use mapagg_common_exception::Result;

use crate::values::Column;

/// Leading byte of every serialized column; bumped whenever the layout changes.
pub const COLUMN_FORMAT_VERSION: u8 = 1;

/// Encodes a column for transfer between execution stages.
///
/// Every column type, map columns included, goes through this one codec, so
/// intermediate aggregate states look like any other column on the wire.
pub fn serialize_column(column: &Column) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(column.memory_size() + 1);
    buffer.push(COLUMN_FORMAT_VERSION);
    borsh::to_writer(&mut buffer, column)?;
    Ok(buffer)
}

pub fn deserialize_column(bytes: &[u8]) -> Result<Column> {
    let Some((version, body)) = bytes.split_first() else {
        return Err(ErrorCode::BadBytes("empty column buffer"));
    };
    if *version != COLUMN_FORMAT_VERSION {
        return Err(ErrorCode::BadBytes(format!(
            "unsupported column format version {}, expected {}",
            version, COLUMN_FORMAT_VERSION
        )));
    }

    let column: Column = borsh::from_slice(body)?;
    column.check_valid()?;
    Ok(column)
}
