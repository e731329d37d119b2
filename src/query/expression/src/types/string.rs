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

use std::ops::Range;

use borsh::BorshDeserialize;
use borsh::BorshSerialize;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;

/// Variable length utf8 values laid out back to back, `offsets` has one more
/// element than the column has rows.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StringColumn {
    data: String,
    offsets: Vec<u64>,
}

impl StringColumn {
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn index(&self, index: usize) -> Option<&str> {
        if index + 1 >= self.offsets.len() {
            return None;
        }
        Some(&self.data[self.value_range(index)])
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.len()).map(move |index| &self.data[self.value_range(index)])
    }

    pub fn memory_size(&self) -> usize {
        self.data.len() + self.offsets.len() * 8
    }

    pub fn check_valid(&self) -> Result<()> {
        if self.offsets.is_empty() || self.offsets[0] != 0 {
            return Err(ErrorCode::BadBytes(
                "string column offsets must start with 0",
            ));
        }
        let mut prev = 0;
        for offset in self.offsets.iter().copied() {
            if offset < prev || offset as usize > self.data.len() {
                return Err(ErrorCode::BadBytes(format!(
                    "string column offset {} out of range [{}, {}]",
                    offset,
                    prev,
                    self.data.len()
                )));
            }
            if !self.data.is_char_boundary(offset as usize) {
                return Err(ErrorCode::BadBytes(format!(
                    "string column offset {} is not on a char boundary",
                    offset
                )));
            }
            prev = offset;
        }
        Ok(())
    }

    fn value_range(&self, index: usize) -> Range<usize> {
        self.offsets[index] as usize..self.offsets[index + 1] as usize
    }
}

impl<S: AsRef<str>> FromIterator<S> for StringColumn {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut builder = StringColumnBuilder::with_capacity(0);
        for s in iter {
            builder.put_str(s.as_ref());
            builder.commit_row();
        }
        builder.build()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringColumnBuilder {
    data: String,
    offsets: Vec<u64>,
}

impl StringColumnBuilder {
    pub fn with_capacity(len: usize) -> Self {
        let mut offsets = Vec::with_capacity(len + 1);
        offsets.push(0);
        StringColumnBuilder {
            data: String::new(),
            offsets,
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Appends to the value of the current row, which is ended by `commit_row`.
    #[inline]
    pub fn put_str(&mut self, item: &str) {
        self.data.push_str(item);
    }

    #[inline]
    pub fn commit_row(&mut self) {
        self.offsets.push(self.data.len() as u64);
    }

    pub fn push_default(&mut self) {
        self.commit_row();
    }

    pub fn build(self) -> StringColumn {
        StringColumn {
            data: self.data,
            offsets: self.offsets,
        }
    }
}
