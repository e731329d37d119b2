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
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use mapagg_common_exception::ErrorCode;

/// Process-wide tracker, unlimited unless a limit is set explicitly.
pub static GLOBAL_MEM_STAT: MemStat = MemStat::global();

/// Memory usage accounting for one query (or for the whole process).
///
/// Callers report deltas in bytes. A positive delta that would push the usage
/// over the limit is refused and not recorded, negative deltas always succeed.
/// A limit of zero means unlimited.
pub struct MemStat {
    name: String,
    used: AtomicI64,
    peak_used: AtomicI64,
    limit: AtomicI64,
}

impl MemStat {
    pub const fn global() -> MemStat {
        MemStat {
            name: String::new(),
            used: AtomicI64::new(0),
            peak_used: AtomicI64::new(0),
            limit: AtomicI64::new(0),
        }
    }

    pub fn create(name: impl Into<String>) -> Arc<MemStat> {
        Arc::new(MemStat {
            name: name.into(),
            used: AtomicI64::new(0),
            peak_used: AtomicI64::new(0),
            limit: AtomicI64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_limit(&self, limit: i64) {
        self.limit.store(limit.max(0), Ordering::Relaxed);
    }

    pub fn get_limit(&self) -> i64 {
        self.limit.load(Ordering::Relaxed)
    }

    pub fn record_memory(&self, batch_memory_used: i64) -> Result<(), OutOfLimit> {
        let used = self.used.fetch_add(batch_memory_used, Ordering::Relaxed) + batch_memory_used;

        if batch_memory_used > 0 {
            let limit = self.limit.load(Ordering::Relaxed);
            if limit > 0 && used > limit {
                self.used.fetch_sub(batch_memory_used, Ordering::Relaxed);
                return Err(OutOfLimit::new(used, limit));
            }
            self.peak_used.fetch_max(used, Ordering::Relaxed);
        }

        Ok(())
    }

    pub fn get_memory_usage(&self) -> usize {
        self.used.load(Ordering::Relaxed).max(0) as usize
    }

    pub fn get_peak_memory_usage(&self) -> i64 {
        self.peak_used.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfLimit {
    pub value: i64,
    pub limit: i64,
}

impl OutOfLimit {
    pub const fn new(value: i64, limit: i64) -> OutOfLimit {
        OutOfLimit { value, limit }
    }
}

impl Display for OutOfLimit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "memory usage {} exceeds limit {}",
            self.value, self.limit
        )
    }
}

impl From<OutOfLimit> for ErrorCode {
    fn from(value: OutOfLimit) -> Self {
        ErrorCode::AggregateMemoryExceeded(value.to_string())
    }
}
