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
use mapagg_common_exception::Result;

use crate::Settings;

/// Memory budget of one query as seen by its aggregate states.
#[derive(Clone)]
pub struct MemorySettings {
    pub max_memory_usage: usize,
    pub enable_spill: bool,
    pub spill_threshold: usize,
    pub memory_tracking: Arc<MemStat>,
}

impl MemorySettings {
    /// Builds the budget from the query settings and applies `max_memory_usage`
    /// as the hard limit of `memory_tracking`.
    pub fn from_settings(settings: &Settings, memory_tracking: Arc<MemStat>) -> Result<Self> {
        let max_memory_usage = settings.get_max_memory_usage()? as usize;
        let spilling_memory_ratio = settings.get_spilling_memory_ratio()?;

        memory_tracking.set_limit(max_memory_usage as i64);

        let enable_spill = max_memory_usage != 0 && spilling_memory_ratio != 0;
        let spill_threshold = match enable_spill {
            true => max_memory_usage / 100 * spilling_memory_ratio,
            false => usize::MAX,
        };

        Ok(MemorySettings {
            max_memory_usage,
            enable_spill,
            spill_threshold,
            memory_tracking,
        })
    }

    pub fn disable_spill() -> MemorySettings {
        MemorySettings {
            max_memory_usage: usize::MAX,
            enable_spill: false,
            spill_threshold: usize::MAX,
            memory_tracking: MemStat::create("unlimited"),
        }
    }

    pub fn check_spill(&self) -> bool {
        self.enable_spill && self.memory_tracking.get_memory_usage() >= self.spill_threshold
    }
}
