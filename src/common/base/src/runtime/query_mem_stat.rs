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

use std::cell::RefCell;
use std::sync::Arc;

use crate::runtime::MemStat;

thread_local! {
    static QUERY_MEM_STATE: RefCell<Option<Arc<MemStat>>> = const { RefCell::new(None) };
}

/// Binds the memory tracker of the running query to the current thread, so
/// aggregate states created on it charge that query.
pub struct QueryMemState {}

impl QueryMemState {
    /// Attaches `mem_stat` until the guard is dropped, which restores
    /// whatever was attached before.
    pub fn attach(mem_stat: Arc<MemStat>) -> QueryMemStatGuard {
        let save = QUERY_MEM_STATE.with(|state| state.replace(Some(mem_stat)));
        QueryMemStatGuard { save }
    }

    /// Sets `limit` on `mem_stat` and attaches it.
    pub fn attach_with_limit(mem_stat: Arc<MemStat>, limit: i64) -> QueryMemStatGuard {
        mem_stat.set_limit(limit);
        Self::attach(mem_stat)
    }

    pub fn current() -> Option<Arc<MemStat>> {
        QUERY_MEM_STATE.with(|state| state.borrow().clone())
    }

    /// The attached tracker, or a fresh unlimited one named `name` when
    /// nothing is attached to this thread.
    pub fn current_or_create(name: impl Into<String>) -> Arc<MemStat> {
        Self::current().unwrap_or_else(|| MemStat::create(name))
    }
}

#[must_use]
pub struct QueryMemStatGuard {
    save: Option<Arc<MemStat>>,
}

impl Drop for QueryMemStatGuard {
    fn drop(&mut self) {
        let save = self.save.take();
        QUERY_MEM_STATE.with(|state| {
            state.replace(save);
        });
    }
}
