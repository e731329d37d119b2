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

use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::settings::Settings;

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(untagged)]
pub enum UserSettingValue {
    UInt64(u64),
    String(String),
}

impl UserSettingValue {
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            UserSettingValue::UInt64(val) => Ok(*val),
            UserSettingValue::String(val) => Err(ErrorCode::BadArguments(format!(
                "Setting value {:?} is not an integer",
                val
            ))),
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            UserSettingValue::UInt64(val) => val.to_string(),
            UserSettingValue::String(val) => val.clone(),
        }
    }
}

impl Display for UserSettingValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UserSettingValue::UInt64(v) => write!(f, "{}", v),
            UserSettingValue::String(v) => write!(f, "{}", v),
        }
    }
}

/// What map aggregates do with a row whose key is NULL.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NullKeyBehavior {
    Skip,
    Error,
}

impl NullKeyBehavior {
    pub fn parse(value: &str) -> Result<NullKeyBehavior> {
        match value.to_lowercase().as_str() {
            "skip" => Ok(NullKeyBehavior::Skip),
            "error" => Ok(NullKeyBehavior::Error),
            other => Err(ErrorCode::WrongValueForVariable(format!(
                "Unknown null key behavior {:?}, expected 'skip' or 'error'",
                other
            ))),
        }
    }
}

impl Settings {
    fn try_get_u64(&self, key: &str) -> Result<u64> {
        self.get_setting(key)?.as_u64()
    }

    fn try_get_string(&self, key: &str) -> Result<String> {
        Ok(self.get_setting(key)?.as_string())
    }

    fn try_set_u64(&self, key: &str, val: u64) -> Result<()> {
        self.set_setting(key.to_string(), val.to_string())
    }

    pub fn get_max_aggregate_group_id(&self) -> Result<i64> {
        Ok(self.try_get_u64("max_aggregate_group_id")? as i64)
    }

    pub fn set_max_aggregate_group_id(&self, val: i64) -> Result<()> {
        self.try_set_u64("max_aggregate_group_id", val.max(0) as u64)
    }

    pub fn get_max_memory_usage(&self) -> Result<u64> {
        self.try_get_u64("max_memory_usage")
    }

    pub fn set_max_memory_usage(&self, val: u64) -> Result<()> {
        self.try_set_u64("max_memory_usage", val)
    }

    pub fn get_spilling_memory_ratio(&self) -> Result<usize> {
        Ok(self.try_get_u64("spilling_memory_ratio")? as usize)
    }

    pub fn set_spilling_memory_ratio(&self, val: usize) -> Result<()> {
        self.try_set_u64("spilling_memory_ratio", val as u64)
    }

    pub fn get_map_agg_null_key_behavior(&self) -> Result<NullKeyBehavior> {
        NullKeyBehavior::parse(self.try_get_string("map_agg_null_key_behavior")?.as_str())
    }
}
