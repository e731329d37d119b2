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

use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::ops::RangeInclusive;
use std::sync::Arc;

use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;
use once_cell::sync::OnceCell;

use crate::settings_getter_setter::UserSettingValue;

static DEFAULT_SETTINGS: OnceCell<Arc<DefaultSettings>> = OnceCell::new();

/// Values a setting accepts.
#[derive(Clone, Debug)]
pub enum SettingRange {
    Numeric(RangeInclusive<u64>),
    /// Matched case-insensitively, stored in the listed spelling.
    String(Vec<&'static str>),
}

impl Display for SettingRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingRange::Numeric(range) => write!(f, "[{}, {}]", range.start(), range.end()),
            SettingRange::String(values) => write!(f, "{:?}", values),
        }
    }
}

impl SettingRange {
    /// Parses `raw` into a value of this range.
    pub fn parse(&self, raw: &str) -> Result<UserSettingValue> {
        match self {
            SettingRange::Numeric(range) => {
                let value = parse_u64(raw)?;
                if !range.contains(&value) {
                    return Err(ErrorCode::WrongValueForVariable(format!(
                        "Value {} is not within the range {}",
                        value, self
                    )));
                }
                Ok(UserSettingValue::UInt64(value))
            }
            SettingRange::String(values) => values
                .iter()
                .find(|allowed| allowed.eq_ignore_ascii_case(raw))
                .map(|allowed| UserSettingValue::String(allowed.to_string()))
                .ok_or_else(|| {
                    ErrorCode::WrongValueForVariable(format!(
                        "Value {} is not within the allowed values {}",
                        raw, self
                    ))
                }),
        }
    }
}

/// Integers may arrive quoted, e.g. from `SET x = '10'`.
fn parse_u64(raw: &str) -> Result<u64> {
    raw.trim_matches(|c: char| c == '\'' || c == '"')
        .parse::<u64>()
        .map_err(|_| {
            ErrorCode::WrongValueForVariable(format!("{} is not a valid integer value", raw))
        })
}

#[derive(Clone, Debug)]
pub struct DefaultSettingValue {
    pub(crate) value: UserSettingValue,
    pub(crate) desc: &'static str,
    pub(crate) range: SettingRange,
}

#[derive(Clone)]
pub struct DefaultSettings {
    pub(crate) settings: HashMap<String, DefaultSettingValue>,
}

impl DefaultSettings {
    pub fn instance() -> Result<Arc<DefaultSettings>> {
        let settings = DEFAULT_SETTINGS.get_or_try_init(|| -> Result<Arc<DefaultSettings>> {
            let settings = [
                ("max_aggregate_group_id", DefaultSettingValue {
                    value: UserSettingValue::UInt64(i32::MAX as u64),
                    desc: "The largest group id an aggregate state table accepts.",
                    range: SettingRange::Numeric(0..=i64::MAX as u64),
                }),
                ("max_memory_usage", DefaultSettingValue {
                    value: UserSettingValue::UInt64(0),
                    desc: "Sets the maximum memory usage in bytes for processing a single query. If set to 0, memory usage is unlimited.",
                    range: SettingRange::Numeric(0..=i64::MAX as u64),
                }),
                ("spilling_memory_ratio", DefaultSettingValue {
                    value: UserSettingValue::UInt64(0),
                    desc: "Percentage of max_memory_usage after which aggregate states ask to be spilled. If set to 0, spilling is disabled.",
                    range: SettingRange::Numeric(0..=100),
                }),
                ("map_agg_null_key_behavior", DefaultSettingValue {
                    value: UserSettingValue::String("skip".to_owned()),
                    desc: "What map aggregates do with rows whose key is NULL: skip the row or fail the query.",
                    range: SettingRange::String(vec!["skip", "error"]),
                }),
            ];

            Ok(Arc::new(DefaultSettings {
                settings: settings
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            }))
        })?;
        Ok(settings.clone())
    }

    pub fn has_setting(key: &str) -> Result<bool> {
        Ok(Self::instance()?.settings.contains_key(key))
    }

    pub fn get(key: &str) -> Result<DefaultSettingValue> {
        Self::instance()?
            .settings
            .get(key)
            .cloned()
            .ok_or_else(|| ErrorCode::UnknownVariable(format!("Unknown variable: {:?}", key)))
    }

    /// Validates `v` against the range of setting `k`.
    pub fn convert_value(k: String, v: String) -> Result<(String, UserSettingValue)> {
        let value = Self::get(&k)?.range.parse(&v)?;
        Ok((k, value))
    }
}
