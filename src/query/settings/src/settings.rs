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
use std::sync::Arc;

use dashmap::DashMap;
use itertools::Itertools;
use log::debug;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;

use crate::settings_default::DefaultSettingValue;
use crate::settings_default::DefaultSettings;
use crate::settings_default::SettingRange;
use crate::settings_getter_setter::UserSettingValue;

/// Per-query settings: the defaults overlaid with the values changed for this query.
#[derive(Debug, Default)]
pub struct Settings {
    pub(crate) changes: DashMap<String, UserSettingValue>,
}

impl Settings {
    pub fn create() -> Arc<Settings> {
        Arc::new(Settings::default())
    }

    pub fn has_setting(&self, key: &str) -> Result<bool> {
        DefaultSettings::has_setting(key)
    }

    pub fn check_and_get_default_value(&self, key: &str) -> Result<UserSettingValue> {
        Ok(DefaultSettings::get(key)?.value)
    }

    pub fn get_setting(&self, key: &str) -> Result<UserSettingValue> {
        match self.changes.get(key) {
            Some(v) => Ok(v.value().clone()),
            None => self.check_and_get_default_value(key),
        }
    }

    pub fn set_setting(&self, k: String, v: String) -> Result<()> {
        let (key, value) = DefaultSettings::convert_value(k, v)?;
        debug!("set setting {} = {:?}", key, value);
        self.changes.insert(key, value);
        Ok(())
    }

    /// Unknown keys are ignored so a batch can carry settings for other components.
    pub fn set_batch_settings(&self, settings: &HashMap<String, String>) -> Result<()> {
        for (k, v) in settings.iter() {
            if self.has_setting(k.as_str())? {
                self.set_setting(k.to_string(), v.to_string())?;
            }
        }

        Ok(())
    }

    /// Applies a JSON object of overrides, e.g. `{"max_memory_usage": 1048576}`.
    /// Unlike [`Settings::set_batch_settings`], unknown keys are an error here.
    pub fn load_json(&self, json: &str) -> Result<()> {
        let overrides: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;

        for (k, v) in overrides.into_iter().sorted_by(|(l, _), (r, _)| Ord::cmp(l, r)) {
            let v = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => (b as u8).to_string(),
                other => {
                    return Err(ErrorCode::WrongValueForVariable(format!(
                        "Unsupported value {} for setting {:?}",
                        other, k
                    )));
                }
            };
            self.set_setting(k, v)?;
        }

        Ok(())
    }

    pub fn unset_setting(&self, key: &str) {
        self.changes.remove(key);
    }

    pub fn items(&self) -> Result<SettingsIter<'_>> {
        SettingsIter::create(self)
    }
}

#[derive(Debug, Clone)]
pub struct SettingsItem {
    pub name: String,
    pub desc: &'static str,
    pub user_value: UserSettingValue,
    pub default_value: UserSettingValue,
    pub range: SettingRange,
}

pub struct SettingsIter<'a> {
    settings: &'a Settings,
    inner: std::vec::IntoIter<(String, DefaultSettingValue)>,
}

impl<'a> SettingsIter<'a> {
    pub fn create(settings: &'a Settings) -> Result<SettingsIter<'a>> {
        let iter = DefaultSettings::instance()?
            .settings
            .clone()
            .into_iter()
            .sorted_by(|(l, _), (r, _)| Ord::cmp(l, r));

        Ok(SettingsIter::<'a> {
            settings,
            inner: iter,
        })
    }
}

impl Iterator for SettingsIter<'_> {
    type Item = SettingsItem;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, default_value) = self.inner.next()?;
        let user_value = match self.settings.changes.get(&key) {
            None => default_value.value.clone(),
            Some(change_value) => change_value.value().clone(),
        };

        Some(SettingsItem {
            name: key,
            desc: default_value.desc,
            user_value,
            default_value: default_value.value,
            range: default_value.range,
        })
    }
}
