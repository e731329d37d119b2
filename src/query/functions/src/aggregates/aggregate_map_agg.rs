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

use std::fmt;
use std::sync::Arc;

use log::debug;
use mapagg_common_base::runtime::QueryMemState;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;
use mapagg_common_expression::types::DataType;
use mapagg_common_expression::Scalar;
use mapagg_common_settings::MemorySettings;
use mapagg_common_settings::Settings;

use super::aggregate_function_factory::AggregateFunctionDescription;
use super::aggregator_common::assert_arguments;
use super::aggregator_common::assert_params;
use super::DuplicateKeyMode;
use super::MapAggConfig;
use super::MapAggStateTable;

/// `map_agg(key, value)` keeps the last value of a repeated key,
/// `map_agg_strict(key, value)` fails on a repeated key.
#[derive(Clone, Debug)]
pub struct AggregateMapAggFunction {
    display_name: String,
    mode: DuplicateKeyMode,
    key_type: DataType,
    value_type: DataType,
}

impl AggregateMapAggFunction {
    fn try_create(
        display_name: &str,
        mode: DuplicateKeyMode,
        key_type: DataType,
        value_type: DataType,
    ) -> Result<Arc<AggregateMapAggFunction>> {
        let func = AggregateMapAggFunction {
            display_name: display_name.to_string(),
            mode,
            key_type,
            value_type,
        };
        Ok(Arc::new(func))
    }

    pub fn name(&self) -> &str {
        "AggregateMapAggFunction"
    }

    pub fn mode(&self) -> DuplicateKeyMode {
        self.mode
    }

    pub fn key_type(&self) -> &DataType {
        &self.key_type
    }

    pub fn value_type(&self) -> &DataType {
        &self.value_type
    }

    pub fn return_type(&self) -> Result<DataType> {
        Ok(DataType::new_map(
            self.key_type.clone(),
            self.value_type.clone(),
        ))
    }

    pub fn create_config(
        &self,
        settings: &Settings,
        memory: MemorySettings,
    ) -> Result<Arc<MapAggConfig>> {
        Ok(MapAggConfig::create(
            self.mode,
            self.key_type.clone(),
            self.value_type.clone(),
            settings.get_map_agg_null_key_behavior()?,
            memory,
        ))
    }

    /// Creates the state table of one aggregation operator, charging the
    /// memory tracker of the query running on this thread if there is one.
    pub fn create_state_table(&self, settings: &Settings) -> Result<MapAggStateTable> {
        let mem_stat = QueryMemState::current_or_create(self.display_name.clone());
        let memory = MemorySettings::from_settings(settings, mem_stat)?;
        self.create_state_table_with_memory(settings, memory)
    }

    pub fn create_state_table_with_memory(
        &self,
        settings: &Settings,
        memory: MemorySettings,
    ) -> Result<MapAggStateTable> {
        let config = self.create_config(settings, memory)?;
        let max_group_id = settings.get_max_aggregate_group_id()?;
        debug!(
            "create state table for {}, max group id {}",
            self, max_group_id
        );
        Ok(MapAggStateTable::create(config, max_group_id))
    }
}

impl fmt::Display for AggregateMapAggFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.display_name)
    }
}

pub fn try_create_aggregate_map_agg_function(
    display_name: &str,
    mode: DuplicateKeyMode,
    params: Vec<Scalar>,
    argument_types: Vec<DataType>,
) -> Result<Arc<AggregateMapAggFunction>> {
    assert_params(display_name, params.len(), 0)?;
    assert_arguments(display_name, argument_types.len(), 2)?;

    // rows with a NULL key never make it into the map
    let key_type = argument_types[0].remove_nullable();
    if key_type.is_map() || key_type.is_null() {
        return Err(ErrorCode::IllegalDataType(format!(
            "The key of aggregate function {} cannot be of type {}",
            display_name, argument_types[0]
        )));
    }
    let value_type = argument_types[1].clone();

    AggregateMapAggFunction::try_create(display_name, mode, key_type, value_type)
}

pub fn aggregate_map_agg_function_desc() -> AggregateFunctionDescription {
    AggregateFunctionDescription::creator(Box::new(
        |display_name: &str, params: Vec<Scalar>, arguments: Vec<DataType>| {
            try_create_aggregate_map_agg_function(
                display_name,
                DuplicateKeyMode::Overwrite,
                params,
                arguments,
            )
        },
    ))
}

pub fn aggregate_map_agg_strict_function_desc() -> AggregateFunctionDescription {
    AggregateFunctionDescription::creator(Box::new(
        |display_name: &str, params: Vec<Scalar>, arguments: Vec<DataType>| {
            try_create_aggregate_map_agg_function(
                display_name,
                DuplicateKeyMode::Reject,
                params,
                arguments,
            )
        },
    ))
}
