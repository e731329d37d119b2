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

use itertools::Itertools;
use mapagg_common_exception::ErrorCode;
use mapagg_common_exception::Result;
use mapagg_common_expression::types::DataType;
use mapagg_common_expression::Scalar;
use once_cell::sync::Lazy;

use super::aggregate_map_agg::aggregate_map_agg_function_desc;
use super::aggregate_map_agg::aggregate_map_agg_strict_function_desc;
use super::AggregateMapAggFunction;

pub type AggregateFunctionCreator = Box<
    dyn Fn(&str, Vec<Scalar>, Vec<DataType>) -> Result<Arc<AggregateMapAggFunction>>
        + Sync
        + Send,
>;

pub struct AggregateFunctionDescription {
    pub(crate) aggregate_function_creator: AggregateFunctionCreator,
}

impl AggregateFunctionDescription {
    pub fn creator(creator: AggregateFunctionCreator) -> AggregateFunctionDescription {
        AggregateFunctionDescription {
            aggregate_function_creator: creator,
        }
    }
}

static FACTORY: Lazy<AggregateFunctionFactory> = Lazy::new(|| {
    let mut factory = AggregateFunctionFactory::create();
    factory.register("map_agg", aggregate_map_agg_function_desc());
    factory.register("map_agg_strict", aggregate_map_agg_strict_function_desc());
    factory
});

/// Aggregate functions by case-insensitive name.
pub struct AggregateFunctionFactory {
    case_insensitive_desc: HashMap<String, AggregateFunctionDescription>,
}

impl AggregateFunctionFactory {
    pub(in crate::aggregates) fn create() -> AggregateFunctionFactory {
        AggregateFunctionFactory {
            case_insensitive_desc: Default::default(),
        }
    }

    pub fn instance() -> &'static AggregateFunctionFactory {
        &FACTORY
    }

    pub fn register(&mut self, name: &str, desc: AggregateFunctionDescription) {
        let case_insensitive_desc = &mut self.case_insensitive_desc;
        case_insensitive_desc.insert(name.to_lowercase(), desc);
    }

    pub fn get(
        &self,
        name: impl AsRef<str>,
        params: Vec<Scalar>,
        arguments: Vec<DataType>,
    ) -> Result<Arc<AggregateMapAggFunction>> {
        let name = name.as_ref();
        match self.case_insensitive_desc.get(&name.to_lowercase()) {
            Some(desc) => (desc.aggregate_function_creator)(name, params, arguments),
            None => Err(ErrorCode::UnknownAggregateFunction(format!(
                "Unsupported AggregateFunction: {}",
                name
            ))),
        }
    }

    pub fn contains(&self, func_name: impl AsRef<str>) -> bool {
        self.case_insensitive_desc
            .contains_key(&func_name.as_ref().to_lowercase())
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.case_insensitive_desc.keys().cloned().sorted().collect()
    }
}
