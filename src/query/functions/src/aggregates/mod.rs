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

mod aggregate_function_factory;
mod aggregate_map_agg;
mod aggregate_map_agg_serde;
mod aggregate_map_agg_state;
mod aggregate_map_agg_table;
mod aggregator_common;

pub use aggregate_function_factory::AggregateFunctionCreator;
pub use aggregate_function_factory::AggregateFunctionDescription;
pub use aggregate_function_factory::AggregateFunctionFactory;
pub use aggregate_map_agg::try_create_aggregate_map_agg_function;
pub use aggregate_map_agg::AggregateMapAggFunction;
pub use aggregate_map_agg_serde::deserialize as deserialize_map_agg_state;
pub use aggregate_map_agg_serde::deserialize_from_bytes as deserialize_map_agg_state_from_bytes;
pub use aggregate_map_agg_serde::serialize as serialize_map_agg_state;
pub use aggregate_map_agg_serde::serialize_to_bytes as serialize_map_agg_state_to_bytes;
pub use aggregate_map_agg_state::DuplicateKeyMode;
pub use aggregate_map_agg_state::DuplicateKeyPolicy;
pub use aggregate_map_agg_state::MapAccumulator;
pub use aggregate_map_agg_state::MapAggConfig;
pub use aggregate_map_agg_state::MapAggPhase;
pub use aggregate_map_agg_state::MapAggState;
pub use aggregate_map_agg_state::OverwriteOnDuplicate;
pub use aggregate_map_agg_state::RejectOnDuplicate;
pub use aggregate_map_agg_table::MapAggStateTable;
pub use aggregator_common::assert_arguments;
pub use aggregator_common::assert_params;
