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

#![allow(non_snake_case)]

use crate::ErrorCode;

macro_rules! build_exceptions {
    ($($(#[$meta:meta])* $body:ident($code:expr)),*$(,)*) => {
        impl ErrorCode {
            $(
                paste::item! {
                    $(
                        #[$meta]
                    )*
                    pub const [< $body:snake:upper >]: u16 = $code;
                }
                $(
                    #[$meta]
                )*
                pub fn $body(display_text: impl Into<String>) -> ErrorCode {
                    ErrorCode::create(
                        $code,
                        stringify!($body),
                        display_text.into(),
                        None,
                    )
                }
            )*
        }
    }
}

// Internal errors [0, 2000].
build_exceptions! {
    Ok(0),
    /// Internal means this is the internal error that no action
    /// can be taken by neither developers or users.
    /// In most of the time, they are code bugs.
    Internal(1001),
    BadArguments(1006),
    IllegalDataType(1007),
    UnknownAggregateFunction(1008),
    BadDataValueType(1010),
    BadBytes(1046),
    NumberArgumentsNotMatch(1028),
}

// Aggregate state errors [1200, 1300].
build_exceptions! {
    /// The group id handed to a state table is negative or above the configured maximum.
    InvalidGroupId(1201),
    /// Key/value columns do not match the aggregate's configured key/value types.
    TypeMismatch(1202),
    /// A key occurred twice under reject-on-duplicate semantics.
    DuplicateMapKey(1203),
    /// Mutation or emission after an aggregate state was finalized.
    FinalizedAggregateState(1204),
    /// A partial state received from another stage could not be decoded.
    MalformedStateSnapshot(1205),
    /// The memory tracker refused the growth; spill and retry.
    AggregateMemoryExceeded(1206),
}

// Settings errors [2800, 2900].
build_exceptions! {
    UnknownVariable(2801),
    WrongValueForVariable(2803),
}
