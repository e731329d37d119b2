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

use serde::Deserialize;
use serde::Serialize;

use crate::ErrorCode;

#[derive(Debug)]
pub struct OtherErrors {
    message: String,
}

impl Display for OtherErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for OtherErrors {}

impl From<std::io::Error> for ErrorCode {
    fn from(error: std::io::Error) -> Self {
        // borsh reports every decoding failure as an io error
        ErrorCode::create(
            ErrorCode::BAD_BYTES,
            "BadBytes",
            format!("{}", error),
            Some(Box::new(error)),
        )
    }
}

impl From<serde_json::Error> for ErrorCode {
    fn from(error: serde_json::Error) -> Self {
        ErrorCode::BadArguments(format!("{}", error))
    }
}

impl From<std::fmt::Error> for ErrorCode {
    fn from(error: std::fmt::Error) -> Self {
        ErrorCode::create(
            ErrorCode::INTERNAL,
            "Internal",
            format!("{}", error),
            Some(Box::new(OtherErrors {
                message: error.to_string(),
            })),
        )
    }
}

// === ser/de to/from SerializedError ===

/// The wire shape of an error crossing an exchange boundary.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SerializedError {
    pub code: u16,
    pub name: String,
    pub message: String,
}

impl From<&ErrorCode> for SerializedError {
    fn from(e: &ErrorCode) -> Self {
        SerializedError {
            code: e.code(),
            name: e.name(),
            message: e.message(),
        }
    }
}

impl From<&SerializedError> for ErrorCode {
    fn from(se: &SerializedError) -> Self {
        ErrorCode::create(se.code, &se.name, se.message.clone(), None)
    }
}
