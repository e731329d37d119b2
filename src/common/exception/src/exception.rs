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

use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;

pub type Result<T, E = ErrorCode> = std::result::Result<T, E>;

pub struct ErrorCode {
    code: u16,
    name: String,
    display_text: String,
    cause: Option<Box<dyn std::error::Error + Sync + Send>>,
}

impl ErrorCode {
    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn name(&self) -> String {
        self.name.clone()
    }

    pub fn message(&self) -> String {
        let msg = self.display_text();
        if msg.is_empty() {
            return self.name.clone();
        }
        msg
    }

    pub fn display_text(&self) -> String {
        if let Some(cause) = &self.cause {
            format!("{}\n{:?}", self.display_text, cause)
        } else {
            self.display_text.clone()
        }
    }

    #[must_use]
    pub fn add_message(self, msg: impl AsRef<str>) -> Self {
        Self {
            display_text: format!("{}{}", msg.as_ref(), self.display_text),
            ..self
        }
    }

    #[must_use]
    pub fn add_message_back(self, msg: impl AsRef<str>) -> Self {
        Self {
            display_text: format!("{}{}", self.display_text, msg.as_ref()),
            ..self
        }
    }

    /// Set the display text, keeping code and name.
    #[must_use]
    pub fn set_display_text(self, text: impl Into<String>) -> Self {
        Self {
            display_text: text.into(),
            ..self
        }
    }

    pub fn create(
        code: u16,
        name: impl ToString,
        display_text: String,
        cause: Option<Box<dyn std::error::Error + Sync + Send>>,
    ) -> ErrorCode {
        ErrorCode {
            code,
            name: name.to_string(),
            display_text,
            cause,
        }
    }

    /// Errors raised because the surrounding operator wired the aggregate state wrongly.
    ///
    /// These are never caused by user data and should fail the query loudly.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::INTERNAL
                | ErrorCode::INVALID_GROUP_ID
                | ErrorCode::TYPE_MISMATCH
                | ErrorCode::FINALIZED_AGGREGATE_STATE
        )
    }

    /// The caller may recover by spilling aggregate state and retrying.
    pub fn is_retryable_by_spill(&self) -> bool {
        self.code == ErrorCode::AGGREGATE_MEMORY_EXCEEDED
    }
}

impl Debug for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}. Code: {}, Text = {}.",
            self.name(),
            self.code(),
            self.message(),
        )
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}. Code: {}, Text = {}.",
            self.name(),
            self.code(),
            self.message(),
        )
    }
}

impl std::error::Error for ErrorCode {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl Clone for ErrorCode {
    fn clone(&self) -> Self {
        ErrorCode::create(self.code(), &self.name, self.display_text(), None)
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.display_text() == other.display_text()
    }
}

/// Provides the `map_err_to_code` method for `Result`.
///
/// ```
/// use mapagg_common_exception::ErrorCode;
/// use mapagg_common_exception::ToErrorCode;
///
/// let x: std::result::Result<(), std::fmt::Error> = Err(std::fmt::Error {});
/// let y: mapagg_common_exception::Result<()> =
///     x.map_err_to_code(ErrorCode::Internal, || 123);
///
/// assert_eq!(
///     "Internal. Code: 1001, Text = 123, cause: an error occurred when formatting an argument.",
///     y.unwrap_err().to_string()
/// );
/// ```
pub trait ToErrorCode<T, E, CtxFn>
where E: Display + Send + Sync + 'static
{
    /// Wrap the error value with ErrorCode. It is lazily evaluated:
    /// only when an error does occur.
    ///
    /// `err_code_fn` is one of the ErrorCode builder function such as `ErrorCode::Ok`.
    /// `context_fn` builds display_text for the ErrorCode.
    fn map_err_to_code<ErrFn, D>(self, err_code_fn: ErrFn, context_fn: CtxFn) -> Result<T>
    where
        ErrFn: FnOnce(String) -> ErrorCode,
        D: Display,
        CtxFn: FnOnce() -> D;
}

impl<T, E, CtxFn> ToErrorCode<T, E, CtxFn> for std::result::Result<T, E>
where E: Display + Send + Sync + 'static
{
    fn map_err_to_code<ErrFn, D>(self, make_exception: ErrFn, context_fn: CtxFn) -> Result<T>
    where
        ErrFn: FnOnce(String) -> ErrorCode,
        D: Display,
        CtxFn: FnOnce() -> D,
    {
        self.map_err(|error| {
            let err_text = format!("{}, cause: {}", context_fn(), error);
            make_exception(err_text)
        })
    }
}
