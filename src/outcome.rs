// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Terminal outcome of a request or stream

use crate::error::ErrorInfo;

/// How an operation ended.
///
/// `Cancelled` is not a failure: it carries no information and must never be
/// rendered as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, E = ErrorInfo> {
    Success(T),
    Failed(E),
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// Map the success value, leaving failures and cancellation untouched
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U, E> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failed(error) => Outcome::Failed(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Chain a fallible conversion of the success value
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U, E>) -> Outcome<U, E> {
        match self {
            Outcome::Success(value) => match f(value) {
                Ok(mapped) => Outcome::Success(mapped),
                Err(error) => Outcome::Failed(error),
            },
            Outcome::Failed(error) => Outcome::Failed(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Outcome<T, F> {
        match self {
            Outcome::Success(value) => Outcome::Success(value),
            Outcome::Failed(error) => Outcome::Failed(f(error)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}
