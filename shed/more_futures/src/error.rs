/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Error codes raised at the producer/consumer API boundary, plus the
//! opaque payload a shared state stores when a task fails.

use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// Errors that can be observed through a future, a promise, or a packaged
/// task, independent of whatever error type the user's own task produces.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FuturesError {
    /// The promise side was dropped before a value or exception was set.
    #[error("broken promise")]
    BrokenPromise,

    /// `get_future` was called more than once on the same promise.
    #[error("future already retrieved")]
    FutureAlreadyRetrieved,

    /// `set_value`/`set_exception` was called on a shared state that was
    /// already ready.
    #[error("promise already satisfied")]
    PromiseAlreadySatisfied,

    /// An operation was attempted on a future with no associated shared
    /// state (default-constructed, moved-from, or already consumed).
    #[error("no state")]
    NoState,

    /// The task observed its stop token and chose to surface cancellation
    /// as an error rather than completing with a sentinel value.
    #[error("operation cancelled")]
    Cancelled,

    /// A `then` continuation's parameter shape did not match any of the
    /// supported unwrap forms for the antecedent. In a statically-typed
    /// front end this would be a compile error; ported dynamically it is
    /// raised at the point `then` is dispatched.
    #[error("continuation unwrapping not possible: {0}")]
    UnwrapMismatch(String),
}

impl FuturesError {
    /// Coarse category, mirroring the "common `futures_error` tagged with a
    /// category" requirement of spec §6.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FuturesError::BrokenPromise => ErrorCategory::Producer,
            FuturesError::FutureAlreadyRetrieved => ErrorCategory::Producer,
            FuturesError::PromiseAlreadySatisfied => ErrorCategory::Producer,
            FuturesError::NoState => ErrorCategory::Consumer,
            FuturesError::Cancelled => ErrorCategory::Cancellation,
            FuturesError::UnwrapMismatch(_) => ErrorCategory::Unwrap,
        }
    }
}

/// Coarse grouping of [`FuturesError`] variants, per spec §7's taxonomy of
/// producer-contract violations, consumer misuse, cancellation, and unwrap
/// mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Producer,
    Consumer,
    Cancellation,
    Unwrap,
}

/// The opaque error payload stored in a shared state when a task fails.
/// Wraps either a library-level [`FuturesError`] or an arbitrary boxed
/// user error, type-erased behind `Arc` so it can be cheaply cloned into
/// every continuation and every shared-future copy.
#[derive(Clone)]
pub enum ErrorPayload {
    Lib(FuturesError),
    User(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl ErrorPayload {
    pub fn lib(err: FuturesError) -> Self {
        ErrorPayload::Lib(err)
    }

    pub fn user<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ErrorPayload::User(Arc::new(err))
    }

    pub fn as_lib(&self) -> Option<&FuturesError> {
        match self {
            ErrorPayload::Lib(e) => Some(e),
            ErrorPayload::User(_) => None,
        }
    }
}

impl Debug for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPayload::Lib(e) => Debug::fmt(e, f),
            ErrorPayload::User(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPayload::Lib(e) => fmt::Display::fmt(e, f),
            ErrorPayload::User(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for ErrorPayload {}

impl From<FuturesError> for ErrorPayload {
    fn from(e: FuturesError) -> Self {
        ErrorPayload::Lib(e)
    }
}
