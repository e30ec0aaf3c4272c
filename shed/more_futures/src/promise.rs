/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Promise and packaged-task: the producer side of a [`SharedState`]
//! (spec §4.4).

use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::ErrorPayload;
use crate::error::FuturesError;
use crate::future::Caps;
use crate::future::Future;
use crate::future::Plain;
use crate::shared_state::SharedState;
use crate::stop::StopSource;

/// Producer side of a [`SharedState`]. `get_future` may be called at most
/// once; subsequent calls fail with `FutureAlreadyRetrieved`. `C` picks
/// which capability family (spec §3's alias table) the resulting future
/// belongs to; a stoppable `C` gets a fresh [`StopSource`] at construction.
pub struct Promise<T, C: Caps = Plain> {
    state: Arc<SharedState<T>>,
    stop: Option<StopSource>,
    future_retrieved: AtomicBool,
    satisfied: AtomicBool,
    _caps: std::marker::PhantomData<C>,
}

impl<T, C: Caps> Promise<T, C> {
    pub fn new() -> Self {
        Self::new_with_stop(if C::STOPPABLE {
            Some(StopSource::new())
        } else {
            None
        })
    }

    /// Like `new`, but the stoppable future (if `C` is stoppable) observes
    /// `stop` rather than a freshly-created source. Used by `then` when
    /// inheriting/sharing a stop source from an antecedent (spec §4.6.1's
    /// stop-token propagation rules).
    pub fn new_with_stop(stop: Option<StopSource>) -> Self {
        Promise {
            state: Arc::new(SharedState::new(C::LAZY)),
            stop,
            future_retrieved: AtomicBool::new(false),
            satisfied: AtomicBool::new(false),
            _caps: std::marker::PhantomData,
        }
    }

    /// Obtain the future associated with this promise. Succeeds exactly
    /// once.
    pub fn get_future(&self) -> Result<Future<T, C>, FuturesError> {
        if self
            .future_retrieved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FuturesError::FutureAlreadyRetrieved);
        }
        Ok(match &self.stop {
            Some(stop) => Future::from_state_with_stop(self.state.clone(), stop.clone()),
            None => Future::from_state(self.state.clone()),
        })
    }

    pub fn set_value(&self, value: T) -> Result<(), FuturesError> {
        let r = self.state.set_value(value);
        if r.is_ok() {
            self.satisfied.store(true, Ordering::Release);
        }
        r
    }

    pub fn set_exception(&self, err: ErrorPayload) -> Result<(), FuturesError> {
        let r = self.state.set_exception(err);
        if r.is_ok() {
            self.satisfied.store(true, Ordering::Release);
        }
        r
    }
}

impl<T, C: Caps> Default for Promise<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C: Caps> Drop for Promise<T, C> {
    fn drop(&mut self) {
        if self.future_retrieved.load(Ordering::Acquire) && !self.satisfied.load(Ordering::Acquire)
        {
            tracing::warn!("promise dropped without a value set; breaking its future");
            self.state.signal_owner_destroyed();
        }
    }
}

/// Wraps a callable together with a shared state that IS-A shared state of
/// its return type. Invoking the task runs the callable and captures its
/// return value (or panic) into the state.
pub struct PackagedTask<F, T, C: Caps = Plain> {
    callable: Option<F>,
    promise: Promise<T, C>,
}

impl<F, T, C: Caps> PackagedTask<F, T, C>
where
    F: FnOnce() -> T,
{
    pub fn new(callable: F) -> Self {
        PackagedTask {
            callable: Some(callable),
            promise: Promise::new(),
        }
    }

    pub fn get_future(&self) -> Result<Future<T, C>, FuturesError> {
        self.promise.get_future()
    }

    /// Run the callable and store its result (or, if it panics, a user
    /// error payload carrying the panic message) into the shared state.
    /// A no-op if the callable was already taken (already invoked, or
    /// reset without a fresh one).
    pub fn invoke(&mut self) {
        let Some(callable) = self.callable.take() else {
            return;
        };
        match std::panic::catch_unwind(AssertUnwindSafe(callable)) {
            Ok(value) => {
                let _ = self.promise.set_value(value);
            }
            Err(panic) => {
                let message = panic_message(&panic);
                let _ = self
                    .promise
                    .set_exception(ErrorPayload::user(TaskPanicked(message)));
            }
        }
    }

    /// Reallocate a fresh task state, invalidating any future already
    /// retrieved from this task.
    pub fn reset(&mut self, callable: F) {
        self.callable = Some(callable);
        self.promise = Promise::new();
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_owned()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("task panicked: {0}")]
pub struct TaskPanicked(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_round_trip() {
        let promise: Promise<i32> = Promise::new();
        let mut future = promise.get_future().unwrap();
        promise.set_value(42).unwrap();
        assert_eq!(future.get().unwrap(), 42);
    }

    #[test]
    fn broken_promise() {
        let promise: Promise<i32> = Promise::new();
        let mut future = promise.get_future().unwrap();
        drop(promise);
        let err = future.get().unwrap_err();
        assert_matches::assert_matches!(err.as_lib(), Some(FuturesError::BrokenPromise));
    }

    #[test]
    fn get_future_is_idempotently_failing() {
        let promise: Promise<i32> = Promise::new();
        assert!(promise.get_future().is_ok());
        assert_matches::assert_matches!(
            promise.get_future(),
            Err(FuturesError::FutureAlreadyRetrieved)
        );
    }

    #[test]
    fn packaged_task_runs_and_reports_result() {
        let mut task = PackagedTask::new(|| 1 + 1);
        let mut future = task.get_future().unwrap();
        task.invoke();
        assert_eq!(future.get().unwrap(), 2);
    }

    #[test]
    fn packaged_task_reset_invalidates_old_future() {
        let mut task = PackagedTask::new(|| 1);
        let mut old_future = task.get_future().unwrap();
        task.reset(|| 2);
        task.invoke();
        // old_future's promise was dropped on reset -> broken promise.
        assert!(old_future.get().is_err());
        let mut new_future = task.get_future().unwrap();
        assert_eq!(new_future.get().unwrap(), 2);
    }
}
