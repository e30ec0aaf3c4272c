/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A single-shot, run-once list of callbacks.
//!
//! This is the core correctness invariant of the whole crate (see
//! `DESIGN.md`): a naive "check ready, then append" pattern has a
//! lost-wakeup race between the check and the append. `append` instead
//! falls through to a direct dispatch when the run has already started,
//! under the same lock that guards the list, so exactly one of
//! "the callback gets queued" / "the callback gets dispatched" happens for
//! any caller.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use allocative::Allocative;
use parking_lot::Mutex;

use crate::executor::Executor;

type BoxedContinuation = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of [`ContinuationList::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The run hadn't started yet; the callback was appended and will run
    /// when [`ContinuationList::request_run`] is called.
    Queued,
    /// The run had already started (or finished); the callback was posted
    /// directly to the supplied executor instead.
    Dispatched,
}

#[derive(Allocative)]
pub struct ContinuationList {
    run_requested: AtomicBool,
    #[allocative(skip)]
    list: Mutex<Vec<BoxedContinuation>>,
}

impl Default for ContinuationList {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuationList {
    pub fn new() -> Self {
        ContinuationList {
            run_requested: AtomicBool::new(false),
            list: Mutex::new(Vec::new()),
        }
    }

    /// Append `callback` to the list, or dispatch it directly to
    /// `executor` if the list has already been run. The callback is
    /// posted as type-erased work; `executor` decides how/when it actually
    /// runs.
    pub fn append<E, F>(&self, executor: &E, callback: F) -> AppendOutcome
    where
        E: Executor,
        F: FnOnce() + Send + 'static,
    {
        // Lock the list first: this is the only way to observe
        // `run_requested` and append atomically with respect to a
        // concurrent `request_run`.
        let mut guard = self.list.lock();
        if self.run_requested.load(Ordering::Acquire) {
            drop(guard);
            executor.post(Box::new(callback));
            return AppendOutcome::Dispatched;
        }
        guard.push(Box::new(callback));
        AppendOutcome::Queued
    }

    /// Request the one-time run of every queued callback. Returns `false`
    /// if a run was already requested (by any caller); the list is drained
    /// and each callback invoked exactly once, in insertion order, on the
    /// calling thread.
    pub fn request_run(&self) -> bool {
        if self
            .run_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let callbacks = std::mem::take(&mut *self.list.lock());
        for callback in callbacks {
            callback();
        }
        true
    }

    pub fn has_run(&self) -> bool {
        self.run_requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;
    use crate::executor::InlineExecutor;

    #[test]
    fn append_before_run_queues_then_runs_once() {
        let list = ContinuationList::new();
        let ex = InlineExecutor;
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let outcome = list.append(&ex, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(outcome, AppendOutcome::Queued);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(list.request_run());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // A second run request is a no-op.
        assert!(!list.request_run());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn append_after_run_dispatches_directly() {
        let list = ContinuationList::new();
        let ex = InlineExecutor;
        assert!(list.request_run());
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let outcome = list.append(&ex, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(outcome, AppendOutcome::Dispatched);
        // InlineExecutor runs synchronously.
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_callback_runs_exactly_once() {
        let list = ContinuationList::new();
        let ex = InlineExecutor;
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let c = count.clone();
            list.append(&ex, move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        list.request_run();
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }
}
