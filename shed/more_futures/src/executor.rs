/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The executor contract this crate consumes (spec §6). The core never
//! owns a thread pool; it is handed one through this trait.

use std::env;
use std::sync::OnceLock;

/// Opaque unit of work posted to an [`Executor`].
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Any object satisfying this trait can drive continuations, notifiers, and
/// parallel-algorithm work items for this crate. `post`/`defer`/`dispatch`
/// mirror the three submission flavours spec §6 asks an executor to
/// support; a correct executor may implement all three identically (a
/// single FIFO queue), but is free to distinguish "later, definitely
/// off-thread" (`post`) from "later, possibly after the current call chain
/// unwinds" (`defer`) from "now, if already on this context" (`dispatch`).
pub trait Executor: Clone + Send + Sync + 'static {
    /// Enqueue `work` for later execution.
    fn post(&self, work: Work);

    /// Like `post`, but the executor may choose to delay until the current
    /// call chain unwinds.
    fn defer(&self, work: Work) {
        self.post(work)
    }

    /// Run `work` inline if the calling thread is already on this
    /// executor's context; otherwise behaves like `post`.
    fn dispatch(&self, work: Work) {
        self.post(work)
    }

    /// Human-readable identity of the execution context this executor
    /// submits to, used only for diagnostics/tracing.
    fn context_name(&self) -> &'static str {
        "executor"
    }
}

/// Runs work synchronously, on the calling thread, inside `post`/`defer`/
/// `dispatch` itself. Useful for tests and for `then` chains that must not
/// cross a thread boundary.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn post(&self, work: Work) {
        work();
    }

    fn context_name(&self) -> &'static str {
        "inline"
    }
}

/// The process-wide default executor: a lazily constructed
/// [`tokio::runtime::Runtime`] (multi-threaded), sized to
/// `MORE_FUTURES_WORKER_THREADS` if set, else `num_cpus::get()`.
#[derive(Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

fn worker_threads() -> usize {
    env::var("MORE_FUTURES_WORKER_THREADS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(num_cpus::get)
}

static DEFAULT_RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

impl TokioExecutor {
    /// The process-wide default executor, constructed on first use.
    pub fn default_executor() -> Self {
        let runtime = DEFAULT_RUNTIME.get_or_init(|| {
            let threads = worker_threads();
            tracing::debug!(threads, "building default more_futures tokio runtime");
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .thread_name("more-futures-worker")
                .enable_all()
                .build()
                .expect("failed to build default more_futures runtime")
        });
        TokioExecutor {
            handle: runtime.handle().clone(),
        }
    }

    /// Wrap an existing runtime handle instead of using the process-wide
    /// default. Useful when the caller already owns a tokio runtime.
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        TokioExecutor { handle }
    }
}

impl Executor for TokioExecutor {
    fn post(&self, work: Work) {
        self.handle.spawn_blocking(work);
    }

    fn dispatch(&self, work: Work) {
        if tokio::runtime::Handle::try_current().is_ok() {
            work();
        } else {
            self.post(work);
        }
    }

    fn context_name(&self) -> &'static str {
        "tokio"
    }
}

/// Execution-policy tags (spec §6): each selects an appropriate executor
/// when the caller doesn't supply one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// Run everything inline, on the calling/fulfilling thread.
    Sequenced,
    /// Run on the default multi-threaded executor; results may interleave.
    Parallel,
    /// Like `Parallel`, plus permission to vectorize within a single task
    /// (not exploited by this crate's scalar algorithms, but threaded
    /// through so callers can specialize).
    ParallelUnsequenced,
    /// Single-threaded but allowed to reorder/vectorize within that
    /// thread; maps to the inline executor in this implementation since
    /// the core has no internal vectorization.
    Unsequenced,
}

impl ExecutionPolicy {
    pub fn default_executor(self) -> PolicyExecutor {
        match self {
            ExecutionPolicy::Sequenced | ExecutionPolicy::Unsequenced => {
                PolicyExecutor::Inline(InlineExecutor)
            }
            ExecutionPolicy::Parallel | ExecutionPolicy::ParallelUnsequenced => {
                PolicyExecutor::Tokio(TokioExecutor::default_executor())
            }
        }
    }
}

/// The executor an [`ExecutionPolicy`] resolves to.
#[derive(Clone)]
pub enum PolicyExecutor {
    Inline(InlineExecutor),
    Tokio(TokioExecutor),
}

impl Executor for PolicyExecutor {
    fn post(&self, work: Work) {
        match self {
            PolicyExecutor::Inline(e) => e.post(work),
            PolicyExecutor::Tokio(e) => e.post(work),
        }
    }

    fn defer(&self, work: Work) {
        match self {
            PolicyExecutor::Inline(e) => e.defer(work),
            PolicyExecutor::Tokio(e) => e.defer(work),
        }
    }

    fn dispatch(&self, work: Work) {
        match self {
            PolicyExecutor::Inline(e) => e.dispatch(work),
            PolicyExecutor::Tokio(e) => e.dispatch(work),
        }
    }

    fn context_name(&self) -> &'static str {
        match self {
            PolicyExecutor::Inline(e) => e.context_name(),
            PolicyExecutor::Tokio(e) => e.context_name(),
        }
    }
}
