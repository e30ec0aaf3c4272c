/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Cooperative cancellation: a monotonic flag shared between any number of
//! `StopSource` handles and `StopToken` views.
//!
//! No callback mechanism is provided here, by design: polling is the
//! contract, and the consumer picks the granularity.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;

#[derive(Allocative)]
struct StopStateInner {
    requested: AtomicBool,
    /// Count of live `StopSource` handles referencing this state. A token
    /// can exist after the last source is dropped; in that case
    /// `stop_possible()` falls back to whether a stop was already
    /// requested.
    live_sources: AtomicUsize,
}

/// The shared flag underlying a family of [`StopSource`]/[`StopToken`]
/// handles.
#[derive(Clone, Dupe, Allocative)]
pub struct StopState(Arc<StopStateInner>);

impl StopState {
    fn new() -> Self {
        StopState(Arc::new(StopStateInner {
            requested: AtomicBool::new(false),
            live_sources: AtomicUsize::new(0),
        }))
    }

    fn requested(&self) -> bool {
        self.0.requested.load(Ordering::Acquire)
    }

    fn possible(&self) -> bool {
        self.requested() || self.0.live_sources.load(Ordering::Acquire) > 0
    }
}

/// Producer-side handle: can request a stop. Freely copyable; the
/// underlying state is refcounted and outlives any single handle.
#[derive(Allocative, Dupe)]
pub struct StopSource {
    state: StopState,
}

impl Clone for StopSource {
    fn clone(&self) -> Self {
        self.state.0.live_sources.fetch_add(1, Ordering::AcqRel);
        StopSource {
            state: self.state.dupe(),
        }
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSource {
    /// Construct a fresh, unrequested stop source.
    pub fn new() -> Self {
        let state = StopState::new();
        state.0.live_sources.fetch_add(1, Ordering::AcqRel);
        StopSource { state }
    }

    /// Request a stop. Returns `true` iff this call performed the
    /// false-to-true transition — at most one caller across every source
    /// sharing this state ever observes `true`.
    pub fn request_stop(&self) -> bool {
        self.state
            .0
            .requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn token(&self) -> StopToken {
        StopToken {
            state: self.state.dupe(),
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.state.requested()
    }
}

impl Drop for StopSource {
    fn drop(&mut self) {
        self.state.0.live_sources.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for StopSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSource")
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

/// Consumer-side, weak-by-intent view of a [`StopState`]. Observes the flag
/// but does not keep any source alive.
#[derive(Clone, Dupe, Allocative)]
pub struct StopToken {
    state: StopState,
}

impl StopToken {
    /// A token with no backing state at all: `stop_possible()` is always
    /// false, `stop_requested()` is always false.
    pub fn never() -> Self {
        StopToken {
            state: StopState::new(),
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.state.requested()
    }

    /// True iff a source still exists that could request a stop, or a stop
    /// has already happened.
    pub fn stop_possible(&self) -> bool {
        self.state.possible()
    }
}

impl std::fmt::Debug for StopToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopToken")
            .field("stop_requested", &self.stop_requested())
            .field("stop_possible", &self.stop_possible())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_stop_transitions_exactly_once() {
        let source = StopSource::new();
        let source2 = source.clone();
        assert!(source.request_stop());
        assert!(!source.request_stop());
        assert!(!source2.request_stop());
    }

    #[test]
    fn token_observes_source() {
        let source = StopSource::new();
        let token = source.token();
        assert!(!token.stop_requested());
        assert!(token.stop_possible());
        source.request_stop();
        assert!(token.stop_requested());
    }

    #[test]
    fn stop_possible_survives_source_drop_only_if_already_requested() {
        let source = StopSource::new();
        let token = source.token();
        source.request_stop();
        drop(source);
        assert!(token.stop_possible());
        assert!(token.stop_requested());
    }

    #[test]
    fn stop_impossible_once_last_source_dropped_without_request() {
        let source = StopSource::new();
        let token = source.token();
        drop(source);
        assert!(!token.stop_possible());
    }

    #[test]
    fn never_token_is_never_stoppable() {
        let token = StopToken::never();
        assert!(!token.stop_requested());
        assert!(!token.stop_possible());
    }
}
