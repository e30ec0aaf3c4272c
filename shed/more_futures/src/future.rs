/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The consumer side of a [`SharedState`] (spec §3, §4.5).
//!
//! Rather than a sixteen-way class hierarchy (three boolean axes times
//! shared/non-shared), the capability axes are folded into a marker type
//! parameter `C: Caps` and two small sealed marker traits gating which
//! methods compile for which marker (per spec §9's explicit guidance to
//! prefer trait-bounded generics over CRTP mixins). `shared` is instead a
//! distinct top-level type ([`SharedFuture`]) since its `get()` has a
//! fundamentally different ownership shape (clone-out, not move-out).

use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;
use std::time::Instant;

use allocative::Allocative;
use dupe::Dupe;
use parking_lot::Condvar;

use crate::error::ErrorPayload;
use crate::error::FuturesError;
use crate::shared_state::SharedState;
use crate::stop::StopSource;
use crate::stop::StopToken;

mod sealed {
    /// Closes the capability-marker family: only the four marker types in
    /// this module can ever implement [`super::Caps`], since nothing
    /// outside this crate can name or implement `Sealed`.
    pub trait Sealed {}
    impl Sealed for super::Plain {}
    impl Sealed for super::Continuable {}
    impl Sealed for super::Joinable {}
    impl Sealed for super::ContinuableJoinable {}
}

/// Capability marker, implemented by the four zero-sized marker types
/// below. Carries the two boolean axes the spec parameterises non-shared
/// futures by (the third axis, `shared`, is the `Future` vs `SharedFuture`
/// type choice). Sealed: no type outside this crate can add a fifth
/// member to the family.
pub trait Caps: sealed::Sealed + Send + Sync + 'static {
    const LAZY: bool;
    const STOPPABLE: bool;
}

/// Marker trait implemented only by capability markers that carry a
/// continuation list, gating `then`/`notify_when_ready` fast-path methods.
pub trait LazyContinuable: Caps {}

/// Marker trait implemented only by capability markers that carry a stop
/// source, gating `request_stop`/`get_stop_source`/`get_stop_token`.
pub trait Stoppable: Caps {}

/// `future`: no lazy continuations, no cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;
/// `cfuture`: lazy-continuable, not stoppable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Continuable;
/// `jfuture`: stoppable, not lazy-continuable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Joinable;
/// `jcfuture`: both lazy-continuable and stoppable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuableJoinable;

impl Caps for Plain {
    const LAZY: bool = false;
    const STOPPABLE: bool = false;
}
impl Caps for Continuable {
    const LAZY: bool = true;
    const STOPPABLE: bool = false;
}
impl Caps for Joinable {
    const LAZY: bool = false;
    const STOPPABLE: bool = true;
}
impl Caps for ContinuableJoinable {
    const LAZY: bool = true;
    const STOPPABLE: bool = true;
}

impl LazyContinuable for Continuable {}
impl LazyContinuable for ContinuableJoinable {}
impl Stoppable for Joinable {}
impl Stoppable for ContinuableJoinable {}

/// Configuration used when a promise/packaged-task constructs its shared
/// state: whether it should carry a continuation list, and (if stoppable)
/// the stop source the resulting future should observe.
#[derive(Default, Clone)]
pub struct FutureConfig {
    pub lazy_continuable: bool,
    pub stop_source: Option<StopSource>,
}

pub type PlainFuture<T> = Future<T, Plain>;
pub type CFuture<T> = Future<T, Continuable>;
pub type JFuture<T> = Future<T, Joinable>;
pub type JCFuture<T> = Future<T, ContinuableJoinable>;

/// A non-shared future: exclusively owns its handle to the shared state.
#[derive(Allocative)]
pub struct Future<T, C: Caps = Plain> {
    pub(crate) state: Option<Arc<SharedState<T>>>,
    pub(crate) stop: Option<StopSource>,
    detached: bool,
    #[allocative(skip)]
    _caps: std::marker::PhantomData<C>,
}

impl<T, C: Caps> Future<T, C> {
    pub(crate) fn from_state(state: Arc<SharedState<T>>) -> Self {
        Future {
            state: Some(state),
            stop: None,
            detached: false,
            _caps: std::marker::PhantomData,
        }
    }

    pub(crate) fn from_state_with_stop(state: Arc<SharedState<T>>, stop: StopSource) -> Self {
        Future {
            state: Some(state),
            stop: Some(stop),
            detached: false,
            _caps: std::marker::PhantomData,
        }
    }

    /// True iff this future has an associated shared state (not
    /// default-constructed, not moved-from, not yet consumed by `get`).
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_ready())
    }

    pub fn wait(&self) {
        if let Some(state) = &self.state {
            state.wait();
        }
    }

    pub fn wait_for(&self, timeout: Duration) -> bool {
        match &self.state {
            Some(s) => s.wait_for(timeout),
            None => true,
        }
    }

    pub fn wait_until(&self, deadline: Instant) -> bool {
        match &self.state {
            Some(s) => s.wait_until(deadline),
            None => true,
        }
    }

    /// Move the value out. After this call `valid()` is false, regardless
    /// of whether a value, an error, or `NoState` was returned.
    pub fn get(&mut self) -> Result<T, ErrorPayload> {
        match self.state.take() {
            None => Err(ErrorPayload::lib(FuturesError::NoState)),
            Some(state) => {
                state.wait();
                state.take()
            }
        }
    }

    pub fn notify_when_ready(&self, condvar: Arc<Condvar>) -> Option<u64> {
        self.state.as_ref().map(|s| s.notify_when_ready(condvar))
    }

    pub fn unnotify_when_ready(&self, handle: u64) {
        if let Some(state) = &self.state {
            state.unnotify_when_ready(handle);
        }
    }

    /// Disable the "wait at destruction" RAII behaviour.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    /// Produce the shared variant of this future, consuming it (non-shared
    /// futures exclusively own their handle; sharing requires giving that
    /// ownership to the refcounted `SharedFuture`).
    pub fn share(mut self) -> SharedFuture<T, C>
    where
        T: Clone,
    {
        let state = self
            .state
            .take()
            .expect("share() called on an invalid future");
        let stop = self.stop.take();
        self.detached = true; // nothing left to join in our own destructor
        SharedFuture {
            inner: Arc::new(SharedFutureInner { state, stop }),
            detached: false,
            _caps: std::marker::PhantomData,
        }
    }
}

impl<T, C: LazyContinuable> Future<T, C> {
    pub(crate) fn continuations(&self) -> Option<&Arc<crate::continuation::ContinuationList>> {
        self.state.as_ref().and_then(|s| s.continuations())
    }
}

impl<T, C: Stoppable> Future<T, C> {
    pub fn request_stop(&self) -> bool {
        self.stop.as_ref().is_some_and(|s| s.request_stop())
    }

    pub fn get_stop_source(&self) -> Option<StopSource> {
        self.stop.clone()
    }

    pub fn get_stop_token(&self) -> StopToken {
        self.stop
            .as_ref()
            .map(|s| s.token())
            .unwrap_or_else(StopToken::never)
    }
}

impl<T, C: Caps> std::future::Future for Future<T, C>
where
    T: Send,
{
    type Output = Result<T, ErrorPayload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(state) = self.state.clone() else {
            return Poll::Ready(Err(ErrorPayload::lib(FuturesError::NoState)));
        };
        if !state.is_ready() {
            state.register_waker(cx.waker());
            // Re-check: `set_value` may have run between the `is_ready`
            // check and `register_waker`.
            if !state.is_ready() {
                return Poll::Pending;
            }
        }
        self.state = None;
        Poll::Ready(state.take())
    }
}

impl<T, C: Caps> Drop for Future<T, C> {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        let Some(state) = &self.state else {
            return;
        };
        if C::STOPPABLE {
            if let Some(source) = &self.stop {
                source.request_stop();
            }
        }
        if C::LAZY {
            state.force_run_continuations();
        }
        state.wait();
    }
}

#[derive(Allocative)]
struct SharedFutureInner<T> {
    state: Arc<SharedState<T>>,
    stop: Option<StopSource>,
}

/// A shared future: refcounted, cloneable, `get()` returns a clone of the
/// value rather than moving it out.
#[derive(Allocative, Dupe)]
pub struct SharedFuture<T, C: Caps = Plain> {
    inner: Arc<SharedFutureInner<T>>,
    detached: bool,
    #[allocative(skip)]
    _caps: std::marker::PhantomData<C>,
}

impl<T, C: Caps> Clone for SharedFuture<T, C> {
    fn clone(&self) -> Self {
        SharedFuture {
            inner: self.inner.clone(),
            detached: self.detached,
            _caps: std::marker::PhantomData,
        }
    }
}

impl<T, C: Caps> SharedFuture<T, C> {
    pub fn valid(&self) -> bool {
        true
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.is_ready()
    }

    pub fn wait(&self) {
        self.inner.state.wait();
    }

    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.inner.state.wait_for(timeout)
    }

    pub fn wait_until(&self, deadline: Instant) -> bool {
        self.inner.state.wait_until(deadline)
    }

    pub fn get(&self) -> Result<T, ErrorPayload>
    where
        T: Clone,
    {
        self.inner.state.wait();
        self.inner
            .state
            .peek_cloned()
            .expect("state is ready after wait()")
    }

    pub fn notify_when_ready(&self, condvar: Arc<Condvar>) -> u64 {
        self.inner.state.notify_when_ready(condvar)
    }

    pub fn unnotify_when_ready(&self, handle: u64) {
        self.inner.state.unnotify_when_ready(handle);
    }

    pub fn detach(&mut self) {
        self.detached = true;
    }

    pub(crate) fn state_arc(&self) -> Arc<SharedState<T>> {
        self.inner.state.clone()
    }
}

impl<T, C: Stoppable> SharedFuture<T, C> {
    pub fn request_stop(&self) -> bool {
        self.inner.stop.as_ref().is_some_and(|s| s.request_stop())
    }

    pub fn get_stop_token(&self) -> StopToken {
        self.inner
            .stop
            .as_ref()
            .map(|s| s.token())
            .unwrap_or_else(StopToken::never)
    }
}

impl<T, C: Caps> Drop for SharedFuture<T, C> {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        // Only the last owner joins: earlier clones just drop their
        // refcount.
        if Arc::strong_count(&self.inner) != 1 {
            return;
        }
        if C::STOPPABLE {
            if let Some(source) = &self.inner.stop {
                source.request_stop();
            }
        }
        if C::LAZY {
            self.inner.state.force_run_continuations();
        }
        self.inner.state.wait();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::promise::Promise;

    #[test]
    fn detach_then_drop_does_not_block() {
        let promise: Promise<i32> = Promise::new();
        let mut future = promise.get_future().unwrap();
        future.detach();
        drop(future);
        // promise is still live and unset; dropping the future must not
        // have blocked waiting on it.
        drop(promise);
    }

    #[test]
    fn joining_future_waits_at_drop() {
        let promise: Promise<i32> = Promise::new();
        let future = promise.get_future().unwrap();
        let handle = thread::spawn(move || {
            drop(future);
        });
        thread::sleep(Duration::from_millis(10));
        promise.set_value(1).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn share_then_clone_both_get_equal_values() {
        let promise: Promise<i32> = Promise::new();
        let future = promise.get_future().unwrap();
        promise.set_value(5).unwrap();
        let shared1 = future.share();
        let shared2 = shared1.clone();
        assert_eq!(shared1.get().unwrap(), shared2.get().unwrap());
    }

    #[test]
    fn get_invalidates_future() {
        let promise: Promise<i32> = Promise::new();
        let mut future = promise.get_future().unwrap();
        promise.set_value(1).unwrap();
        assert!(future.valid());
        let _ = future.get();
        assert!(!future.valid());
    }
}
