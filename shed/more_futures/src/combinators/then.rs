/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The `then` continuation pipeline (spec §4.6.1, §4.6.4).
//!
//! The source language picks among ten unwrap forms by overload
//! resolution at compile time. Ported to Rust, the two forms that matter
//! for ordinary chaining — "no unwrap" (see the whole outcome, error
//! included) and "value unwrap" (see the value, with errors propagating
//! automatically) — are modelled as variants of [`Unwrap`], a type
//! descriptor the engine matches on, per §9's guidance for dynamic ports.
//! The tuple/sequence-exploding forms live next to the combinator that
//! produces the antecedent shape they unwrap (`when_all`/`when_any`).

use crate::error::ErrorPayload;
use crate::executor::Executor;
use crate::future::Caps;
use crate::future::Continuable;
use crate::future::ContinuableJoinable;
use crate::future::Future;
use crate::future::LazyContinuable;
use crate::future::SharedFuture;
use crate::future::Stoppable;
use crate::promise::Promise;
use crate::stop::StopSource;
use crate::stop::StopToken;

type BoxedFn<A, B> = Box<dyn FnOnce(A) -> B + Send>;

/// A continuation's parameter shape, matched against the antecedent's
/// result at dispatch time. Spec forms, in priority order: "no unwrap"
/// (row 1 of the table) and "value unwrap" (row 3).
pub enum Unwrap<T, U> {
    /// `fn(antecedent_result)` — sees the full `Result`, error included.
    NoUnwrap(BoxedFn<Result<T, ErrorPayload>, U>),
    /// `fn(T)` — sees only the value; an antecedent error short-circuits
    /// straight through to the result's error slot without running `fn`.
    Value(BoxedFn<T, U>),
}

fn run_unwrap<T, U>(unwrap: Unwrap<T, U>, outcome: Result<T, ErrorPayload>) -> Result<U, ErrorPayload> {
    match unwrap {
        Unwrap::NoUnwrap(f) => Ok(f(outcome)),
        Unwrap::Value(f) => outcome.map(f),
    }
}

/// Attach a continuation to a lazy-continuable `antecedent`: the thunk is
/// appended to its continuation list, which fires it in-line with
/// `set_value` (or dispatches it immediately if the list already ran).
/// The result is a fresh, lazy-continuable, non-stoppable future — "the
/// resulting future always carries a fresh continuation source" and
/// "else: result is not stoppable" (spec §4.6.1).
pub fn then<E, T, C, U>(
    executor: &E,
    mut antecedent: Future<T, C>,
    unwrap: Unwrap<T, U>,
) -> Future<U, Continuable>
where
    E: Executor,
    T: Send + 'static,
    C: LazyContinuable,
    U: Send + 'static,
{
    let promise: Promise<U, Continuable> = Promise::new();
    let result_future = promise.get_future().unwrap();

    let continuations = antecedent
        .continuations()
        .cloned()
        .expect("LazyContinuable antecedent must carry a continuation list");
    let state = antecedent
        .state
        .clone()
        .expect("valid antecedent must have state to attach to");
    let executor_for_thunk = executor.clone();
    antecedent.detach();
    let thunk = move || {
        let outcome = state.take();
        let result = run_unwrap(unwrap, outcome);
        match result {
            Ok(v) => {
                let _ = promise.set_value(v);
            }
            Err(e) => {
                let _ = promise.set_exception(e);
            }
        }
    };
    continuations.append(&executor_for_thunk, thunk);
    result_future
}

/// Like [`then`], but for an antecedent that is *not* lazy-continuable:
/// the thunk is deferred to `executor` and blocks on `antecedent.get()`
/// itself (spec §4.6.1's other scheduling branch).
pub fn then_blocking<E, T, C, U>(
    executor: &E,
    mut antecedent: Future<T, C>,
    unwrap: Unwrap<T, U>,
) -> Future<U, Continuable>
where
    E: Executor,
    T: Send + 'static,
    C: Caps,
    U: Send + 'static,
{
    let promise: Promise<U, Continuable> = Promise::new();
    let result_future = promise.get_future().unwrap();
    let work = move || {
        let outcome = antecedent.get();
        let result = run_unwrap(unwrap, outcome);
        match result {
            Ok(v) => {
                let _ = promise.set_value(v);
            }
            Err(e) => {
                let _ = promise.set_exception(e);
            }
        }
    };
    executor.defer(Box::new(work));
    result_future
}

/// Like [`then`], but `f` additionally receives a [`StopToken`] (spec
/// §4.6.1's "optionally each form may accept a leading `stop_token`
/// parameter"). The antecedent's stop source is inherited ("share
/// source") since the antecedent is required to be stoppable here; the
/// result is stoppable.
pub fn then_with_token<E, T, C, U, F>(
    executor: &E,
    mut antecedent: Future<T, C>,
    f: F,
) -> Future<U, ContinuableJoinable>
where
    E: Executor,
    T: Send + 'static,
    C: Caps + Stoppable + LazyContinuable,
    U: Send + 'static,
    F: FnOnce(StopToken, Result<T, ErrorPayload>) -> U + Send + 'static,
{
    let token = antecedent.get_stop_token();
    let stop_source = antecedent
        .stop
        .clone()
        .expect("Stoppable antecedent must carry a stop source");
    let promise: Promise<U, ContinuableJoinable> = Promise::new_with_stop(Some(stop_source));
    let result_future = promise.get_future().unwrap();

    let continuations = antecedent
        .continuations()
        .cloned()
        .expect("LazyContinuable antecedent must carry a continuation list");
    let state = antecedent
        .state
        .clone()
        .expect("valid antecedent must have state to attach to");
    let executor_clone = executor.clone();
    antecedent.detach();
    let thunk = move || {
        let outcome = state.take();
        let v = f(token, outcome);
        let _ = promise.set_value(v);
    };
    continuations.append(&executor_clone, thunk);
    result_future
}

/// Like [`then_with_token`], but for an antecedent that is *not*
/// stoppable: spec §4.6.1's other stop-token branch, "else: a fresh
/// `StopSource` is synthesized for the result" rather than inherited from
/// the antecedent, since there is no antecedent stop source to share.
pub fn then_with_fresh_token<E, T, C, U, F>(
    executor: &E,
    mut antecedent: Future<T, C>,
    f: F,
) -> Future<U, ContinuableJoinable>
where
    E: Executor,
    T: Send + 'static,
    C: LazyContinuable,
    U: Send + 'static,
    F: FnOnce(StopToken, Result<T, ErrorPayload>) -> U + Send + 'static,
{
    let stop_source = StopSource::new();
    let token = stop_source.token();
    let promise: Promise<U, ContinuableJoinable> = Promise::new_with_stop(Some(stop_source));
    let result_future = promise.get_future().unwrap();

    let continuations = antecedent
        .continuations()
        .cloned()
        .expect("LazyContinuable antecedent must carry a continuation list");
    let state = antecedent
        .state
        .clone()
        .expect("valid antecedent must have state to attach to");
    let executor_clone = executor.clone();
    antecedent.detach();
    let thunk = move || {
        let outcome = state.take();
        let v = f(token, outcome);
        let _ = promise.set_value(v);
    };
    continuations.append(&executor_clone, thunk);
    result_future
}

/// Like [`then`], but the antecedent is a [`SharedFuture`] rather than a
/// non-shared one: not consumed, and the continuation sees a clone of the
/// value (`peek_cloned`) rather than a moved-out one, same as
/// `SharedFuture::get`.
pub fn then_shared<E, T, C, U>(
    executor: &E,
    antecedent: &SharedFuture<T, C>,
    unwrap: Unwrap<T, U>,
) -> Future<U, Continuable>
where
    E: Executor,
    T: Clone + Send + 'static,
    C: LazyContinuable,
    U: Send + 'static,
{
    let promise: Promise<U, Continuable> = Promise::new();
    let result_future = promise.get_future().unwrap();

    let state = antecedent.state_arc();
    let continuations = state
        .continuations()
        .cloned()
        .expect("LazyContinuable antecedent must carry a continuation list");
    let executor_for_thunk = executor.clone();
    let thunk = move || {
        let outcome = state.peek_cloned().expect("continuation fired when ready");
        let result = run_unwrap(unwrap, outcome);
        match result {
            Ok(v) => {
                let _ = promise.set_value(v);
            }
            Err(e) => {
                let _ = promise.set_exception(e);
            }
        }
    };
    continuations.append(&executor_for_thunk, thunk);
    result_future
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::executor::InlineExecutor;
    use crate::future::ContinuableJoinable;

    #[test]
    fn value_unwrap_chain() {
        let ex = InlineExecutor;
        let promise: Promise<i32, Continuable> = Promise::new();
        let f = promise.get_future().unwrap();
        promise.set_value(1).unwrap();
        let g = then(&ex, f, Unwrap::Value(Box::new(|x| x + 1)));
        let h = then(&ex, g, Unwrap::Value(Box::new(|x| x * 2)));
        let mut h = h;
        assert_eq!(h.get().unwrap(), 4);
    }

    #[test]
    fn no_unwrap_sees_error() {
        let ex = InlineExecutor;
        let promise: Promise<i32, Continuable> = Promise::new();
        let f = promise.get_future().unwrap();
        promise
            .set_exception(ErrorPayload::lib(crate::error::FuturesError::Cancelled))
            .unwrap();
        let g = then(
            &ex,
            f,
            Unwrap::NoUnwrap(Box::new(|r| r.is_err())),
        );
        let mut g = g;
        assert_eq!(g.get().unwrap(), true);
    }

    #[test]
    fn value_unwrap_propagates_error_without_running_fn() {
        let ex = InlineExecutor;
        let promise: Promise<i32, Continuable> = Promise::new();
        let f = promise.get_future().unwrap();
        promise
            .set_exception(ErrorPayload::lib(crate::error::FuturesError::Cancelled))
            .unwrap();
        let g = then(&ex, f, Unwrap::Value(Box::new(|x: i32| x + 1)));
        let mut g = g;
        assert!(g.get().is_err());
    }

    #[test]
    fn then_on_non_lazy_future_defers_and_waits() {
        let ex = InlineExecutor;
        let promise: Promise<i32, crate::future::Plain> = Promise::new();
        let f = promise.get_future().unwrap();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            promise.set_value(10).unwrap();
        });
        let g = then_blocking(&ex, f, Unwrap::Value(Box::new(|x| x + 1)));
        let mut g = g;
        assert_eq!(g.get().unwrap(), 11);
    }

    #[test]
    fn then_with_token_observes_cancellation() {
        let ex = InlineExecutor;
        let promise: Promise<i32, ContinuableJoinable> = Promise::new();
        let f = promise.get_future().unwrap();
        let requested = f.request_stop();
        assert!(requested);
        promise.set_value(0).unwrap();
        let g = then_with_token(&ex, f, |token, outcome| {
            (token.stop_requested(), outcome.unwrap())
        });
        let mut g = g;
        let (was_stopped, value) = g.get().unwrap();
        assert!(was_stopped);
        assert_eq!(value, 0);
    }

    #[test]
    fn then_with_fresh_token_synthesizes_a_new_source() {
        let ex = InlineExecutor;
        let promise: Promise<i32, Continuable> = Promise::new();
        let f = promise.get_future().unwrap();
        promise.set_value(0).unwrap();
        let g = then_with_fresh_token(&ex, f, |token, outcome| {
            (token.stop_requested(), outcome.unwrap())
        });
        let mut g = g;
        let (was_stopped, value) = g.get().unwrap();
        assert!(!was_stopped);
        assert_eq!(value, 0);
        assert!(g.request_stop());
    }

    #[test]
    fn then_shared_sees_a_cloned_value_without_consuming_the_antecedent() {
        let ex = InlineExecutor;
        let promise: Promise<i32, Continuable> = Promise::new();
        let f = promise.get_future().unwrap();
        promise.set_value(5).unwrap();
        let shared = f.share();

        let mut g = then_shared(&ex, &shared, Unwrap::Value(Box::new(|x| x * 2)));
        assert_eq!(g.get().unwrap(), 10);
        assert_eq!(shared.get().unwrap(), 5);
    }
}
