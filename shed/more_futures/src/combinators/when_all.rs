/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! `when_all`: a proxy future over a heterogeneous tuple (or homogeneous
//! vector) of children, with no shared state of its own (spec §4.6.2).
//!
//! Rust has no variadic generics, so the tuple arities the source
//! language gets "for free" from template packs are generated here with
//! `macro_rules!` for a handful of concrete arities — the same mechanical
//! trick `futures::future::join`/`join3`/`join4`/`join5` uses upstream.

use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;
use std::time::Instant;

use allocative::Allocative;

use crate::error::ErrorPayload;
use crate::future::Caps;
use crate::future::Future;

/// One child's outcome once its antecedent future completes.
pub type Outcome<T> = Result<T, ErrorPayload>;

/// `when_all` over two heterogeneous children. Rust has no variadic
/// generics, so each concrete arity the source language gets "for free"
/// from a template pack is spelled out by hand — the same approach
/// `futures::future::join`/`join3`/`join4`/`join5` take upstream.
#[derive(Allocative)]
pub struct WhenAll2<T1, C1: Caps, T2, C2: Caps> {
    f1: Option<Future<T1, C1>>,
    f2: Option<Future<T2, C2>>,
    #[allocative(skip)]
    out1: Option<Outcome<T1>>,
    #[allocative(skip)]
    out2: Option<Outcome<T2>>,
}

pub fn when_all2<T1, C1, T2, C2>(f1: Future<T1, C1>, f2: Future<T2, C2>) -> WhenAll2<T1, C1, T2, C2>
where
    T1: Send + 'static,
    C1: Caps,
    T2: Send + 'static,
    C2: Caps,
{
    WhenAll2 {
        f1: Some(f1),
        f2: Some(f2),
        out1: None,
        out2: None,
    }
}

impl<T1, C1, T2, C2> WhenAll2<T1, C1, T2, C2>
where
    T1: Send + 'static,
    C1: Caps,
    T2: Send + 'static,
    C2: Caps,
{
    pub fn valid(&self) -> bool {
        (self.out1.is_some() || self.f1.as_ref().is_some_and(Future::valid))
            && (self.out2.is_some() || self.f2.as_ref().is_some_and(Future::valid))
    }

    pub fn is_ready(&self) -> bool {
        (self.out1.is_some() || self.f1.as_ref().is_some_and(Future::is_ready))
            && (self.out2.is_some() || self.f2.as_ref().is_some_and(Future::is_ready))
    }

    /// Waits on each child in turn, charging each one for whatever budget
    /// remains of `timeout` (spec §4.6.2/§5's "Budget is decremented
    /// across child waits in `when_all`").
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        for ready in [
            self.f1
                .as_ref()
                .map(|f| f.wait_until(deadline))
                .unwrap_or(true),
            self.f2
                .as_ref()
                .map(|f| f.wait_until(deadline))
                .unwrap_or(true),
        ] {
            if !ready {
                return false;
            }
        }
        true
    }

    /// Blocks until both children are ready, then returns both outcomes,
    /// consuming the children. Neither child's error short-circuits the
    /// other (spec §4.6.2/§7: `when_all` does not short-circuit).
    pub fn get(self) -> (Outcome<T1>, Outcome<T2>)
    where
        T1: Unpin,
        T2: Unpin,
    {
        futures::executor::block_on(self)
    }
}

impl<T1, C1, T2, C2> std::future::Future for WhenAll2<T1, C1, T2, C2>
where
    T1: Send + Unpin + 'static,
    C1: Caps,
    T2: Send + Unpin + 'static,
    C2: Caps,
{
    type Output = (Outcome<T1>, Outcome<T2>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        // Each child is polled at most once after it becomes ready: its
        // output is cached in `out1`/`out2` and the child handle dropped,
        // so a child that finishes before the other is never re-polled
        // (and never silently discarded) while we keep waiting on its
        // sibling.
        if this.out1.is_none() {
            if let Some(f) = &mut this.f1 {
                if let Poll::Ready(out) = Pin::new(f).poll(cx) {
                    this.out1 = Some(out);
                    this.f1 = None;
                }
            }
        }
        if this.out2.is_none() {
            if let Some(f) = &mut this.f2 {
                if let Poll::Ready(out) = Pin::new(f).poll(cx) {
                    this.out2 = Some(out);
                    this.f2 = None;
                }
            }
        }
        match (this.out1.take(), this.out2.take()) {
            (Some(a), Some(b)) => Poll::Ready((a, b)),
            (a, b) => {
                this.out1 = a;
                this.out2 = b;
                Poll::Pending
            }
        }
    }
}

/// Explode form: `fn(T1, T2) -> U`, called once both children succeed.
/// If either failed, the result carries that error instead (the first
/// failing child by position wins if both failed), matching the
/// concrete scenario in spec §8 ("When-all explode").
pub fn then_all2<T1, C1, T2, C2, U, F>(w: WhenAll2<T1, C1, T2, C2>, f: F) -> Result<U, ErrorPayload>
where
    T1: Send + 'static,
    C1: Caps,
    T2: Send + 'static,
    C2: Caps,
    F: FnOnce(T1, T2) -> U,
{
    let (a, b) = w.get();
    match (a, b) {
        (Ok(a), Ok(b)) => Ok(f(a, b)),
        (Err(e), _) => Err(e),
        (_, Err(e)) => Err(e),
    }
}

/// `when_all` over three heterogeneous children, built directly on
/// `futures::future::join3` rather than hand-rolled polling — the same
/// join-combinator approach `futures` itself uses for `join`/`join4`/
/// `join5`, reused here instead of writing a fourth near-identical poll
/// loop by hand.
pub fn when_all3<T1, C1, T2, C2, T3, C3>(
    f1: Future<T1, C1>,
    f2: Future<T2, C2>,
    f3: Future<T3, C3>,
) -> impl std::future::Future<Output = (Outcome<T1>, Outcome<T2>, Outcome<T3>)>
where
    T1: Send + 'static,
    C1: Caps,
    T2: Send + 'static,
    C2: Caps,
    T3: Send + 'static,
    C3: Caps,
{
    futures::future::join3(f1, f2, f3)
}

/// Blocking form of [`when_all3`] (spec §4.6.2's synchronous `get`).
pub fn get_all3<T1, C1, T2, C2, T3, C3>(
    f1: Future<T1, C1>,
    f2: Future<T2, C2>,
    f3: Future<T3, C3>,
) -> (Outcome<T1>, Outcome<T2>, Outcome<T3>)
where
    T1: Send + 'static,
    C1: Caps,
    T2: Send + 'static,
    C2: Caps,
    T3: Send + 'static,
    C3: Caps,
{
    futures::executor::block_on(when_all3(f1, f2, f3))
}

/// `when_all` over a homogeneous range of futures (spec §4.6.2's "range
/// input" overload). Empty input is immediately ready (spec §8).
#[derive(Allocative)]
pub struct WhenAllVec<T, C: Caps> {
    children: Vec<Future<T, C>>,
}

pub fn when_all_vec<T, C>(children: Vec<Future<T, C>>) -> WhenAllVec<T, C>
where
    T: Send + 'static,
    C: Caps,
{
    WhenAllVec { children }
}

impl<T, C> WhenAllVec<T, C>
where
    T: Send + 'static,
    C: Caps,
{
    pub fn valid(&self) -> bool {
        self.children.iter().all(Future::valid)
    }

    pub fn is_ready(&self) -> bool {
        self.children.iter().all(Future::is_ready)
    }

    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.children.iter().all(|f| f.wait_until(deadline))
    }

    /// Returns every child's outcome, in construction order, consuming the
    /// whole vector.
    pub fn get(self) -> Vec<Outcome<T>> {
        let mut out = Vec::with_capacity(self.children.len());
        for mut child in self.children {
            child.wait();
            out.push(child.get());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::Plain;
    use crate::promise::Promise;

    #[test]
    fn when_all_explode_formats_both_values() {
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        p1.set_value(1).unwrap();
        let p2: Promise<String, Plain> = Promise::new();
        let f2 = p2.get_future().unwrap();
        p2.set_value("s".to_owned()).unwrap();

        let w = when_all2(f1, f2);
        let result = then_all2(w, |a, b| format!("{}{}", a, b)).unwrap();
        assert_eq!(result, "1s");
    }

    #[test]
    fn when_all_ready_is_conjunction() {
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        let p2: Promise<i32, Plain> = Promise::new();
        let f2 = p2.get_future().unwrap();
        p1.set_value(1).unwrap();

        let w = when_all2(f1, f2);
        assert!(!w.is_ready());
        p2.set_value(2).unwrap();
        assert!(w.is_ready());
    }

    #[test]
    fn when_all_does_not_short_circuit_on_error() {
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        p1.set_exception(ErrorPayload::lib(crate::error::FuturesError::Cancelled))
            .unwrap();
        let p2: Promise<i32, Plain> = Promise::new();
        let f2 = p2.get_future().unwrap();
        p2.set_value(2).unwrap();

        let w = when_all2(f1, f2);
        let (a, b) = w.get();
        assert!(a.is_err());
        assert_eq!(b.unwrap(), 2);
    }

    #[test]
    fn when_all3_joins_three_children() {
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        p1.set_value(1).unwrap();
        let p2: Promise<i32, Plain> = Promise::new();
        let f2 = p2.get_future().unwrap();
        p2.set_value(2).unwrap();
        let p3: Promise<i32, Plain> = Promise::new();
        let f3 = p3.get_future().unwrap();
        p3.set_value(3).unwrap();

        let (a, b, c) = get_all3(f1, f2, f3);
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 2, 3));
    }

    #[test]
    fn when_all_vec_empty_is_ready() {
        let w: WhenAllVec<i32, Plain> = when_all_vec(Vec::new());
        assert!(w.is_ready());
        assert!(w.get().is_empty());
    }

    #[test]
    fn when_all_vec_preserves_order() {
        let mut children = Vec::new();
        for i in 0..4 {
            let p: Promise<i32, Plain> = Promise::new();
            let f = p.get_future().unwrap();
            p.set_value(i).unwrap();
            children.push(f);
        }
        let w = when_all_vec(children);
        let results: Vec<i32> = w.get().into_iter().map(Result::unwrap).collect();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }
}
