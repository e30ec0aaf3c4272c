/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! `when_any`: a proxy future that resolves as soon as the first of its
//! children does, returning the winner's index and every child future back
//! (spec §4.6.3) — none of the children are consumed by `when_any` itself,
//! only identified.
//!
//! Waiting for "any of N" has no single right answer: blocking every child
//! on its own OS thread wastes a thread per child, but a condvar side
//! channel costs a notifier registration on every child even when the
//! first one finishes almost immediately. Spec §4.6.3 asks for a duality:
//! busy-wait with exponential backoff first (cheap to poll, and the common
//! case finishes before the spin budget runs out), and only once that
//! budget (at most 5s) is exhausted promote to the side-channel notifier
//! scheme ([`SharedState::notify_when_ready`]) — but only when there's
//! slack to park a thread per child (`children.len() < hardware
//! concurrency`); otherwise keep busy-waiting rather than oversubscribe
//! the hardware with one parked thread per child.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use allocative::Allocative;
use parking_lot::Condvar;
use parking_lot::Mutex;

use crate::combinators::when_all::Outcome;
use crate::future::Caps;
use crate::future::Future;

/// Upper bound on the busy-wait budget before falling back to parking
/// (spec §4.6.3: "5 seconds, or the remaining timeout, whichever is
/// smaller").
const MAX_SPIN_BUDGET: Duration = Duration::from_secs(5);

/// Rough stand-in for "the cost of spinning up a thread", used only to
/// cap the per-iteration backoff delay; not load-bearing for correctness,
/// only for how promptly a spinning waiter notices a new winner.
const THREAD_CREATION_COST: Duration = Duration::from_micros(200);

const BACKOFF_NUMERATOR: u32 = 5;
const BACKOFF_DENOMINATOR: u32 = 4;

/// Abstracts over the one capability `when_any` actually needs from a
/// child future: "is it ready" plus the notifier side channel. Lets the
/// waiting logic below be written once and shared between the
/// heterogeneous tuple and homogeneous vector forms.
trait AnyChild {
    fn is_ready(&self) -> bool;
    fn notify_when_ready(&self, condvar: Arc<Condvar>) -> Option<u64>;
    fn unnotify_when_ready(&self, handle: u64);
}

impl<T, C: Caps> AnyChild for Future<T, C> {
    fn is_ready(&self) -> bool {
        Future::is_ready(self)
    }

    fn notify_when_ready(&self, condvar: Arc<Condvar>) -> Option<u64> {
        Future::notify_when_ready(self, condvar)
    }

    fn unnotify_when_ready(&self, handle: u64) {
        Future::unnotify_when_ready(self, handle)
    }
}

/// Waits until one of `children` is ready or `deadline` passes, returning
/// its index. `children.is_empty()` is the caller's problem to special-
/// case; this never returns for an empty slice.
///
/// Busy-wait with exponential backoff is always the first phase (spec
/// §4.6.3 step 4), bounded by `MAX_SPIN_BUDGET` (or the caller's own
/// deadline, whichever is sooner). Only once that spin budget is
/// exhausted does the policy fork: with slack to park a waiter thread
/// per child (`children.len() < hardware_concurrency`) it promotes to
/// the notifier side channel for the remainder of the wait (step 5);
/// otherwise it keeps busy-waiting, since parking one thread per child
/// would oversubscribe the hardware (step 6).
fn wait_for_any(children: &[&dyn AnyChild], deadline: Option<Instant>) -> Option<usize> {
    if let Some(i) = children.iter().position(|c| c.is_ready()) {
        return Some(i);
    }

    let spin_deadline = match deadline {
        Some(d) => d.min(Instant::now() + MAX_SPIN_BUDGET),
        None => Instant::now() + MAX_SPIN_BUDGET,
    };
    if let Some(i) = busy_wait(children, Some(spin_deadline)) {
        return Some(i);
    }
    if let Some(d) = deadline {
        if Instant::now() >= d {
            return None;
        }
    }

    let hardware_concurrency = num_cpus::get();
    if children.len() < hardware_concurrency {
        wait_via_notifiers(children, deadline)
    } else {
        busy_wait(children, deadline)
    }
}

/// Spins with exponential backoff (capped at `THREAD_CREATION_COST`
/// divided across the child count) until a child is ready or `deadline`
/// passes. `None` deadline spins forever.
fn busy_wait(children: &[&dyn AnyChild], deadline: Option<Instant>) -> Option<usize> {
    let cap = THREAD_CREATION_COST / (children.len() as u32).max(1);
    let mut delay = Duration::from_nanos(1);
    loop {
        if let Some(i) = children.iter().position(|c| c.is_ready()) {
            return Some(i);
        }
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return None;
            }
        }
        std::thread::sleep(delay.min(cap));
        delay = delay
            .checked_mul(BACKOFF_NUMERATOR)
            .map(|d| d / BACKOFF_DENOMINATOR)
            .unwrap_or(cap);
    }
}

fn wait_via_notifiers(children: &[&dyn AnyChild], deadline: Option<Instant>) -> Option<usize> {
    let condvar = Arc::new(Condvar::new());
    let gate = Mutex::new(());
    let handles: Vec<Option<u64>> = children
        .iter()
        .map(|c| c.notify_when_ready(condvar.clone()))
        .collect();

    let winner = loop {
        if let Some(i) = children.iter().position(|c| c.is_ready()) {
            break Some(i);
        }
        let mut guard = gate.lock();
        match deadline {
            None => {
                condvar.wait(&mut guard);
            }
            Some(d) => {
                let now = Instant::now();
                if now >= d {
                    break None;
                }
                condvar.wait_for(&mut guard, d - now);
            }
        }
    };

    for (child, handle) in children.iter().zip(handles) {
        if let Some(h) = handle {
            child.unnotify_when_ready(h);
        }
    }
    winner
}

/// `when_any` over two heterogeneous children.
#[derive(Allocative)]
pub struct WhenAny2<T1, C1: Caps, T2, C2: Caps> {
    f1: Future<T1, C1>,
    f2: Future<T2, C2>,
}

pub fn when_any2<T1, C1, T2, C2>(f1: Future<T1, C1>, f2: Future<T2, C2>) -> WhenAny2<T1, C1, T2, C2>
where
    T1: Send + 'static,
    C1: Caps,
    T2: Send + 'static,
    C2: Caps,
{
    WhenAny2 { f1, f2 }
}

impl<T1, C1, T2, C2> WhenAny2<T1, C1, T2, C2>
where
    T1: Send + 'static,
    C1: Caps,
    T2: Send + 'static,
    C2: Caps,
{
    pub fn is_ready(&self) -> bool {
        self.f1.is_ready() || self.f2.is_ready()
    }

    /// Blocks until either child is ready, returning its 0-based index.
    /// Neither child is consumed — callers go on to `get()` the winner
    /// (and, if they choose, still wait on the loser).
    pub fn wait(&self) -> usize {
        let children: [&dyn AnyChild; 2] = [&self.f1, &self.f2];
        wait_for_any(&children, None).expect("two-child wait never sees an empty slice")
    }

    pub fn wait_for(&self, timeout: Duration) -> Option<usize> {
        let children: [&dyn AnyChild; 2] = [&self.f1, &self.f2];
        wait_for_any(&children, Some(Instant::now() + timeout))
    }

    /// Waits for a winner, then hands back both children (spec §4.6.3:
    /// `when_any` identifies a winner without consuming anyone).
    pub fn into_inner(self) -> (usize, Future<T1, C1>, Future<T2, C2>) {
        let winner = self.wait();
        (winner, self.f1, self.f2)
    }
}

/// Explode form: `fn(size_t, F1, F2)`, called once a winner is known, with
/// both children (winner and loser alike) handed back uninspected (spec
/// §4.6.1's when_any unwrap table).
pub fn then_any2<T1, C1, T2, C2, U, F>(w: WhenAny2<T1, C1, T2, C2>, f: F) -> U
where
    T1: Send + 'static,
    C1: Caps,
    T2: Send + 'static,
    C2: Caps,
    F: FnOnce(usize, Future<T1, C1>, Future<T2, C2>) -> U,
{
    let (winner, f1, f2) = w.into_inner();
    f(winner, f1, f2)
}

/// `when_any` over a homogeneous range of futures (spec §4.6.3's "range
/// input" overload). An empty range has no winner.
#[derive(Allocative)]
pub struct WhenAnyVec<T, C: Caps> {
    children: Vec<Future<T, C>>,
}

pub fn when_any_vec<T, C>(children: Vec<Future<T, C>>) -> WhenAnyVec<T, C>
where
    T: Send + 'static,
    C: Caps,
{
    WhenAnyVec { children }
}

impl<T, C> WhenAnyVec<T, C>
where
    T: Send + 'static,
    C: Caps,
{
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_ready(&self) -> bool {
        self.children.iter().any(Future::is_ready)
    }

    /// Blocks until a winner is known. Returns `None` only when
    /// constructed from an empty vector.
    pub fn wait(&self) -> Option<usize> {
        if self.children.is_empty() {
            return None;
        }
        let refs: Vec<&dyn AnyChild> = self
            .children
            .iter()
            .map(|f| f as &dyn AnyChild)
            .collect();
        wait_for_any(&refs, None)
    }

    pub fn wait_for(&self, timeout: Duration) -> Option<usize> {
        if self.children.is_empty() {
            return None;
        }
        let refs: Vec<&dyn AnyChild> = self
            .children
            .iter()
            .map(|f| f as &dyn AnyChild)
            .collect();
        wait_for_any(&refs, Some(Instant::now() + timeout))
    }

    /// Waits for a winner, then hands back every child (including the
    /// winner) in construction order, consuming the combinator.
    pub fn into_inner(self) -> (Option<usize>, Vec<Future<T, C>>) {
        let winner = self.wait();
        (winner, self.children)
    }
}

/// Explode form: `fn(size_t, Sequence)`, called once a winner is known (or
/// never, for an empty input), with every child handed back in construction
/// order (spec §4.6.1's when_any unwrap table).
pub fn then_any_vec<T, C, U, F>(w: WhenAnyVec<T, C>, f: F) -> U
where
    T: Send + 'static,
    C: Caps,
    F: FnOnce(Option<usize>, Vec<Future<T, C>>) -> U,
{
    let (winner, children) = w.into_inner();
    f(winner, children)
}

/// Explode form: `fn(winner_future)`, handing back just the winning child,
/// still unresolved. `None` for an empty input.
pub fn then_any_vec_future<T, C>(w: WhenAnyVec<T, C>) -> Option<Future<T, C>>
where
    T: Send + 'static,
    C: Caps,
{
    let (winner, mut children) = w.into_inner();
    winner.map(|i| children.swap_remove(i))
}

/// Explode form: `fn(winner_value)`, resolving just the winning child and
/// handing back its outcome directly. `None` for an empty input.
pub fn then_any_vec_value<T, C>(w: WhenAnyVec<T, C>) -> Option<Outcome<T>>
where
    T: Send + 'static,
    C: Caps,
{
    let (winner, mut children) = w.into_inner();
    winner.map(|i| children.swap_remove(i).get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::Plain;
    use crate::promise::Promise;

    #[test]
    fn when_any_vec_reports_index_of_already_ready_child() {
        let p0: Promise<i32, Plain> = Promise::new();
        let f0 = p0.get_future().unwrap();
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        p1.set_value(7).unwrap();

        let w = when_any_vec(vec![f0, f1]);
        assert_eq!(w.wait(), Some(1));
        let (winner, mut children) = w.into_inner();
        assert_eq!(winner, Some(1));
        assert_eq!(children.remove(1).get().unwrap(), 7);
        drop(p0);
    }

    #[test]
    fn when_any_vec_empty_has_no_winner() {
        let w: WhenAnyVec<i32, Plain> = when_any_vec(Vec::new());
        assert!(w.is_empty());
        assert_eq!(w.wait(), None);
    }

    #[test]
    fn when_any_vec_wakes_on_delayed_winner() {
        let p0: Promise<i32, Plain> = Promise::new();
        let f0 = p0.get_future().unwrap();
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            p1.set_value(5).unwrap();
        });

        let w = when_any_vec(vec![f0, f1]);
        assert_eq!(w.wait_for(Duration::from_secs(2)), Some(1));
        drop(p0);
    }

    #[test]
    fn when_any_vec_times_out_if_nobody_wins() {
        let p0: Promise<i32, Plain> = Promise::new();
        let f0 = p0.get_future().unwrap();
        let w = when_any_vec(vec![f0]);
        assert_eq!(w.wait_for(Duration::from_millis(20)), None);
        drop(p0);
    }

    #[test]
    fn when_any2_reports_winner() {
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        let p2: Promise<String, Plain> = Promise::new();
        let f2 = p2.get_future().unwrap();
        p2.set_value("done".to_owned()).unwrap();

        let w = when_any2(f1, f2);
        let (winner, mut a, mut b) = w.into_inner();
        assert_eq!(winner, 1);
        assert_eq!(b.get().unwrap(), "done");
        a.detach();
        drop(a);
        drop(p1);
    }

    #[test]
    fn then_any2_hands_back_winner_index_and_both_children() {
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        let p2: Promise<String, Plain> = Promise::new();
        let f2 = p2.get_future().unwrap();
        p2.set_value("done".to_owned()).unwrap();

        let w = when_any2(f1, f2);
        let result = then_any2(w, |winner, mut a, mut b| {
            assert_eq!(winner, 1);
            a.detach();
            b.get().unwrap()
        });
        assert_eq!(result, "done");
        drop(p1);
    }

    #[test]
    fn then_any_vec_hands_back_winner_index_and_every_child() {
        let p0: Promise<i32, Plain> = Promise::new();
        let f0 = p0.get_future().unwrap();
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        p1.set_value(7).unwrap();

        let w = when_any_vec(vec![f0, f1]);
        let result = then_any_vec(w, |winner, mut children| {
            assert_eq!(winner, Some(1));
            children.remove(1).get().unwrap()
        });
        assert_eq!(result, 7);
        drop(p0);
    }

    #[test]
    fn then_any_vec_future_returns_just_the_winner_unresolved() {
        let p0: Promise<i32, Plain> = Promise::new();
        let f0 = p0.get_future().unwrap();
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        p1.set_value(9).unwrap();

        let w = when_any_vec(vec![f0, f1]);
        let mut winner = then_any_vec_future(w).unwrap();
        assert_eq!(winner.get().unwrap(), 9);
        drop(p0);
    }

    #[test]
    fn then_any_vec_value_resolves_just_the_winner() {
        let p0: Promise<i32, Plain> = Promise::new();
        let f0 = p0.get_future().unwrap();
        let p1: Promise<i32, Plain> = Promise::new();
        let f1 = p1.get_future().unwrap();
        p1.set_value(3).unwrap();

        let w = when_any_vec(vec![f0, f1]);
        assert_eq!(then_any_vec_value(w).unwrap().unwrap(), 3);
        drop(p0);
    }

    #[test]
    fn then_any_vec_value_is_none_for_empty_input() {
        let w: WhenAnyVec<i32, Plain> = when_any_vec(Vec::new());
        assert!(then_any_vec_value(w).is_none());
    }
}
