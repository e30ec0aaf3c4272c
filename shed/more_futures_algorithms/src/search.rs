/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! `find`, `any_of`, `all_of`, `none_of`: the short-circuiting parallel
//! algorithms (spec §2 Component G).
//!
//! Unlike `for_each`/`count`/`reduce`, these can stop early. Per spec §5's
//! cancellation semantics: "Parallel algorithms' recursive splits tag each
//! right-hand spawn with a stop source; if the left-hand finishes first
//! with a definitive answer ..., the right-hand stop source is requested
//! and the future is detached, then the left-hand fallback path continues
//! inline." A definitive answer at any recursion depth propagates upward
//! unchanged, since a parent's "left" is just the return value of a child
//! call that may itself have already short-circuited.

use std::sync::Arc;

use more_futures::future::Joinable;
use more_futures::promise::PackagedTask;
use more_futures::stop::StopSource;
use more_futures::Executor;

fn any_of_range<E, T, F>(
    executor: &E,
    partitioner: &(impl Fn(usize, usize) -> usize + Clone + Send + Sync + 'static),
    items: &Arc<Vec<T>>,
    first: usize,
    last: usize,
    pred: &Arc<F>,
) -> bool
where
    E: Executor,
    T: Send + Sync + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    let mid = partitioner(first, last);
    if mid == last {
        return items[first..last].iter().any(|x| pred(x));
    }

    let right_stop = StopSource::new();
    let right_token = right_stop.token();
    let right_items = items.clone();
    let right_partitioner = partitioner.clone();
    let right_pred = pred.clone();
    let right_executor = executor.clone();
    let mut task: PackagedTask<_, bool, Joinable> = PackagedTask::new(move || {
        if right_token.stop_requested() {
            return false;
        }
        any_of_range(
            &right_executor,
            &right_partitioner,
            &right_items,
            mid,
            last,
            &right_pred,
        )
    });
    let mut right_future = task.get_future().expect("fresh packaged task");
    executor.post(Box::new(move || task.invoke()));

    let left = items[first..mid].iter().any(|x| pred(x));
    if left {
        right_stop.request_stop();
        right_future.detach();
        return true;
    }
    right_future.wait();
    right_future.get().unwrap_or(false)
}

fn all_of_range<E, T, F>(
    executor: &E,
    partitioner: &(impl Fn(usize, usize) -> usize + Clone + Send + Sync + 'static),
    items: &Arc<Vec<T>>,
    first: usize,
    last: usize,
    pred: &Arc<F>,
) -> bool
where
    E: Executor,
    T: Send + Sync + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    let mid = partitioner(first, last);
    if mid == last {
        return items[first..last].iter().all(|x| pred(x));
    }

    let right_stop = StopSource::new();
    let right_token = right_stop.token();
    let right_items = items.clone();
    let right_partitioner = partitioner.clone();
    let right_pred = pred.clone();
    let right_executor = executor.clone();
    let mut task: PackagedTask<_, bool, Joinable> = PackagedTask::new(move || {
        if right_token.stop_requested() {
            return true;
        }
        all_of_range(
            &right_executor,
            &right_partitioner,
            &right_items,
            mid,
            last,
            &right_pred,
        )
    });
    let mut right_future = task.get_future().expect("fresh packaged task");
    executor.post(Box::new(move || task.invoke()));

    let left = items[first..mid].iter().all(|x| pred(x));
    if !left {
        right_stop.request_stop();
        right_future.detach();
        return false;
    }
    right_future.wait();
    right_future.get().unwrap_or(true)
}

fn find_range<E, T, F>(
    executor: &E,
    partitioner: &(impl Fn(usize, usize) -> usize + Clone + Send + Sync + 'static),
    items: &Arc<Vec<T>>,
    first: usize,
    last: usize,
    pred: &Arc<F>,
) -> Option<usize>
where
    E: Executor,
    T: Send + Sync + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    let mid = partitioner(first, last);
    if mid == last {
        return items[first..last]
            .iter()
            .position(|x| pred(x))
            .map(|i| first + i);
    }

    let right_stop = StopSource::new();
    let right_token = right_stop.token();
    let right_items = items.clone();
    let right_partitioner = partitioner.clone();
    let right_pred = pred.clone();
    let right_executor = executor.clone();
    let mut task: PackagedTask<_, Option<usize>, Joinable> = PackagedTask::new(move || {
        if right_token.stop_requested() {
            return None;
        }
        find_range(
            &right_executor,
            &right_partitioner,
            &right_items,
            mid,
            last,
            &right_pred,
        )
    });
    let mut right_future = task.get_future().expect("fresh packaged task");
    executor.post(Box::new(move || task.invoke()));

    let left = items[first..mid]
        .iter()
        .position(|x| pred(x))
        .map(|i| first + i);
    if let Some(idx) = left {
        right_stop.request_stop();
        right_future.detach();
        return Some(idx);
    }
    right_future.wait();
    right_future.get().unwrap_or(None)
}

/// True iff `pred` holds for at least one item. Recursive splits whose
/// left half already answers `true` cancel and detach their right half
/// rather than waiting on it.
pub fn any_of<E, T, F>(executor: &E, items: Vec<T>, pred: F) -> bool
where
    E: Executor,
    T: Send + Sync + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    if items.is_empty() {
        return false;
    }
    let len = items.len();
    let items = Arc::new(items);
    let partitioner = crate::partitioner::default_partitioner(len);
    let pred = Arc::new(pred);
    any_of_range(executor, &partitioner, &items, 0, len, &pred)
}

/// True iff `pred` holds for every item (vacuously true on an empty
/// input).
pub fn all_of<E, T, F>(executor: &E, items: Vec<T>, pred: F) -> bool
where
    E: Executor,
    T: Send + Sync + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    if items.is_empty() {
        return true;
    }
    let len = items.len();
    let items = Arc::new(items);
    let partitioner = crate::partitioner::default_partitioner(len);
    let pred = Arc::new(pred);
    all_of_range(executor, &partitioner, &items, 0, len, &pred)
}

/// True iff `pred` holds for no item. Expressed in terms of [`any_of`]
/// (itself the one that needs the short-circuiting split logic);
/// `none_of` is its negation by definition.
pub fn none_of<E, T, F>(executor: &E, items: Vec<T>, pred: F) -> bool
where
    E: Executor,
    T: Send + Sync + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    !any_of(executor, items, pred)
}

/// The index of the first item matching `pred`, or `None`. "First" here
/// means first by position in the input, not first in wall-clock
/// completion order — matching spec §5's analogous note about `when_any`.
pub fn find<E, T, F>(executor: &E, items: Vec<T>, pred: F) -> Option<usize>
where
    E: Executor,
    T: Send + Sync + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    if items.is_empty() {
        return None;
    }
    let len = items.len();
    let items = Arc::new(items);
    let partitioner = crate::partitioner::default_partitioner(len);
    let pred = Arc::new(pred);
    find_range(executor, &partitioner, &items, 0, len, &pred)
}
