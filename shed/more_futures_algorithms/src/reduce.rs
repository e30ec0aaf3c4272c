/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! `for_each`, `count`, and `reduce`: the non-short-circuiting parallel
//! algorithms (spec §2 Component G). All three recursively split the input
//! via a partitioner and dispatch the right half onto `executor`, solving
//! the left half inline, then combine — the classic fork-join shape, with
//! no need for the cancel-on-early-answer behaviour `any_of`/`all_of`/
//! `none_of`/`find` use.

use std::sync::Arc;

use more_futures::future::Joinable;
use more_futures::promise::PackagedTask;
use more_futures::Executor;

/// Recursively splits `items[first..last]` with `partitioner`, running
/// `solve` on leaf ranges and `combine` to merge a left result with a
/// right one. The right half of every split is posted to `executor`; the
/// left half is solved on the calling thread. Mirrors spec §5's "parallel
/// threads cooperatively using a caller-supplied executor. No internal
/// thread pool is owned by the core."
fn split_reduce<E, T, R>(
    executor: &E,
    partitioner: &(impl Fn(usize, usize) -> usize + Clone + Send + Sync + 'static),
    items: &Arc<Vec<T>>,
    first: usize,
    last: usize,
    solve: &Arc<dyn Fn(&[T]) -> R + Send + Sync>,
    combine: &Arc<dyn Fn(R, R) -> R + Send + Sync>,
) -> R
where
    E: Executor,
    T: Send + Sync + 'static,
    R: Send + 'static,
{
    let mid = partitioner(first, last);
    if mid == last {
        return solve(&items[first..last]);
    }
    tracing::trace!(first, mid, last, "splitting range");

    let right_items = items.clone();
    let right_partitioner = partitioner.clone();
    let right_solve = solve.clone();
    let right_combine = combine.clone();
    let right_executor = executor.clone();
    let mut task: PackagedTask<_, R, Joinable> = PackagedTask::new(move || {
        split_reduce(
            &right_executor,
            &right_partitioner,
            &right_items,
            mid,
            last,
            &right_solve,
            &right_combine,
        )
    });
    let mut right_future = task.get_future().expect("fresh packaged task");
    executor.post(Box::new(move || task.invoke()));

    let left = split_reduce(executor, partitioner, items, first, mid, solve, combine);
    right_future.wait();
    let right = right_future
        .get()
        .expect("right half's packaged task is never dropped before completion");
    combine(left, right)
}

/// Runs `f` over every item of an owned vector (items must be moved into
/// this call since right-hand splits are posted to `executor` as `'static`
/// work, per the executor contract's `post(E, F) -> void` signature).
pub fn for_each_owned<E, T, F>(executor: &E, items: Vec<T>, f: F)
where
    E: Executor,
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    if items.is_empty() {
        return;
    }
    let len = items.len();
    let items = Arc::new(items);
    let partitioner = crate::partitioner::default_partitioner(len);
    let solve: Arc<dyn Fn(&[T]) -> () + Send + Sync> = {
        let f = Arc::new(f);
        Arc::new(move |slice: &[T]| {
            for item in slice {
                f(item);
            }
        })
    };
    let combine: Arc<dyn Fn((), ()) -> () + Send + Sync> = Arc::new(|_, _| ());
    split_reduce(executor, &partitioner, &items, 0, len, &solve, &combine);
}

/// Counts items matching `pred`.
pub fn count<E, T, F>(executor: &E, items: Vec<T>, pred: F) -> usize
where
    E: Executor,
    T: Send + Sync + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    if items.is_empty() {
        return 0;
    }
    let len = items.len();
    let items = Arc::new(items);
    let partitioner = crate::partitioner::default_partitioner(len);
    let pred = Arc::new(pred);
    let solve: Arc<dyn Fn(&[T]) -> usize + Send + Sync> = {
        let pred = pred.clone();
        Arc::new(move |slice: &[T]| slice.iter().filter(|item| pred(item)).count())
    };
    let combine: Arc<dyn Fn(usize, usize) -> usize + Send + Sync> = Arc::new(|a, b| a + b);
    split_reduce(executor, &partitioner, &items, 0, len, &solve, &combine)
}

/// Parallel fold: `identity` combined with every item via `fold`, halves
/// merged via `combine`. `combine` must be associative for the result to
/// be deterministic across different split shapes (spec's parallel
/// algorithms make no ordering guarantee, same as the source contract).
pub fn reduce<E, T, R, Fold, Combine>(
    executor: &E,
    items: Vec<T>,
    identity: R,
    fold: Fold,
    combine: Combine,
) -> R
where
    E: Executor,
    T: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    Fold: Fn(R, &T) -> R + Send + Sync + 'static,
    Combine: Fn(R, R) -> R + Send + Sync + 'static,
{
    if items.is_empty() {
        return identity;
    }
    let len = items.len();
    let items = Arc::new(items);
    let partitioner = crate::partitioner::default_partitioner(len);
    let fold = Arc::new(fold);
    let combine = Arc::new(combine);
    let identity_for_solve = identity.clone();
    let solve: Arc<dyn Fn(&[T]) -> R + Send + Sync> = {
        let fold = fold.clone();
        let identity = identity_for_solve;
        Arc::new(move |slice: &[T]| slice.iter().fold(identity.clone(), |acc, item| fold(acc, item)))
    };
    split_reduce(executor, &partitioner, &items, 0, len, &solve, &combine)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use more_futures::executor::InlineExecutor;

    use super::*;

    #[test]
    fn for_each_visits_every_item() {
        let ex = InlineExecutor;
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        for_each_owned(&ex, (0..50).collect(), move |_: &i32| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn count_matches_sequential_baseline() {
        let ex = InlineExecutor;
        let items: Vec<i32> = (0..200).collect();
        let expected = items.iter().filter(|x| *x % 3 == 0).count();
        let got = count(&ex, items, |x| x % 3 == 0);
        assert_eq!(got, expected);
    }

    #[test]
    fn reduce_sums_items() {
        let ex = InlineExecutor;
        let items: Vec<i32> = (1..=1000).collect();
        let expected: i64 = (1..=1000i64).sum();
        let got = reduce(&ex, items, 0i64, |acc, x| acc + *x as i64, |a, b| a + b);
        assert_eq!(got, expected);
    }

    #[test]
    fn reduce_on_empty_returns_identity() {
        let ex = InlineExecutor;
        let got = reduce(&ex, Vec::<i32>::new(), 42i64, |acc, x| acc + *x as i64, |a, b| a + b);
        assert_eq!(got, 42);
    }
}
