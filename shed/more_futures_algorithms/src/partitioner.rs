/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The partitioner contract (spec §6): a callable `(first, last) -> mid`
//! telling an algorithm where to split `[first, last)`. Returning `last`
//! means "don't split further, solve inline".

use std::cell::Cell;
use std::thread::ThreadId;

/// Minimum and maximum grain size the default partitioner will settle on,
/// regardless of input size or hardware concurrency.
const MIN_GRAIN: usize = 1;
const MAX_GRAIN: usize = 2048;

fn grain_size(len: usize) -> usize {
    let hw = num_cpus::get().max(1);
    (len / (8 * hw)).clamp(MIN_GRAIN, MAX_GRAIN)
}

thread_local! {
    /// The thread that last asked this partitioner to decide a split.
    /// Asking twice in a row from the same thread means nobody spawned the
    /// previous right half off onto another thread yet — a proxy for "the
    /// calling thread's identity has stabilised", i.e. we're deep enough in
    /// the recursion that further splitting is unlikely to find idle
    /// hardware (spec §6).
    static LAST_SPLIT_THREAD: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

fn thread_identity_stabilised() -> bool {
    let current = std::thread::current().id();
    LAST_SPLIT_THREAD.with(|cell| {
        let stabilised = cell.get() == Some(current);
        cell.set(Some(current));
        stabilised
    })
}

/// Build the default partitioner for a range of `len` items: split in
/// halves until the grain size is reached, or until the calling thread's
/// identity looks stable.
pub fn default_partitioner(len: usize) -> impl Fn(usize, usize) -> usize + Clone + Send + Sync {
    let grain = grain_size(len);
    move |first: usize, last: usize| {
        if last - first <= grain || thread_identity_stabilised() {
            last
        } else {
            first + (last - first) / 2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grain_size_is_clamped() {
        assert_eq!(grain_size(0), MIN_GRAIN);
        assert!(grain_size(usize::MAX) <= MAX_GRAIN);
    }

    #[test]
    fn small_range_does_not_split() {
        // A dedicated thread gives this a clean thread-local split history,
        // since the test harness may otherwise reuse an OS thread that
        // already called a partitioner in another test.
        std::thread::spawn(|| {
            let p = default_partitioner(4);
            assert_eq!(p(0, 4), 4);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn large_range_splits_in_half_first() {
        std::thread::spawn(|| {
            let p = default_partitioner(100_000);
            let mid = p(0, 100_000);
            assert_eq!(mid, 50_000);
        })
        .join()
        .unwrap();
    }
}
