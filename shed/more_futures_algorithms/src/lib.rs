/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Data-parallel `for_each`/`find`/`count`/`reduce`/`any_of`/`all_of`/
//! `none_of` built on top of `more_futures`: every operation recursively
//! splits its input range via a [`partitioner::default_partitioner`] and
//! dispatches the right half onto a caller-supplied [`more_futures::Executor`],
//! solving the left half on the calling thread (spec §2 Component G, §5,
//! §6).
//!
//! ```
//! use more_futures::executor::InlineExecutor;
//! use more_futures_algorithms::any_of;
//!
//! let ex = InlineExecutor;
//! let items: Vec<i32> = (0..1000).collect();
//! assert!(any_of(&ex, items, |x| *x == 999));
//! ```

pub mod partitioner;
pub mod reduce;
pub mod search;

pub use partitioner::default_partitioner;
pub use reduce::count;
pub use reduce::for_each_owned;
pub use reduce::reduce;
pub use search::all_of;
pub use search::any_of;
pub use search::find;
pub use search::none_of;
