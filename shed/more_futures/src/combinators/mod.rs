/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! `then`, `when_all`, `when_any` and the unwrap-and-continue engine
//! (spec §4.6).

pub mod then;
pub mod when_all;
pub mod when_any;
