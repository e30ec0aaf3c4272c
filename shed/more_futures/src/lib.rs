/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Cancellable, lazily-continuable futures.
//!
//! A shared state ([`shared_state::SharedState`]) connects a producer
//! (`Promise`/`PackagedTask`) to a consumer (`Future`/`SharedFuture`). The
//! consumer's capability set — lazy continuations, cooperative
//! cancellation, neither, or both — is a compile-time type parameter
//! (`C: future::Caps`) rather than a class hierarchy; see `future`'s module
//! doc for why.
//!
//! ```
//! use more_futures::executor::InlineExecutor;
//! use more_futures::future::Continuable;
//! use more_futures::promise::Promise;
//! use more_futures::combinators::then;
//!
//! let ex = InlineExecutor;
//! let promise: Promise<i32, Continuable> = Promise::new();
//! let future = promise.get_future().unwrap();
//! promise.set_value(1).unwrap();
//! let mut doubled = then::then(&ex, future, then::Unwrap::Value(Box::new(|x| x * 2)));
//! assert_eq!(doubled.get().unwrap(), 2);
//! ```

pub mod combinators;
pub mod continuation;
pub mod error;
pub mod executor;
pub mod future;
pub mod promise;
pub mod shared_state;
pub mod stop;

pub use combinators::then::then;
pub use combinators::then::then_blocking;
pub use combinators::then::then_shared;
pub use combinators::then::then_with_fresh_token;
pub use combinators::then::then_with_token;
pub use combinators::then::Unwrap;
pub use combinators::when_all::get_all3;
pub use combinators::when_all::when_all2;
pub use combinators::when_all::when_all3;
pub use combinators::when_all::when_all_vec;
pub use combinators::when_all::then_all2;
pub use combinators::when_all::WhenAll2;
pub use combinators::when_all::WhenAllVec;
pub use combinators::when_any::then_any2;
pub use combinators::when_any::then_any_vec;
pub use combinators::when_any::then_any_vec_future;
pub use combinators::when_any::then_any_vec_value;
pub use combinators::when_any::when_any2;
pub use combinators::when_any::when_any_vec;
pub use combinators::when_any::WhenAny2;
pub use combinators::when_any::WhenAnyVec;
pub use error::ErrorCategory;
pub use error::ErrorPayload;
pub use error::FuturesError;
pub use executor::Executor;
pub use executor::ExecutionPolicy;
pub use executor::InlineExecutor;
pub use executor::PolicyExecutor;
pub use executor::TokioExecutor;
pub use future::CFuture;
pub use future::Continuable;
pub use future::ContinuableJoinable;
pub use future::Future;
pub use future::JCFuture;
pub use future::JFuture;
pub use future::Joinable;
pub use future::Plain;
pub use future::PlainFuture;
pub use future::SharedFuture;
pub use promise::PackagedTask;
pub use promise::Promise;
pub use promise::TaskPanicked;
pub use stop::StopSource;
pub use stop::StopToken;
