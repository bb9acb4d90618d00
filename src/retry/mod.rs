//! # Retry
//!
//! Attempt-bounded retry of operations that fail with declared transient
//! errors. There is no delay between attempts.
//!
//! ## Module structure
//! - `resumable`: [`ResumableIterator`], the replay-and-verify wrapper used
//!   for sequence results
//!
//! ## Semantics
//! - [`retry`] calls a scalar operation up to `max_tries` times
//! - [`retry_stream`] calls a sequence-producing operation until it returns a
//!   source, then wraps the source in a [`ResumableIterator`] carrying the
//!   unspent part of the budget. Failures while iterating re-create the
//!   source, replay it against the delivered items, and carry on.
//! - Only error kinds listed in the policy are retried. Replay
//!   inconsistencies ([`ErrorKind::Inconsistency`]) never are.
//! - A spent budget ends with one
//!   [`Error::ServiceUnavailable`](crate::Error::ServiceUnavailable). Items
//!   delivered before that stay delivered.
//!
//! ## Example
//! ```rust
//! use pagewalk::retry::{retry, RetryPolicy};
//! use pagewalk::{Error, ErrorKind};
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::new([ErrorKind::Transport]).with_max_tries(3);
//! let mut calls = 0;
//! let value = retry(&policy, || {
//!     calls += 1;
//!     let attempt = calls;
//!     async move {
//!         if attempt < 3 { Err(Error::transport("reset")) } else { Ok(attempt) }
//!     }
//! })
//! .await
//! .unwrap();
//! assert_eq!(value, 3);
//! # });
//! ```

pub mod resumable;


pub use resumable::{structural_eq, ReplayState, ResumableIterator, Source};

use futures::Stream;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use tracing::info;

use crate::config::BrowserConfig;
use crate::{Error, ErrorKind, Result};

/// Default number of attempts
pub const DEFAULT_MAX_TRIES: u32 = 4;

/// Which errors are worth another attempt, and how many attempts there are
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    transient: HashSet<ErrorKind>,
    max_tries: u32,
}

impl RetryPolicy {
    /// Retry on `transient` kinds, [`DEFAULT_MAX_TRIES`] attempts
    pub fn new<I: IntoIterator<Item = ErrorKind>>(transient: I) -> Self {
        Self {
            transient: transient.into_iter().collect(),
            max_tries: DEFAULT_MAX_TRIES,
        }
    }

    /// Retry on `transient` kinds, as many attempts as `config.retry_tries`
    pub fn from_config<I: IntoIterator<Item = ErrorKind>>(config: &BrowserConfig, transient: I) -> Self {
        Self::new(transient).with_max_tries(config.retry_tries)
    }

    /// Set the attempt count; at least one attempt is always made
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn transient(&self) -> &HashSet<ErrorKind> {
        &self.transient
    }

    pub fn is_transient(&self, error: &Error) -> bool {
        let kind = error.kind();
        kind != ErrorKind::Inconsistency && self.transient.contains(&kind)
    }
}

/// Call `op` until it succeeds, fails with a non-transient error, or the
/// budget is spent
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=policy.max_tries() {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if policy.is_transient(&e) => {
                info!("{} raised, retrying (attempt {}/{})", e, attempt, policy.max_tries());
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::retries_exhausted(policy.max_tries()))
}

/// Call `op` until it yields a sequence, then make that sequence resumable
///
/// Replayed items are compared with `PartialEq`.
pub async fn retry_stream<T, F, Fut, S>(policy: &RetryPolicy, op: F) -> Result<ResumableIterator<T>>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<S>> + Send + 'static,
    S: Stream<Item = Result<T>> + Send + 'static,
{
    retry_stream_with(policy, |a: &T, b: &T| a == b, op).await
}

/// [`retry_stream`] with a custom replay comparison, e.g. [`structural_eq`]
pub async fn retry_stream_with<T, C, F, Fut, S>(
    policy: &RetryPolicy,
    comparator: C,
    op: F,
) -> Result<ResumableIterator<T>>
where
    T: Clone + fmt::Debug + Send + Sync + 'static,
    C: Fn(&T, &T) -> bool + Send + Sync + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<S>> + Send + 'static,
    S: Stream<Item = Result<T>> + Send + 'static,
{
    let mut factory = resumable::boxed_factory(op);
    let max_tries = policy.max_tries();

    for attempt in 1..=max_tries {
        match factory().await {
            Ok(source) => {
                let remaining = max_tries - attempt + 1;
                return Ok(ResumableIterator::resume(
                    policy.clone(),
                    factory,
                    source,
                    remaining,
                    Box::new(comparator),
                ));
            }
            Err(e) if policy.is_transient(&e) => {
                info!("{} raised, retrying (attempt {}/{})", e, attempt, max_tries);
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::retries_exhausted(max_tries))
}
