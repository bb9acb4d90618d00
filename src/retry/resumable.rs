//! Resumable iteration over a re-creatable sequence
//!
//! When pulling from the source fails with a transient error, the source is
//! dropped and re-created. The new source must replay every item already
//! delivered, in the same order and with equal values, before any new item
//! is handed out. Disagreement or a short replay is fatal.

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tracing::{info, warn};

use super::RetryPolicy;
use crate::{Error, ErrorKind, Result};

/// A boxed sequence of fallible items
pub type Source<T> = BoxStream<'static, Result<T>>;

type SourceFactory<T> = Box<dyn FnMut() -> BoxFuture<'static, Result<Source<T>>> + Send>;
type Comparator<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Where a [`ResumableIterator`] stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    /// No active source
    Fresh,
    /// Replaying delivered items against a new source
    Syncing,
    /// Caught up; new items come from the source
    Live,
    /// The source ended
    Exhausted,
    /// A fatal error occurred, or the retry budget ran out
    Failed,
}

/// Compare two items through their `serde_json` forms
///
/// Object key order does not matter.
pub fn structural_eq<T: Serialize>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Sequence wrapper delivering every item exactly once, in order, across
/// transient failures of the underlying source
pub struct ResumableIterator<T> {
    factory: SourceFactory<T>,
    source: Option<Source<T>>,
    delivered: Vec<T>,
    policy: RetryPolicy,
    remaining: u32,
    comparator: Comparator<T>,
    state: ReplayState,
    failure: Option<String>,
}

pub(crate) fn boxed_factory<T, F, Fut, S>(mut op: F) -> SourceFactory<T>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<S>> + Send + 'static,
    S: Stream<Item = Result<T>> + Send + 'static,
{
    Box::new(move || {
        let created = op();
        async move { created.await.map(StreamExt::boxed) }.boxed()
    })
}

impl<T> ResumableIterator<T>
where
    T: Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Wrap `op` without calling it yet; the first pull creates the source
    pub fn new<F, Fut, S>(policy: RetryPolicy, op: F) -> Self
    where
        T: PartialEq,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<S>> + Send + 'static,
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        let remaining = policy.max_tries();
        Self {
            factory: boxed_factory(op),
            source: None,
            delivered: Vec::new(),
            policy,
            remaining,
            comparator: Box::new(|a: &T, b: &T| a == b),
            state: ReplayState::Fresh,
            failure: None,
        }
    }

    /// Continue from an already created source with `remaining` attempts left
    pub(crate) fn resume(
        policy: RetryPolicy,
        factory: SourceFactory<T>,
        source: Source<T>,
        remaining: u32,
        comparator: Comparator<T>,
    ) -> Self {
        Self {
            factory,
            source: Some(source),
            delivered: Vec::new(),
            policy,
            remaining,
            comparator,
            state: ReplayState::Live,
            failure: None,
        }
    }

    /// Replace the replay comparison
    pub fn with_comparator<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.comparator = Box::new(comparator);
        self
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Items handed out so far
    pub fn delivered(&self) -> &[T] {
        &self.delivered
    }

    /// Attempts left in the retry budget
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Next item, `None` once the source is exhausted
    pub async fn next_item(&mut self) -> Option<Result<T>> {
        loop {
            match self.state {
                ReplayState::Exhausted => return None,
                ReplayState::Failed => {
                    let reason = self.failure.clone().unwrap_or_default();
                    return Some(Err(Error::service_unavailable(format!(
                        "iteration already failed: {}",
                        reason
                    ))));
                }
                _ => {}
            }

            if self.remaining == 0 {
                let attempts = self.policy.max_tries();
                return Some(Err(self.fail(Error::retries_exhausted(attempts))));
            }

            if self.source.is_none() {
                match (self.factory)().await {
                    Ok(source) => {
                        self.source = Some(source);
                        self.state = ReplayState::Syncing;
                    }
                    Err(e) if self.policy.is_transient(&e) => {
                        self.drop_source(e);
                        continue;
                    }
                    Err(e) => return Some(Err(self.fail(e))),
                }
            }

            if self.state == ReplayState::Syncing {
                match self.replay().await {
                    Ok(()) => self.state = ReplayState::Live,
                    Err(e) if self.policy.is_transient(&e) => {
                        self.drop_source(e);
                        continue;
                    }
                    Err(e) => return Some(Err(self.fail(e))),
                }
            }

            let pulled = match self.source.as_mut() {
                Some(source) => source.next().await,
                None => continue,
            };
            match pulled {
                Some(Ok(item)) => {
                    self.delivered.push(item.clone());
                    return Some(Ok(item));
                }
                None => {
                    self.source = None;
                    self.state = ReplayState::Exhausted;
                    return None;
                }
                Some(Err(e)) if self.policy.is_transient(&e) => {
                    self.drop_source(e);
                }
                Some(Err(e)) => return Some(Err(self.fail(e))),
            }
        }
    }

    /// Pull the delivered items again from a new source and compare
    async fn replay(&mut self) -> Result<()> {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Err(Error::internal("No source to replay")),
        };

        for (index, sent) in self.delivered.iter().enumerate() {
            match source.next().await {
                Some(Ok(new)) => {
                    if !(self.comparator)(sent, &new) {
                        return Err(Error::InconsistentReplay(format!("{:?} vs {:?}", sent, new)));
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(Error::ShortReplay {
                        replayed: index,
                        expected: self.delivered.len(),
                    })
                }
            }
        }
        Ok(())
    }

    fn drop_source(&mut self, error: Error) {
        self.remaining = self.remaining.saturating_sub(1);
        info!("{} raised, retrying ({} attempts left)", error, self.remaining);
        self.source = None;
        self.state = ReplayState::Fresh;
    }

    fn fail(&mut self, error: Error) -> Error {
        if error.kind() == ErrorKind::Inconsistency {
            warn!("Giving up: {}", error);
        }
        self.source = None;
        self.state = ReplayState::Failed;
        self.failure = Some(error.to_string());
        error
    }

    /// Drain every item, stopping at the first error
    pub async fn collect_items(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item().await {
            items.push(item?);
        }
        Ok(items)
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<T>> {
        stream::unfold(self, |mut iter| async move {
            iter.next_item().await.map(|item| (item, iter))
        })
        .boxed()
    }
}

impl<T: fmt::Debug> fmt::Debug for ResumableIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumableIterator")
            .field("state", &self.state)
            .field("delivered", &self.delivered.len())
            .field("remaining", &self.remaining)
            .finish()
    }
}
