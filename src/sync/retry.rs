//! Bounded retries of transient synchronization failures.
//!
//! Pushes are OR-merges and pulls are reads, so re-issuing either is harmless. The first attempt
//! is issued immediately. A transient failure is re-issued by whichever thread next polls or
//! awaits the handle, so the engine's per-block reaping retries pushes without blocking.

use super::{CacheHint, ChannelId, GlobalKey, Handle, PullHandle, PushHandle, PushRequest, SyncChannel};
use std::sync::Arc;
use tracing::warn;

/// Wraps a [`SyncChannel`] and re-issues requests that fail with a transient error.
#[derive(Debug)]
pub struct RetryChannel<C> {
    inner: Arc<C>,
    retries: u32,
}

impl<C> Clone for RetryChannel<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            retries: self.retries,
        }
    }
}

impl<C: SyncChannel + 'static> RetryChannel<C> {
    /// Retries each request up to `retries` extra times.
    pub fn new(inner: C, retries: u32) -> Self {
        Self {
            inner: Arc::new(inner),
            retries,
        }
    }

    /// The wrapped channel.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Wraps `first` so a transient failure is re-issued through `reissue`.
    fn with_retries<T: Send + 'static>(
        &self,
        channel: ChannelId,
        what: &'static str,
        first: Handle<T>,
        reissue: impl Fn(&C) -> Handle<T> + Send + 'static,
    ) -> Handle<T> {
        if self.retries == 0 {
            return first;
        }
        let inner = Arc::clone(&self.inner);
        let retries = self.retries;
        Handle::retrying(first, retries, move |attempt, err| {
            warn!(channel, attempt, retries, error = %err, "{what} failed, retrying");
            reissue(inner.as_ref())
        })
    }
}

impl<C: SyncChannel + 'static> SyncChannel for RetryChannel<C> {
    fn pull(&self, channel: ChannelId, keys: &[GlobalKey], cache: CacheHint) -> PullHandle {
        let first = self.inner.pull(channel, keys, cache);
        let keys = keys.to_vec();
        self.with_retries(channel, "pull", first, move |inner| {
            inner.pull(channel, &keys, cache)
        })
    }

    fn push(&self, channel: ChannelId, request: PushRequest) -> PushHandle {
        let first = self.inner.push(channel, request.clone());
        self.with_retries(channel, "push", first, move |inner| {
            inner.push(channel, request.clone())
        })
    }
}
