//! In-process [`SyncChannel`] backed by a shared hash map.
//!
//! Stands in for the distributed store in tests, benchmarks and single-process runs. Clones share
//! state, so several engines given clones of one store behave like workers of one cluster.
//! Optional artificial latency completes each request from a helper thread, which exercises the
//! issue-early/await-late path the same way a remote store would.

use super::{
    completion, CacheHint, ChannelId, GlobalKey, Handle, MergeOp, PartitionMask, PullHandle,
    PushHandle, PushRequest, SyncChannel,
};
use crate::error::{PartitionError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct StoreState {
    values: HashMap<GlobalKey, PartitionMask>,
    /// Key lists remembered under a channel id by [`CacheHint::KeepCached`].
    cached: HashMap<ChannelId, Vec<GlobalKey>>,
    pulls: usize,
    pushes: usize,
    fail_pulls: usize,
    fail_pushes: usize,
}

/// Shared in-memory key-value store of partition masks.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    /// Creates an empty store answering synchronously.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every response by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the masks of `entries` with [`MergeOp::Assign`].
    pub fn seed(&self, entries: impl IntoIterator<Item = (GlobalKey, PartitionMask)>) {
        let mut state = self.lock();
        for (key, mask) in entries {
            let stored = state.values.entry(key).or_default();
            *stored = MergeOp::Assign.apply(*stored, mask);
        }
    }

    /// Current mask of `key`; absent keys read as empty.
    pub fn get(&self, key: GlobalKey) -> PartitionMask {
        self.lock().values.get(&key).copied().unwrap_or_default()
    }

    /// Every stored non-empty mask, sorted by key.
    pub fn snapshot(&self) -> Vec<(GlobalKey, PartitionMask)> {
        let state = self.lock();
        let mut entries: Vec<_> = state
            .values
            .iter()
            .filter(|(_, mask)| !mask.is_empty())
            .map(|(&k, &m)| (k, m))
            .collect();
        entries.sort_unstable_by_key(|&(k, _)| k);
        entries
    }

    /// Number of pull requests received, failed ones included.
    pub fn pull_count(&self) -> usize {
        self.lock().pulls
    }

    /// Number of push requests received, failed ones included.
    pub fn push_count(&self) -> usize {
        self.lock().pushes
    }

    /// Channels whose key list is still cached, sorted.
    pub fn cached_channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<_> = self.lock().cached.keys().copied().collect();
        channels.sort_unstable();
        channels
    }

    /// Makes the next `n` pulls fail with a transient error.
    pub fn fail_next_pulls(&self, n: usize) {
        self.lock().fail_pulls = n;
    }

    /// Makes the next `n` pushes fail with a transient error.
    pub fn fail_next_pushes(&self, n: usize) {
        self.lock().fail_pushes = n;
    }

    fn answer<T: Send + 'static>(&self, channel: ChannelId, value: Result<T>) -> Handle<T> {
        match self.latency {
            None => Handle::ready(channel, value),
            Some(latency) => {
                let (completer, handle) = completion(channel);
                thread::spawn(move || {
                    thread::sleep(latency);
                    completer.complete(value);
                });
                handle
            }
        }
    }

    fn injected(channel: ChannelId, what: &str) -> PartitionError {
        PartitionError::Sync {
            channel,
            reason: format!("injected {what} failure"),
        }
    }
}

impl SyncChannel for InMemoryStore {
    fn pull(&self, channel: ChannelId, keys: &[GlobalKey], cache: CacheHint) -> PullHandle {
        let value = {
            let mut state = self.lock();
            state.pulls += 1;
            if state.fail_pulls > 0 {
                state.fail_pulls -= 1;
                Err(Self::injected(channel, "pull"))
            } else {
                if cache == CacheHint::KeepCached {
                    state.cached.insert(channel, keys.to_vec());
                }
                let masks: Vec<PartitionMask> = keys
                    .iter()
                    .map(|key| state.values.get(key).copied().unwrap_or_default())
                    .collect();
                Ok(masks)
            }
        };
        self.answer(channel, value)
    }

    fn push(&self, channel: ChannelId, request: PushRequest) -> PushHandle {
        let value = {
            let mut state = self.lock();
            state.pushes += 1;
            if state.fail_pushes > 0 {
                state.fail_pushes -= 1;
                Err(Self::injected(channel, "push"))
            } else if request.keys.len() != request.values.len() {
                Err(PartitionError::Sync {
                    channel,
                    reason: format!(
                        "push carries {} keys but {} values",
                        request.keys.len(),
                        request.values.len()
                    ),
                })
            } else {
                for (&key, &mask) in request.keys.iter().zip(&request.values) {
                    let stored = state.values.entry(key).or_default();
                    *stored = request.op.apply(*stored, mask);
                }
                if request.cache == CacheHint::ClearWhenDone {
                    state.cached.remove(&channel);
                }
                Ok(())
            }
        };
        self.answer(channel, value)
    }
}
