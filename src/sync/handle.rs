//! Completion handles for asynchronous pull/push requests.
//!
//! A request is issued early and awaited late: the issuer gets a [`Handle`] immediately and the
//! transport fulfils the paired [`Completer`] whenever the response arrives. Mirrors a oneshot
//! channel: the value is delivered at most once, and a completer dropped without answering makes
//! the waiter fail with [`PartitionError::Disconnected`] instead of blocking forever.

use crate::error::{PartitionError, Result};
use crate::sync::ChannelId;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct SlotState<T> {
    value: Option<Result<T>>,
    completer_alive: bool,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    condvar: Condvar,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        // A panic while holding this lock cannot leave the slot half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Reissue<T> = Box<dyn FnMut(u32, &PartitionError) -> Handle<T> + Send>;

/// The attempt in flight plus the budget for replacing it after a transient failure.
struct Retry<T> {
    current: Handle<T>,
    reissue: Reissue<T>,
    attempt: u32,
    retries: u32,
}

impl<T> Retry<T> {
    /// `Some` is the final outcome; `None` means a fresh attempt replaced the failed one.
    fn settle(&mut self, result: Result<T>) -> Option<Result<T>> {
        match result {
            Err(err) if err.is_transient() && self.attempt < self.retries => {
                self.attempt += 1;
                self.current = (self.reissue)(self.attempt, &err);
                None
            }
            result => Some(result),
        }
    }

    fn poll(&mut self) -> Option<Result<T>> {
        loop {
            let result = self.current.try_wait()?;
            if let Some(outcome) = self.settle(result) {
                return Some(outcome);
            }
        }
    }

    fn take_current(&mut self) -> Handle<T> {
        let channel = self.current.channel;
        std::mem::replace(
            &mut self.current,
            Handle {
                channel,
                inner: Inner::Taken,
            },
        )
    }
}

enum Inner<T> {
    Pending(Arc<Slot<T>>),
    /// Re-issued on transient failure by whichever thread polls or waits.
    Retrying(Box<Retry<T>>),
    Taken,
}

/// The awaiting half of an asynchronous request.
pub struct Handle<T> {
    channel: ChannelId,
    inner: Inner<T>,
}

/// The fulfilling half of an asynchronous request.
pub struct Completer<T> {
    slot: Arc<Slot<T>>,
}

/// Awaits the partition masks of a pull, aligned positionally with the pulled keys.
pub type PullHandle = Handle<Vec<crate::sync::PartitionMask>>;

/// Awaits the acknowledgement of a push.
pub type PushHandle = Handle<()>;

/// Creates a connected completer/handle pair for a request on `channel`.
pub fn completion<T>(channel: ChannelId) -> (Completer<T>, Handle<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(SlotState {
            value: None,
            completer_alive: true,
        }),
        condvar: Condvar::new(),
    });
    (
        Completer { slot: slot.clone() },
        Handle {
            channel,
            inner: Inner::Pending(slot),
        },
    )
}

impl<T> Completer<T> {
    /// Delivers the response and wakes the waiter.
    pub fn complete(self, value: Result<T>) {
        let mut state = self.slot.lock();
        state.value = Some(value);
        self.slot.condvar.notify_all();
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        let mut state = self.slot.lock();
        state.completer_alive = false;
        if state.value.is_none() {
            self.slot.condvar.notify_all();
        }
    }
}

impl<T> Handle<T> {
    /// A handle that is already resolved.
    pub fn ready(channel: ChannelId, value: Result<T>) -> Self {
        let (completer, handle) = completion(channel);
        completer.complete(value);
        handle
    }

    /// Wraps `first` so that a transient failure is replaced by `reissue(attempt, &error)`, up to
    /// `retries` times. Failures are detected by [`try_wait`](Self::try_wait) as well as by the
    /// blocking waits, so a poller drives the retries without ever blocking.
    pub fn retrying<F>(first: Handle<T>, retries: u32, reissue: F) -> Self
    where
        T: 'static,
        F: FnMut(u32, &PartitionError) -> Handle<T> + Send + 'static,
    {
        Self {
            channel: first.channel,
            inner: Inner::Retrying(Box::new(Retry {
                current: first,
                reissue: Box::new(reissue),
                attempt: 0,
                retries,
            })),
        }
    }

    /// Channel the request was tagged with.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Blocks until the response is available.
    pub fn wait(mut self) -> Result<T> {
        match std::mem::replace(&mut self.inner, Inner::Taken) {
            Inner::Pending(slot) => {
                let mut state = slot.lock();
                loop {
                    if let Some(value) = state.value.take() {
                        return value;
                    }
                    if !state.completer_alive {
                        return Err(PartitionError::Disconnected("synchronization response"));
                    }
                    state = slot.condvar.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
            }
            Inner::Retrying(mut retry) => loop {
                let result = retry.take_current().wait();
                if let Some(outcome) = retry.settle(result) {
                    return outcome;
                }
            },
            Inner::Taken => Err(PartitionError::Disconnected("synchronization response")),
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, reporting a synchronization failure.
    ///
    /// The timeout covers every retry attempt together.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<T> {
        let channel = self.channel;
        let deadline = Instant::now() + timeout;
        match std::mem::replace(&mut self.inner, Inner::Taken) {
            Inner::Pending(slot) => {
                let state = slot.lock();
                let (mut state, result) = slot
                    .condvar
                    .wait_timeout_while(state, timeout, |s| s.value.is_none() && s.completer_alive)
                    .unwrap_or_else(PoisonError::into_inner);
                match state.value.take() {
                    Some(value) => value,
                    None if result.timed_out() => Err(PartitionError::Sync {
                        channel,
                        reason: format!("no response within {timeout:?}"),
                    }),
                    None => Err(PartitionError::Disconnected("synchronization response")),
                }
            }
            Inner::Retrying(mut retry) => loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let result = retry.take_current().wait_timeout(remaining);
                if remaining.is_zero() || Instant::now() >= deadline {
                    return result;
                }
                if let Some(outcome) = retry.settle(result) {
                    return outcome;
                }
            },
            Inner::Taken => Err(PartitionError::Disconnected("synchronization response")),
        }
    }

    /// Takes the response if it already arrived, without blocking.
    ///
    /// A retrying handle re-issues a transiently failed attempt here and reports `None` until
    /// the replacement resolves.
    pub fn try_wait(&mut self) -> Option<Result<T>> {
        let value = match &mut self.inner {
            Inner::Pending(slot) => {
                let mut state = slot.lock();
                let value = state.value.take();
                let alive = state.completer_alive;
                drop(state);
                match value {
                    Some(value) => value,
                    None if !alive => Err(PartitionError::Disconnected("synchronization response")),
                    None => return None,
                }
            }
            Inner::Retrying(retry) => retry.poll()?,
            Inner::Taken => return None,
        };
        self.inner = Inner::Taken;
        Some(value)
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            Inner::Pending(_) => "pending",
            Inner::Retrying(_) => "retrying",
            Inner::Taken => "taken",
        };
        f.debug_struct("Handle")
            .field("channel", &self.channel)
            .field("state", &state)
            .finish()
    }
}
