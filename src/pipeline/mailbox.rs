//! Latest-value mailbox: a single slot shared between threads.
//!
//! `replace` overwrites an unconsumed value, `put` waits for the slot to
//! empty. The mailbox closes when the last `Sender` is dropped; once the
//! `Receiver` is gone every send hands its value back instead of blocking.
//! Blocking calls wake at least every `POLL_INTERVAL` to re-check the
//! `Shutdown` flag.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::shutdown::Shutdown;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Slot<T> {
    value: Option<T>,
    senders: usize,
    receiver_alive: bool,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    changed: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Slot<T>>, timeout: Duration) -> MutexGuard<'a, Slot<T>> {
        self.changed
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }
}

/// The receiver is gone; the value is handed back.
#[derive(Debug, PartialEq, Eq)]
pub struct Disconnected<T>(pub T);

/// Why a blocking `put` gave up. Both variants return the value.
#[derive(Debug, PartialEq, Eq)]
pub enum SendError<T> {
    Stopped(T),
    Disconnected(T),
}

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Stopped(value) | Self::Disconnected(value) => value,
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped(_) => write!(f, "pipeline is stopping"),
            Self::Disconnected(_) => write!(f, "mailbox receiver is gone"),
        }
    }
}

/// Outcome of a receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
    Value(T),
    /// Nothing available (yet).
    Empty,
    /// Every sender is gone and the slot is empty.
    Closed,
    /// Stop was broadcast.
    Stopped,
}

/// Create a connected sender/receiver pair.
pub fn mailbox<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            value: None,
            senders: 1,
            receiver_alive: true,
        }),
        changed: Condvar::new(),
    });
    (
        Sender {
            shared: shared.clone(),
        },
        Receiver { shared },
    )
}

pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Store `value`, returning the unconsumed value it overwrote.
    pub fn replace(&self, value: T) -> Result<Option<T>, Disconnected<T>> {
        let mut slot = self.shared.lock();
        if !slot.receiver_alive {
            return Err(Disconnected(value));
        }
        let previous = slot.value.replace(value);
        drop(slot);
        self.shared.changed.notify_all();
        Ok(previous)
    }

    /// Store `value` once the slot is empty. Gives up when stop is broadcast
    /// or the receiver is dropped.
    pub fn put(&self, value: T, shutdown: &Shutdown) -> Result<(), SendError<T>> {
        let mut slot = self.shared.lock();
        loop {
            if shutdown.is_triggered() {
                return Err(SendError::Stopped(value));
            }
            if !slot.receiver_alive {
                return Err(SendError::Disconnected(value));
            }
            if slot.value.is_none() {
                slot.value = Some(value);
                drop(slot);
                self.shared.changed.notify_all();
                return Ok(());
            }
            slot = self.shared.wait(slot, POLL_INTERVAL);
        }
    }

    pub fn is_disconnected(&self) -> bool {
        !self.shared.lock().receiver_alive
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.lock().senders += 1;
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut slot = self.shared.lock();
        slot.senders = slot.senders.saturating_sub(1);
        drop(slot);
        self.shared.changed.notify_all();
    }
}

pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Take the current value without blocking.
    pub fn try_take(&self) -> Recv<T> {
        let mut slot = self.shared.lock();
        match slot.value.take() {
            Some(value) => {
                drop(slot);
                self.shared.changed.notify_all();
                Recv::Value(value)
            }
            None if slot.senders == 0 => Recv::Closed,
            None => Recv::Empty,
        }
    }

    /// Block until a value arrives, the mailbox closes or stop is broadcast.
    /// Stop wins over a pending value.
    pub fn take(&self, shutdown: &Shutdown) -> Recv<T> {
        self.take_until(None, shutdown)
    }

    /// Like `take`, but returns `Recv::Empty` once `timeout` has elapsed.
    pub fn take_timeout(&self, timeout: Duration, shutdown: &Shutdown) -> Recv<T> {
        self.take_until(Some(Instant::now() + timeout), shutdown)
    }

    /// Discard values until every sender is gone. Ignores stop: the senders
    /// are expected to observe it and drop. Returns how many were discarded.
    pub fn drain(&self) -> usize {
        let mut discarded = 0;
        let mut slot = self.shared.lock();
        loop {
            if slot.value.take().is_some() {
                discarded += 1;
                self.shared.changed.notify_all();
            }
            if slot.senders == 0 {
                return discarded;
            }
            slot = self.shared.wait(slot, POLL_INTERVAL);
        }
    }

    fn take_until(&self, deadline: Option<Instant>, shutdown: &Shutdown) -> Recv<T> {
        let mut slot = self.shared.lock();
        loop {
            if shutdown.is_triggered() {
                return Recv::Stopped;
            }
            if let Some(value) = slot.value.take() {
                drop(slot);
                self.shared.changed.notify_all();
                return Recv::Value(value);
            }
            if slot.senders == 0 {
                return Recv::Closed;
            }
            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Recv::Empty;
                    }
                    remaining.min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };
            slot = self.shared.wait(slot, wait);
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut slot = self.shared.lock();
        slot.receiver_alive = false;
        let unread = slot.value.take();
        drop(slot);
        drop(unread);
        self.shared.changed.notify_all();
    }
}
