//! Session timers
//!
//! Each session owns at most one timer per [`TimerKind`]. A timer is a Tokio
//! sleep task guarded by a [`TimerToken`]: firing and cancelling both try to
//! move the token out of `Armed`, and only one of them can succeed. Expiries
//! travel through the session mailbox tagged with a generation, so an expiry
//! that was already in flight when its slot was re-armed or cancelled is
//! recognised as stale by [`TimerSlots::accept`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Timer kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Client: bounds the wait for an answer
    Tx,
    /// Client: bounds the lifetime of granted quota
    Validity,
    /// Server: idle supervision (Tcc)
    Supervision,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [TimerKind::Tx, TimerKind::Validity, TimerKind::Supervision];

    fn index(self) -> usize {
        match self {
            TimerKind::Tx => 0,
            TimerKind::Validity => 1,
            TimerKind::Supervision => 2,
        }
    }
}

/// Observable state of a timer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Armed,
    Fired,
    Cancelled,
}

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// One-shot arbitration between firing and cancelling
#[derive(Debug)]
pub struct TimerToken {
    state: AtomicU8,
}

impl TimerToken {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ARMED),
        }
    }

    /// Returns true if this call cancelled the timer
    pub fn cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    /// Returns true if this call fired the timer
    pub fn try_fire(&self) -> bool {
        self.transition(FIRED)
    }

    pub fn state(&self) -> TimerState {
        match self.state.load(Ordering::Acquire) {
            ARMED => TimerState::Armed,
            FIRED => TimerState::Fired,
            _ => TimerState::Cancelled,
        }
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(ARMED, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for TimerToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivered to the owning session when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub kind: TimerKind,
    pub generation: u64,
}

struct ArmedTimer {
    generation: u64,
    deadline: Instant,
    token: Arc<TimerToken>,
    task: JoinHandle<()>,
}

impl ArmedTimer {
    fn cancel(self) -> bool {
        let cancelled = self.token.cancel();
        self.task.abort();
        cancelled
    }
}

// Deadline used when `now + duration` overflows the clock
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Per-session timer slots, one per kind
#[derive(Default)]
pub struct TimerSlots {
    slots: [Option<ArmedTimer>; 3],
    next_generation: u64,
}

impl TimerSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer of `kind`, cancelling any previous one of that kind.
    ///
    /// `on_fire` runs on the timer task if and only if the timer fires before
    /// it is cancelled. Must be called within a Tokio runtime.
    pub fn arm<F>(&mut self, kind: TimerKind, duration: Duration, on_fire: F) -> u64
    where
        F: FnOnce(Expiry) + Send + 'static,
    {
        self.cancel(kind);

        self.next_generation += 1;
        let generation = self.next_generation;
        let now = Instant::now();
        let deadline = now
            .checked_add(duration)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let token = Arc::new(TimerToken::new());

        let task_token = token.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if task_token.try_fire() {
                on_fire(Expiry { kind, generation });
            }
        });

        trace!(?kind, generation, ?duration, "Timer armed");
        self.slots[kind.index()] = Some(ArmedTimer {
            generation,
            deadline,
            token,
            task,
        });
        generation
    }

    /// Cancel the timer of `kind`. Returns true if a pending timer was
    /// stopped before firing.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.slots[kind.index()].take() {
            Some(timer) => {
                let generation = timer.generation;
                let cancelled = timer.cancel();
                trace!(?kind, generation, cancelled, "Timer cancelled");
                cancelled
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
    }

    /// Claim an expiry. Returns true only if it belongs to the timer that
    /// currently occupies its slot; the slot is then cleared.
    pub fn accept(&mut self, expiry: Expiry) -> bool {
        let index = expiry.kind.index();
        let current = self.slots[index].as_ref().map(|t| t.generation);
        if current == Some(expiry.generation) {
            self.slots[index] = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.slots[kind.index()].as_ref().map(|t| t.deadline)
    }

    pub fn armed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Drop for TimerSlots {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
