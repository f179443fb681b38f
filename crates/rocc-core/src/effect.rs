//! Transition effects
//!
//! State machines never touch timers, transports or listeners directly.
//! They return the effects of a transition as data and the session driver
//! executes them in order.

use rocc_api::Message;
use std::time::Duration;

use crate::TimerKind;

/// A single side effect of a transition
#[derive(Debug, Clone)]
pub enum Effect<N> {
    /// Hand a message to the transport
    Dispatch(Message),
    /// Arm (or re-arm) a timer of the given kind
    ArmTimer(TimerKind, Duration),
    CancelTimer(TimerKind),
    /// Invoke a listener or context callback
    Notify(N),
    /// Session reached its terminal state; release it
    Release,
}

/// Ordered effects produced by one transition
#[derive(Debug, Clone)]
pub struct Transition<N> {
    pub effects: Vec<Effect<N>>,
}

impl<N> Transition<N> {
    pub fn new() -> Self {
        Self {
            effects: Vec::new(),
        }
    }

    pub fn dispatch(&mut self, message: Message) -> &mut Self {
        self.effects.push(Effect::Dispatch(message));
        self
    }

    pub fn arm(&mut self, kind: TimerKind, duration: Duration) -> &mut Self {
        self.effects.push(Effect::ArmTimer(kind, duration));
        self
    }

    pub fn cancel(&mut self, kind: TimerKind) -> &mut Self {
        self.effects.push(Effect::CancelTimer(kind));
        self
    }

    pub fn notify(&mut self, notification: N) -> &mut Self {
        self.effects.push(Effect::Notify(notification));
        self
    }

    pub fn release(&mut self) -> &mut Self {
        self.effects.push(Effect::Release);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn releases(&self) -> bool {
        self.effects.iter().any(|e| matches!(e, Effect::Release))
    }

    /// Duration of the last arm of `kind`, if any
    pub fn armed(&self, kind: TimerKind) -> Option<Duration> {
        self.effects.iter().rev().find_map(|e| match e {
            Effect::ArmTimer(k, d) if *k == kind => Some(*d),
            _ => None,
        })
    }

    pub fn cancels(&self, kind: TimerKind) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e, Effect::CancelTimer(k) if *k == kind))
    }

    pub fn dispatched(&self) -> impl Iterator<Item = &Message> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Dispatch(m) => Some(m),
            _ => None,
        })
    }

    pub fn notifications(&self) -> impl Iterator<Item = &N> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Notify(n) => Some(n),
            _ => None,
        })
    }
}

impl<N> Default for Transition<N> {
    fn default() -> Self {
        Self::new()
    }
}
