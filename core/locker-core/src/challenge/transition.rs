//! Maps slot events to challenge state transitions.
//! Anything ambiguous resolves toward clearing the slot, never granting access.

use std::time::{Duration, Instant};

use crate::types::Challenge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InProgress,
    /// Still occupying the slot but past its timeout. Reported as idle.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEvent {
    Start { same_package: bool },
    Complete { success: bool },
    Sweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Start,
    Reuse,
    Reject,
    Clear { grant: bool },
    Expire,
    Ignore,
}

pub fn phase(current: Option<&Challenge>, now: Instant, timeout: Duration) -> Phase {
    match current {
        None => Phase::Idle,
        Some(challenge) if challenge.is_expired(now, timeout) => Phase::Expired,
        Some(_) => Phase::InProgress,
    }
}

pub fn next_step(phase: Phase, event: SlotEvent) -> Step {
    match (phase, event) {
        (Phase::Idle | Phase::Expired, SlotEvent::Start { .. }) => Step::Start,
        (Phase::InProgress, SlotEvent::Start { same_package: true }) => Step::Reuse,
        (Phase::InProgress, SlotEvent::Start { same_package: false }) => Step::Reject,
        (Phase::InProgress, SlotEvent::Complete { success }) => Step::Clear { grant: success },
        (Phase::Expired, SlotEvent::Complete { .. }) => Step::Expire,
        (Phase::Expired, SlotEvent::Sweep) => Step::Expire,
        (Phase::Idle, SlotEvent::Complete { .. }) => Step::Ignore,
        (Phase::Idle | Phase::InProgress, SlotEvent::Sweep) => Step::Ignore,
    }
}
