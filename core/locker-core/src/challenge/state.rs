use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{LockerError, Result};
use crate::types::{normalize_package, Challenge};

use super::transition::{next_step, phase, Phase, SlotEvent, Step};

/// How long a challenge may stay unanswered before it counts as failed.
pub const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(Challenge),
    /// A challenge for the same package was already running.
    Existing(Challenge),
}

impl StartOutcome {
    pub fn challenge(&self) -> &Challenge {
        match self {
            StartOutcome::Started(challenge) | StartOutcome::Existing(challenge) => challenge,
        }
    }

    pub fn into_challenge(self) -> Challenge {
        match self {
            StartOutcome::Started(challenge) | StartOutcome::Existing(challenge) => challenge,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

/// How a `finish` call resolved the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Granted(Challenge),
    Failed(Challenge),
    Expired(Challenge),
    Idle,
}

/// Process-wide holder of the one in-flight challenge.
///
/// Every mutation takes the slot lock, so two concurrent `start` calls for
/// different packages cannot both succeed. Readers get cloned snapshots.
pub struct ChallengeState {
    slot: Mutex<Option<Challenge>>,
    next_id: AtomicU64,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl ChallengeState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_timeout(clock, CHALLENGE_TIMEOUT)
    }

    pub fn with_timeout(clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        ChallengeState {
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
            timeout,
            clock,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn start(&self, package_name: &str) -> Result<StartOutcome> {
        let package = normalize_package(package_name)?;
        let mut slot = self.lock_slot();
        let now = self.clock.now();
        let current_phase = phase(slot.as_ref(), now, self.timeout);
        let same_package = slot
            .as_ref()
            .map(|challenge| challenge.locked_package == package)
            .unwrap_or(false);

        match next_step(current_phase, SlotEvent::Start { same_package }) {
            Step::Reuse => {
                let existing = slot.clone().ok_or_else(|| {
                    LockerError::InvalidState("reuse requested on an empty slot".to_string())
                })?;
                tracing::debug!(package = %package, id = existing.id, "Challenge already in progress");
                Ok(StartOutcome::Existing(existing))
            }
            Step::Reject => {
                let active = slot
                    .as_ref()
                    .map(|challenge| challenge.locked_package.clone())
                    .unwrap_or_default();
                tracing::debug!(requested = %package, active = %active, "Challenge slot busy");
                Err(LockerError::ChallengeBusy { active })
            }
            _ => {
                if current_phase == Phase::Expired {
                    if let Some(stale) = slot.as_ref() {
                        tracing::warn!(package = %stale.locked_package, id = stale.id, "Replacing expired challenge");
                    }
                }
                let challenge = Challenge {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    locked_package: package,
                    start_time: now,
                    started_at: self.clock.wall_now(),
                };
                tracing::info!(package = %challenge.locked_package, id = challenge.id, "Challenge started");
                *slot = Some(challenge.clone());
                Ok(StartOutcome::Started(challenge))
            }
        }
    }

    /// Clears the slot and returns the unlocked package on success.
    ///
    /// Completing while idle is a logged no-op. Completing an expired
    /// challenge never returns a package.
    pub fn complete(&self, success: bool) -> Option<String> {
        match self.finish(success) {
            Completion::Granted(challenge) => Some(challenge.locked_package),
            _ => None,
        }
    }

    pub fn finish(&self, success: bool) -> Completion {
        let mut slot = self.lock_slot();
        let now = self.clock.now();
        let current_phase = phase(slot.as_ref(), now, self.timeout);

        match next_step(current_phase, SlotEvent::Complete { success }) {
            Step::Clear { grant } => match slot.take() {
                Some(challenge) if grant => {
                    tracing::info!(package = %challenge.locked_package, id = challenge.id, "Challenge passed");
                    Completion::Granted(challenge)
                }
                Some(challenge) => {
                    tracing::info!(package = %challenge.locked_package, id = challenge.id, "Challenge failed");
                    Completion::Failed(challenge)
                }
                None => Completion::Idle,
            },
            Step::Expire => match slot.take() {
                Some(challenge) => {
                    let err = LockerError::TimeoutExpired {
                        package: challenge.locked_package.clone(),
                    };
                    tracing::warn!(id = challenge.id, error = %err, "Answer arrived too late");
                    Completion::Expired(challenge)
                }
                None => Completion::Idle,
            },
            _ => {
                tracing::debug!(error = %LockerError::InvalidState("no challenge in progress".to_string()), "Ignoring completion");
                Completion::Idle
            }
        }
    }

    /// Clears and returns the challenge if it has outlived the timeout.
    pub fn take_expired(&self) -> Option<Challenge> {
        let mut slot = self.lock_slot();
        let now = self.clock.now();
        match next_step(phase(slot.as_ref(), now, self.timeout), SlotEvent::Sweep) {
            Step::Expire => {
                let expired = slot.take();
                if let Some(challenge) = expired.as_ref() {
                    tracing::warn!(package = %challenge.locked_package, id = challenge.id, "Challenge timed out");
                }
                expired
            }
            _ => None,
        }
    }

    pub fn reset(&self) {
        if let Some(challenge) = self.lock_slot().take() {
            tracing::debug!(package = %challenge.locked_package, id = challenge.id, "Challenge reset");
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.current().is_some()
    }

    /// The live challenge, if any. Expired challenges are reported as absent.
    pub fn current(&self) -> Option<Challenge> {
        let slot = self.lock_slot();
        match phase(slot.as_ref(), self.clock.now(), self.timeout) {
            Phase::InProgress => slot.clone(),
            Phase::Idle | Phase::Expired => None,
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Challenge>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn state() -> (Arc<ManualClock>, ChallengeState) {
        let clock = Arc::new(ManualClock::new());
        let state = ChallengeState::new(clock.clone());
        (clock, state)
    }

    #[test]
    fn starts_idle() {
        let (_, state) = state();
        assert!(!state.is_in_progress());
        assert!(state.current().is_none());
    }

    #[test]
    fn start_is_idempotent_for_same_package() {
        let (clock, state) = state();
        let first = state.start("com.a").unwrap();
        clock.advance(Duration::from_secs(5));
        let second = state.start("com.a").unwrap();

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.challenge().start_time, second.challenge().start_time);
        assert_eq!(first.challenge().id, second.challenge().id);
    }

    #[test]
    fn start_for_other_package_is_rejected() {
        let (_, state) = state();
        state.start("com.a").unwrap();

        let err = state.start("com.b").unwrap_err();
        assert!(matches!(err, LockerError::ChallengeBusy { ref active } if active == "com.a"));
        assert_eq!(state.current().unwrap().locked_package, "com.a");
    }

    #[test]
    fn complete_success_returns_package() {
        let (_, state) = state();
        state.start("com.a").unwrap();

        assert_eq!(state.complete(true), Some("com.a".to_string()));
        assert!(!state.is_in_progress());
    }

    #[test]
    fn complete_failure_clears_without_package() {
        let (_, state) = state();
        state.start("com.a").unwrap();

        assert_eq!(state.complete(false), None);
        assert!(!state.is_in_progress());
    }

    #[test]
    fn complete_while_idle_is_noop() {
        let (_, state) = state();
        assert_eq!(state.complete(true), None);
        assert_eq!(state.finish(false), Completion::Idle);
    }

    #[test]
    fn challenge_times_out_after_thirty_seconds() {
        let (clock, state) = state();
        state.start("com.b").unwrap();

        clock.advance(Duration::from_secs(30));
        assert!(state.is_in_progress());

        clock.advance(Duration::from_secs(1));
        assert!(!state.is_in_progress());
        assert!(state.current().is_none());
    }

    #[test]
    fn expired_challenge_cannot_be_granted() {
        let (clock, state) = state();
        state.start("com.b").unwrap();
        clock.advance(Duration::from_secs(31));

        assert!(matches!(state.finish(true), Completion::Expired(_)));
        assert_eq!(state.complete(true), None);
    }

    #[test]
    fn take_expired_clears_only_stale_challenges() {
        let (clock, state) = state();
        state.start("com.b").unwrap();
        assert!(state.take_expired().is_none());

        clock.advance(Duration::from_secs(31));
        let expired = state.take_expired().unwrap();
        assert_eq!(expired.locked_package, "com.b");
        assert!(state.take_expired().is_none());
    }

    #[test]
    fn start_after_expiry_creates_new_challenge() {
        let (clock, state) = state();
        let first = state.start("com.a").unwrap().into_challenge();
        clock.advance(Duration::from_secs(31));

        let second = state.start("com.b").unwrap();
        assert!(second.is_new());
        assert_ne!(second.challenge().id, first.id);
        assert_eq!(second.challenge().locked_package, "com.b");
    }

    #[test]
    fn start_rejects_blank_package() {
        let (_, state) = state();
        assert!(matches!(
            state.start(" "),
            Err(LockerError::InvalidPackage(_))
        ));
    }

    #[test]
    fn concurrent_starts_admit_one_package() {
        let (_, state) = state();
        let state = Arc::new(state);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || state.start(&format!("com.app{}", i)).is_ok())
            })
            .collect();

        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(started, 1);
    }
}
