//! The decision core: foreground event in, allow / challenge / deny out.
//!
//! # Foreground Decision Order
//!
//! ```text
//! expired challenge?      → sweep it (counts as a failure, deny its package)
//! own package             → allow, no bookkeeping
//! app switch              → end the previous app's session
//! master switch off       → allow
//! completed this session  → allow
//! not locked              → allow        (storage error ⇒ treated as locked)
//!                           (HomeScreen reason when it is a launcher)
//! slot idle               → start challenge, present it
//! slot busy, same package → nothing to do, UI is already showing it
//! slot busy, other package→ keep the existing challenge, deny this one
//! ```
//!
//! # Locking
//!
//! All coordinator bookkeeping (sessions, current puzzle, stats) sits behind
//! one mutex. Presenter callbacks and the attempt hook run after that mutex
//! is released, so either may call back into the coordinator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::challenge::{ChallengeState, Completion, StartOutcome};
use crate::clock::{Clock, SystemClock};
use crate::error::{LockerError, Result};
use crate::events::ForegroundEvent;
use crate::presenter::{ChallengePresenter, NoopPresenter};
use crate::registry::LockRegistry;
use crate::session::{is_home_screen, SessionTracker};
use crate::settings::LockerSettings;
use crate::stroop::{PuzzleSource, StroopGenerator, StroopPuzzle};
use crate::types::{
    normalize_package, ActiveChallenge, AllowReason, AnswerOutcome, AttemptResult, Challenge,
    ChallengeStats, Decision, LockSet,
};

/// Package name of the locker's own UI. Its foreground events are ignored.
pub const DEFAULT_OWN_PACKAGE: &str = "dev.strooplocker";

type AttemptHook = Box<dyn Fn(&str, AttemptResult) + Send + Sync>;

enum Signal {
    Attempt(String, AttemptResult),
    Present(ActiveChallenge),
    Allow(String),
    Deny(String),
}

/// Puzzle currently shown for the challenge with id `challenge_id`.
struct Round {
    challenge_id: u64,
    puzzle: StroopPuzzle,
    rounds_remaining: u32,
}

impl Round {
    fn to_active(&self, challenge: Challenge) -> ActiveChallenge {
        ActiveChallenge {
            challenge,
            puzzle: self.puzzle.clone(),
            rounds_remaining: self.rounds_remaining,
        }
    }
}

struct Inner {
    sessions: SessionTracker,
    round: Option<Round>,
    stats: ChallengeStats,
}

pub struct LockCoordinator {
    registry: Arc<LockRegistry>,
    challenges: Arc<ChallengeState>,
    presenter: Arc<dyn ChallengePresenter>,
    puzzles: Arc<dyn PuzzleSource>,
    clock: Arc<dyn Clock>,
    settings: LockerSettings,
    own_package: String,
    on_attempt: Option<AttemptHook>,
    inner: Mutex<Inner>,
    resolving: AtomicBool,
}

pub struct LockCoordinatorBuilder {
    registry: Arc<LockRegistry>,
    challenges: Option<Arc<ChallengeState>>,
    presenter: Arc<dyn ChallengePresenter>,
    puzzles: Arc<dyn PuzzleSource>,
    clock: Arc<dyn Clock>,
    settings: LockerSettings,
    own_package: String,
    initial_stats: ChallengeStats,
    on_attempt: Option<AttemptHook>,
}

impl LockCoordinatorBuilder {
    pub fn settings(mut self, settings: LockerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn presenter(mut self, presenter: Arc<dyn ChallengePresenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn puzzles(mut self, puzzles: Arc<dyn PuzzleSource>) -> Self {
        self.puzzles = puzzles;
        self
    }

    /// Shares an existing slot instead of creating one from the settings'
    /// timeout and the builder's clock.
    pub fn challenge_state(mut self, challenges: Arc<ChallengeState>) -> Self {
        self.challenges = Some(challenges);
        self
    }

    pub fn own_package(mut self, package_name: &str) -> Self {
        self.own_package = package_name.trim().to_string();
        self
    }

    pub fn initial_stats(mut self, stats: ChallengeStats) -> Self {
        self.initial_stats = stats;
        self
    }

    pub fn on_attempt<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, AttemptResult) + Send + Sync + 'static,
    {
        self.on_attempt = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> LockCoordinator {
        let challenges = self.challenges.unwrap_or_else(|| {
            Arc::new(ChallengeState::with_timeout(
                Arc::clone(&self.clock),
                self.settings.challenge_timeout(),
            ))
        });
        LockCoordinator {
            registry: self.registry,
            challenges,
            presenter: self.presenter,
            puzzles: self.puzzles,
            clock: self.clock,
            own_package: self.own_package,
            on_attempt: self.on_attempt,
            inner: Mutex::new(Inner {
                sessions: SessionTracker::new(self.settings.session_duration()),
                round: None,
                stats: self.initial_stats,
            }),
            settings: self.settings,
            resolving: AtomicBool::new(false),
        }
    }
}

/// Clears the one-shot answer guard when an answer finishes resolving.
struct ResolvingGuard<'a>(&'a AtomicBool);

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl LockCoordinator {
    pub fn builder(registry: Arc<LockRegistry>) -> LockCoordinatorBuilder {
        LockCoordinatorBuilder {
            registry,
            challenges: None,
            presenter: Arc::new(NoopPresenter),
            puzzles: Arc::new(StroopGenerator::new()),
            clock: Arc::new(SystemClock),
            settings: LockerSettings::default(),
            own_package: DEFAULT_OWN_PACKAGE.to_string(),
            initial_stats: ChallengeStats::default(),
            on_attempt: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Foreground events
    // ─────────────────────────────────────────────────────────────────────

    pub fn handle_foreground(&self, event: &ForegroundEvent) -> Decision {
        let mut signals = Vec::new();
        let decision = {
            let mut inner = self.lock_inner();
            self.sweep_locked(&mut inner, &mut signals);
            self.decide(&mut inner, event, &mut signals)
        };
        tracing::debug!(package = %event.package, decision = decision_label(&decision), "Foreground decision");
        self.emit(signals);
        decision
    }

    fn decide(&self, inner: &mut Inner, event: &ForegroundEvent, signals: &mut Vec<Signal>) -> Decision {
        let package = match normalize_package(&event.package) {
            Ok(package) => package,
            Err(err) => {
                tracing::debug!(error = %err, "Ignoring foreground event without a package");
                return Decision::allow(AllowReason::NotLocked);
            }
        };

        if package == self.own_package {
            return Decision::allow(AllowReason::OwnPackage);
        }

        let now = self.clock.now();
        inner.sessions.prune_expired(now);
        inner.sessions.handle_switch(&package);

        if self.settings.master_disable {
            return Decision::allow(AllowReason::MasterDisabled);
        }
        if inner.sessions.is_completed(&package, now) {
            return Decision::allow(AllowReason::Completed);
        }

        match self.registry.is_locked(&package) {
            Ok(false) if is_home_screen(&package) => return Decision::allow(AllowReason::HomeScreen),
            Ok(false) => return Decision::allow(AllowReason::NotLocked),
            Ok(true) => {}
            Err(err) => {
                tracing::warn!(package = %package, error = %err, "Lock lookup failed, treating app as locked");
            }
        }

        match self.challenges.start(&package) {
            Ok(StartOutcome::Started(challenge)) => {
                let active = self.open_round(inner, challenge);
                signals.push(Signal::Present(active.clone()));
                Decision::Challenge { challenge: active }
            }
            Ok(StartOutcome::Existing(challenge)) => {
                if Self::current_round(inner, &challenge).is_none() {
                    let active = self.open_round(inner, challenge.clone());
                    signals.push(Signal::Present(active));
                }
                Decision::AlreadyChallenging { challenge }
            }
            Err(LockerError::ChallengeBusy { active }) => {
                tracing::info!(package = %package, active = %active, "Challenge slot busy, denying");
                signals.push(Signal::Deny(package));
                Decision::Busy { active }
            }
            Err(err) => {
                tracing::warn!(package = %package, error = %err, "Could not start challenge, denying");
                signals.push(Signal::Deny(package));
                Decision::Denied {
                    reason: err.to_string(),
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // UI entry points
    // ─────────────────────────────────────────────────────────────────────

    /// Returns the running challenge for `package_name`, starting one if the
    /// slot is free.
    pub fn start_or_get_challenge(&self, package_name: &str) -> Result<ActiveChallenge> {
        let mut signals = Vec::new();
        let result = {
            let mut inner = self.lock_inner();
            self.sweep_locked(&mut inner, &mut signals);
            self.challenges.start(package_name).map(|outcome| match outcome {
                StartOutcome::Started(challenge) => {
                    let active = self.open_round(&mut inner, challenge);
                    signals.push(Signal::Present(active.clone()));
                    active
                }
                StartOutcome::Existing(challenge) => match Self::current_round(&inner, &challenge) {
                    Some(active) => active,
                    None => self.open_round(&mut inner, challenge),
                },
            })
        };
        self.emit(signals);
        result
    }

    pub fn submit_answer(&self, selected_color: &str) -> AnswerOutcome {
        self.resolve_answer(None, selected_color)
    }

    /// Like [`submit_answer`](Self::submit_answer), but ignores answers aimed
    /// at a challenge that is no longer the current one.
    pub fn submit_answer_for(&self, challenge_id: u64, selected_color: &str) -> AnswerOutcome {
        self.resolve_answer(Some(challenge_id), selected_color)
    }

    fn resolve_answer(&self, challenge_id: Option<u64>, selected_color: &str) -> AnswerOutcome {
        if self
            .resolving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Answer already resolving, ignoring submission");
            return AnswerOutcome::Ignored;
        }
        let _guard = ResolvingGuard(&self.resolving);

        let mut signals = Vec::new();
        let outcome = {
            let mut inner = self.lock_inner();
            self.sweep_locked(&mut inner, &mut signals);
            self.judge(&mut inner, challenge_id, selected_color, &mut signals)
        };
        self.emit(signals);
        outcome
    }

    fn judge(
        &self,
        inner: &mut Inner,
        challenge_id: Option<u64>,
        selected_color: &str,
        signals: &mut Vec<Signal>,
    ) -> AnswerOutcome {
        let Some(current) = self.challenges.current() else {
            inner.round = None;
            return AnswerOutcome::NoChallenge;
        };
        if challenge_id.is_some_and(|id| id != current.id) {
            tracing::debug!(expected = ?challenge_id, current = current.id, "Answer for stale challenge");
            return AnswerOutcome::Ignored;
        }
        let Some(round) = inner.round.as_mut().filter(|r| r.challenge_id == current.id) else {
            tracing::warn!(id = current.id, "Challenge has no puzzle attached, ignoring answer");
            return AnswerOutcome::Ignored;
        };

        if !round.puzzle.check(selected_color) {
            return self.finish(inner, false, signals);
        }

        round.rounds_remaining = round.rounds_remaining.saturating_sub(1);
        if round.rounds_remaining > 0 {
            round.puzzle = self.puzzles.next_puzzle();
            tracing::debug!(id = current.id, remaining = round.rounds_remaining, "Correct answer, next round");
            let active = round.to_active(current);
            signals.push(Signal::Present(active.clone()));
            return AnswerOutcome::NextRound { challenge: active };
        }

        self.finish(inner, true, signals)
    }

    fn finish(&self, inner: &mut Inner, success: bool, signals: &mut Vec<Signal>) -> AnswerOutcome {
        inner.round = None;
        match self.challenges.finish(success) {
            Completion::Granted(challenge) => {
                let package = challenge.locked_package;
                inner.sessions.mark_completed(&package, self.clock.now());
                self.record(inner, signals, &package, AttemptResult::Success);
                signals.push(Signal::Allow(package.clone()));
                AnswerOutcome::Granted { package }
            }
            Completion::Failed(challenge) => {
                let package = challenge.locked_package;
                self.record(inner, signals, &package, AttemptResult::Failure);
                signals.push(Signal::Deny(package.clone()));
                AnswerOutcome::Denied { package }
            }
            Completion::Expired(challenge) => {
                let package = challenge.locked_package;
                self.record(inner, signals, &package, AttemptResult::Timeout);
                signals.push(Signal::Deny(package.clone()));
                AnswerOutcome::Denied { package }
            }
            Completion::Idle => AnswerOutcome::NoChallenge,
        }
    }

    pub fn is_challenge_active(&self) -> bool {
        self.challenges.is_in_progress()
    }

    pub fn current_challenge(&self) -> Option<ActiveChallenge> {
        let inner = self.lock_inner();
        let challenge = self.challenges.current()?;
        Self::current_round(&inner, &challenge)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Timeout sweep
    // ─────────────────────────────────────────────────────────────────────

    /// Clears an expired challenge and denies its package.
    pub fn sweep_expired(&self) -> Option<Challenge> {
        let mut signals = Vec::new();
        let expired = {
            let mut inner = self.lock_inner();
            self.sweep_locked(&mut inner, &mut signals)
        };
        self.emit(signals);
        expired
    }

    fn sweep_locked(&self, inner: &mut Inner, signals: &mut Vec<Signal>) -> Option<Challenge> {
        let expired = self.challenges.take_expired()?;
        if inner
            .round
            .as_ref()
            .is_some_and(|round| round.challenge_id == expired.id)
        {
            inner.round = None;
        }
        self.record(inner, signals, &expired.locked_package, AttemptResult::Timeout);
        signals.push(Signal::Deny(expired.locked_package.clone()));
        Some(expired)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lock management and sessions
    // ─────────────────────────────────────────────────────────────────────

    pub fn lock_app(&self, package_name: &str) -> Result<()> {
        self.registry.add(package_name)
    }

    /// Unlocking also ends the package's session and drops a challenge that
    /// is running for it.
    pub fn unlock_app(&self, package_name: &str) -> Result<()> {
        let package = normalize_package(package_name)?;
        self.registry.remove(&package)?;

        let mut signals = Vec::new();
        {
            let mut inner = self.lock_inner();
            inner.sessions.end_session(&package);
            if let Some(current) = self.challenges.current() {
                if current.locked_package == package {
                    self.challenges.reset();
                    inner.round = None;
                    signals.push(Signal::Allow(package));
                }
            }
        }
        self.emit(signals);
        Ok(())
    }

    pub fn locked_apps(&self) -> Result<LockSet> {
        self.registry.list_locked()
    }

    pub fn end_all_sessions(&self) {
        let mut inner = self.lock_inner();
        inner.sessions.end_all();
        inner.round = None;
        self.challenges.reset();
        tracing::info!("All sessions ended");
    }

    pub fn completed_packages(&self) -> Vec<String> {
        let mut inner = self.lock_inner();
        inner.sessions.prune_expired(self.clock.now());
        inner.sessions.completed()
    }

    pub fn stats(&self) -> ChallengeStats {
        self.lock_inner().stats
    }

    pub fn settings(&self) -> &LockerSettings {
        &self.settings
    }

    pub fn challenge_state(&self) -> &ChallengeState {
        &self.challenges
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn open_round(&self, inner: &mut Inner, challenge: Challenge) -> ActiveChallenge {
        let round = Round {
            challenge_id: challenge.id,
            puzzle: self.puzzles.next_puzzle(),
            rounds_remaining: self.settings.challenges_required.max(1),
        };
        let active = round.to_active(challenge);
        inner.round = Some(round);
        active
    }

    fn current_round(inner: &Inner, challenge: &Challenge) -> Option<ActiveChallenge> {
        inner
            .round
            .as_ref()
            .filter(|round| round.challenge_id == challenge.id)
            .map(|round| round.to_active(challenge.clone()))
    }

    fn record(&self, inner: &mut Inner, signals: &mut Vec<Signal>, package_name: &str, result: AttemptResult) {
        inner.stats.record(result);
        if self.on_attempt.is_some() {
            signals.push(Signal::Attempt(package_name.to_string(), result));
        }
    }

    fn emit(&self, signals: Vec<Signal>) {
        for signal in signals {
            match signal {
                Signal::Attempt(package, result) => {
                    if let Some(hook) = self.on_attempt.as_ref() {
                        hook(&package, result);
                    }
                }
                Signal::Present(active) => self.presenter.present(&active),
                Signal::Allow(package) => self.presenter.allow(&package),
                Signal::Deny(package) => self.presenter.deny(&package),
            }
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn decision_label(decision: &Decision) -> &'static str {
    match decision {
        Decision::Allow { .. } => "allow",
        Decision::Challenge { .. } => "challenge",
        Decision::AlreadyChallenging { .. } => "already_challenging",
        Decision::Busy { .. } => "busy",
        Decision::Denied { .. } => "denied",
    }
}
