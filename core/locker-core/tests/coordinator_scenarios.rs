//! End-to-end lock/challenge scenarios driven through `LockCoordinator`.

use std::sync::Arc;
use std::time::Duration;

use locker_core::{
    AllowReason, AnswerOption, AnswerOutcome, Decision, Directive, DirectiveQueue,
    ForegroundEvent, LockCoordinator, LockRegistry, LockedAppStore, LockerError, LockerSettings,
    ManualClock, MemoryStore, PuzzleSource, StroopPuzzle,
};

const CORRECT: &str = "Blue";
const WRONG: &str = "Red";

struct FixedPuzzle;

impl PuzzleSource for FixedPuzzle {
    fn next_puzzle(&self) -> StroopPuzzle {
        StroopPuzzle {
            word: "Red".to_string(),
            ink: "Blue".to_string(),
            ink_hex: "#3366FF".to_string(),
            options: vec![
                AnswerOption {
                    label: "Red".to_string(),
                    text_color: "Green".to_string(),
                },
                AnswerOption {
                    label: "Blue".to_string(),
                    text_color: "Red".to_string(),
                },
                AnswerOption {
                    label: "Green".to_string(),
                    text_color: "Blue".to_string(),
                },
            ],
            expected_answer: "Blue".to_string(),
        }
    }
}

/// Every read fails, the way a corrupt database would.
struct BrokenStore;

impl LockedAppStore for BrokenStore {
    fn insert_if_absent(&self, _package_name: &str) -> locker_core::Result<bool> {
        Err(LockerError::storage("insert", "disk I/O error"))
    }

    fn delete(&self, _package_name: &str) -> locker_core::Result<bool> {
        Err(LockerError::storage("delete", "disk I/O error"))
    }

    fn list_all(&self) -> locker_core::Result<Vec<String>> {
        Err(LockerError::storage("list", "disk I/O error"))
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    queue: Arc<DirectiveQueue>,
    coordinator: LockCoordinator,
}

impl Harness {
    fn new(settings: LockerSettings) -> Self {
        Self::with_store(MemoryStore::new(), settings)
    }

    fn with_store(store: impl LockedAppStore + 'static, settings: LockerSettings) -> Self {
        let clock = Arc::new(ManualClock::new());
        let queue = Arc::new(DirectiveQueue::new());
        let coordinator = LockCoordinator::builder(Arc::new(LockRegistry::new(store)))
            .settings(settings)
            .clock(clock.clone())
            .presenter(queue.clone())
            .puzzles(Arc::new(FixedPuzzle))
            .build();
        Harness {
            clock,
            queue,
            coordinator,
        }
    }

    fn foreground(&self, package: &str) -> Decision {
        self.coordinator
            .handle_foreground(&ForegroundEvent::now(package).unwrap())
    }

    fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }
}

fn expect_challenge(decision: Decision) -> locker_core::ActiveChallenge {
    match decision {
        Decision::Challenge { challenge } => challenge,
        other => panic!("expected a new challenge, got {:?}", other),
    }
}

#[test]
fn test_lock_and_unlock_update_registry() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.a").unwrap();
    h.coordinator.lock_app("com.a").unwrap();
    assert!(h.coordinator.locked_apps().unwrap().contains("com.a"));

    h.coordinator.unlock_app("com.a").unwrap();
    h.coordinator.unlock_app("com.a").unwrap();
    assert!(h.coordinator.locked_apps().unwrap().is_empty());
    assert_eq!(h.foreground("com.a"), Decision::allow(AllowReason::NotLocked));
}

#[test]
fn test_unlocked_app_is_allowed_without_challenge() {
    let h = Harness::new(LockerSettings::default());
    assert!(h.foreground("com.free").is_allowed());
    assert!(!h.coordinator.is_challenge_active());
    assert!(h.queue.is_empty());
}

#[test]
fn test_repeated_foreground_reuses_challenge() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.a").unwrap();

    let first = expect_challenge(h.foreground("com.a"));
    h.advance(5);
    match h.foreground("com.a") {
        Decision::AlreadyChallenging { challenge } => {
            assert_eq!(challenge.id, first.challenge.id);
            assert_eq!(challenge.start_time, first.challenge.start_time);
        }
        other => panic!("expected AlreadyChallenging, got {:?}", other),
    }

    let again = h.coordinator.start_or_get_challenge("com.a").unwrap();
    assert_eq!(again.challenge.id, first.challenge.id);
    assert_eq!(again.puzzle, first.puzzle);
}

#[test]
fn test_correct_answer_grants_access_for_session() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.a").unwrap();
    expect_challenge(h.foreground("com.a"));

    assert_eq!(
        h.coordinator.submit_answer(CORRECT),
        AnswerOutcome::Granted {
            package: "com.a".to_string()
        }
    );
    assert!(!h.coordinator.is_challenge_active());
    assert_eq!(h.foreground("com.a"), Decision::allow(AllowReason::Completed));
    assert_eq!(h.coordinator.completed_packages(), vec!["com.a".to_string()]);
    assert_eq!(h.coordinator.stats().successful, 1);
}

#[test]
fn test_wrong_answer_denies_and_rechallenges() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.a").unwrap();
    let first = expect_challenge(h.foreground("com.a"));
    h.queue.drain();

    assert_eq!(
        h.coordinator.submit_answer(WRONG),
        AnswerOutcome::Denied {
            package: "com.a".to_string()
        }
    );
    let directives = h.queue.drain();
    assert!(matches!(&directives[..], [Directive::Deny { package, .. }] if package == "com.a"));

    h.advance(1);
    let second = expect_challenge(h.foreground("com.a"));
    assert_ne!(second.challenge.id, first.challenge.id);
    assert_ne!(second.challenge.start_time, first.challenge.start_time);
    assert_eq!(h.coordinator.stats().unsuccessful, 1);
}

#[test]
fn test_challenge_times_out() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.b").unwrap();
    expect_challenge(h.foreground("com.b"));
    h.queue.drain();

    h.advance(30);
    assert!(h.coordinator.is_challenge_active());
    assert!(h.coordinator.sweep_expired().is_none());

    h.advance(1);
    assert!(!h.coordinator.is_challenge_active());
    let expired = h.coordinator.sweep_expired().unwrap();
    assert_eq!(expired.locked_package, "com.b");
    assert!(matches!(&h.queue.drain()[..], [Directive::Deny { package, .. }] if package == "com.b"));
    assert_eq!(h.coordinator.stats().timed_out, 1);
}

#[test]
fn test_late_answer_after_timeout_is_not_granted() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.b").unwrap();
    expect_challenge(h.foreground("com.b"));

    h.advance(31);
    assert_eq!(h.coordinator.submit_answer(CORRECT), AnswerOutcome::NoChallenge);
    assert!(h.coordinator.completed_packages().is_empty());
    assert_eq!(h.coordinator.stats().timed_out, 1);
    assert_eq!(h.coordinator.stats().successful, 0);
}

#[test]
fn test_answer_without_challenge() {
    let h = Harness::new(LockerSettings::default());
    assert_eq!(h.coordinator.submit_answer(CORRECT), AnswerOutcome::NoChallenge);
    assert_eq!(h.coordinator.stats().total(), 0);
}

#[test]
fn test_second_locked_app_is_turned_away_while_busy() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.a").unwrap();
    h.coordinator.lock_app("com.b").unwrap();

    let first = expect_challenge(h.foreground("com.a"));
    h.queue.drain();

    assert_eq!(
        h.foreground("com.b"),
        Decision::Busy {
            active: "com.a".to_string()
        }
    );
    assert!(matches!(&h.queue.drain()[..], [Directive::Deny { package, .. }] if package == "com.b"));
    let current = h.coordinator.current_challenge().unwrap();
    assert_eq!(current.challenge.id, first.challenge.id);

    assert!(matches!(
        h.coordinator.start_or_get_challenge("com.b"),
        Err(LockerError::ChallengeBusy { ref active }) if active == "com.a"
    ));
}

#[test]
fn test_storage_failure_fails_safe() {
    let h = Harness::with_store(BrokenStore, LockerSettings::default());
    assert!(h.coordinator.lock_app("com.a").is_err());

    let decision = h.foreground("com.a");
    assert!(matches!(decision, Decision::Challenge { .. }));
}

#[test]
fn test_master_disable_allows_everything() {
    let h = Harness::new(LockerSettings {
        master_disable: true,
        ..Default::default()
    });
    h.coordinator.lock_app("com.a").unwrap();

    assert_eq!(
        h.foreground("com.a"),
        Decision::allow(AllowReason::MasterDisabled)
    );
    assert!(!h.coordinator.is_challenge_active());
}

#[test]
fn test_multiple_rounds_required() {
    let h = Harness::new(LockerSettings {
        challenges_required: 2,
        ..Default::default()
    });
    h.coordinator.lock_app("com.a").unwrap();
    let first = expect_challenge(h.foreground("com.a"));
    assert_eq!(first.rounds_remaining, 2);

    match h.coordinator.submit_answer(CORRECT) {
        AnswerOutcome::NextRound { challenge } => {
            assert_eq!(challenge.challenge.id, first.challenge.id);
            assert_eq!(challenge.rounds_remaining, 1);
        }
        other => panic!("expected another round, got {:?}", other),
    }
    assert!(h.coordinator.is_challenge_active());

    assert!(matches!(
        h.coordinator.submit_answer(CORRECT),
        AnswerOutcome::Granted { .. }
    ));
    assert_eq!(h.coordinator.stats().successful, 1);
}

#[test]
fn test_leaving_app_relocks_it() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.a").unwrap();
    expect_challenge(h.foreground("com.a"));
    h.coordinator.submit_answer(CORRECT);

    assert_eq!(h.foreground("com.other"), Decision::allow(AllowReason::NotLocked));
    expect_challenge(h.foreground("com.a"));
}

#[test]
fn test_going_home_relocks_app() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.a").unwrap();
    expect_challenge(h.foreground("com.a"));
    h.coordinator.submit_answer(CORRECT);

    assert_eq!(
        h.foreground("com.android.launcher3"),
        Decision::allow(AllowReason::HomeScreen)
    );
    expect_challenge(h.foreground("com.a"));
}

#[test]
fn test_locked_app_with_launcher_like_name_is_challenged() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.homedepot.app").unwrap();
    h.coordinator.lock_app("org.launcherkit.notes").unwrap();

    expect_challenge(h.foreground("com.homedepot.app"));
    h.coordinator.submit_answer(CORRECT);
    expect_challenge(h.foreground("org.launcherkit.notes"));
}

#[test]
fn test_challenge_for_one_app_does_not_block_unlocked_app() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.a").unwrap();
    let running = expect_challenge(h.foreground("com.a"));
    h.queue.drain();

    assert_eq!(h.foreground("com.b"), Decision::allow(AllowReason::NotLocked));
    assert!(!h
        .queue
        .drain()
        .iter()
        .any(|d| matches!(d, Directive::Deny { package, .. } if package == "com.b")));
    assert!(h.coordinator.is_challenge_active());
    assert_eq!(
        h.coordinator.current_challenge().map(|c| c.challenge.id),
        Some(running.challenge.id)
    );
}

#[test]
fn test_session_duration_expires() {
    let h = Harness::new(LockerSettings {
        session_duration_secs: 60,
        ..Default::default()
    });
    h.coordinator.lock_app("com.a").unwrap();
    expect_challenge(h.foreground("com.a"));
    h.coordinator.submit_answer(CORRECT);

    h.advance(60);
    assert_eq!(h.foreground("com.a"), Decision::allow(AllowReason::Completed));
    h.advance(1);
    expect_challenge(h.foreground("com.a"));
}

#[test]
fn test_end_all_sessions_resets_everything() {
    let h = Harness::new(LockerSettings::default());
    h.coordinator.lock_app("com.a").unwrap();
    h.coordinator.lock_app("com.b").unwrap();
    expect_challenge(h.foreground("com.a"));
    h.coordinator.submit_answer(CORRECT);
    expect_challenge(h.foreground("com.b"));

    h.coordinator.end_all_sessions();
    assert!(!h.coordinator.is_challenge_active());
    assert!(h.coordinator.completed_packages().is_empty());
    expect_challenge(h.foreground("com.a"));
}
