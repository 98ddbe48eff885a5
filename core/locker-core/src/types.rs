//! Shared data types for the lock/challenge core.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LockerError, Result};
use crate::stroop::StroopPuzzle;

/// Snapshot of every locked package name. Order is irrelevant; a `BTreeSet`
/// keeps listings stable for display.
pub type LockSet = BTreeSet<String>;

/// An application package the user has chosen to protect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockedApp {
    pub package_name: String,
}

impl LockedApp {
    pub fn new(package_name: &str) -> Result<Self> {
        Ok(LockedApp {
            package_name: normalize_package(package_name)?,
        })
    }
}

/// Trims a package name and rejects empty ones.
pub fn normalize_package(package_name: &str) -> Result<String> {
    let trimmed = package_name.trim();
    if trimmed.is_empty() {
        return Err(LockerError::InvalidPackage(package_name.to_string()));
    }
    Ok(trimmed.to_string())
}

/// A single in-flight verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Challenge {
    pub id: u64,
    pub locked_package: String,
    #[serde(skip)]
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl Challenge {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
    }

    /// Strictly greater than the timeout: a challenge exactly at the limit is
    /// still live.
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.age(now) > timeout
    }
}

/// The challenge the UI should be showing, with the puzzle it must render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveChallenge {
    pub challenge: Challenge,
    pub puzzle: StroopPuzzle,
    pub rounds_remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    OwnPackage,
    HomeScreen,
    MasterDisabled,
    Completed,
    NotLocked,
}

/// What the coordinator decided for one foreground event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow { reason: AllowReason },
    Challenge { challenge: ActiveChallenge },
    AlreadyChallenging { challenge: Challenge },
    /// Another package's challenge holds the slot; this package is sent away.
    Busy { active: String },
    Denied { reason: String },
}

impl Decision {
    pub fn allow(reason: AllowReason) -> Self {
        Decision::Allow { reason }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Result of a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Final correct answer: access granted.
    Granted { package: String },
    /// Correct answer, but more rounds are required.
    NextRound { challenge: ActiveChallenge },
    /// Wrong answer: the challenge was cleared and access denied.
    Denied { package: String },
    /// Another answer for this challenge is still being resolved.
    Ignored,
    NoChallenge,
}

impl AnswerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            AnswerOutcome::Granted { .. } | AnswerOutcome::NextRound { .. }
        )
    }
}

/// Attempt counters, persisted by the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeStats {
    pub successful: u64,
    pub unsuccessful: u64,
    pub timed_out: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Success,
    Failure,
    Timeout,
}

impl ChallengeStats {
    pub fn record(&mut self, result: AttemptResult) {
        match result {
            AttemptResult::Success => self.successful += 1,
            AttemptResult::Failure => self.unsuccessful += 1,
            AttemptResult::Timeout => self.timed_out += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.successful + self.unsuccessful + self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_app_trims_name() {
        let app = LockedApp::new("  com.example.mail ").unwrap();
        assert_eq!(app.package_name, "com.example.mail");
    }

    #[test]
    fn locked_app_rejects_blank() {
        assert!(matches!(
            LockedApp::new("   "),
            Err(LockerError::InvalidPackage(_))
        ));
    }

    #[test]
    fn challenge_expiry_is_strict() {
        let start = Instant::now();
        let challenge = Challenge {
            id: 1,
            locked_package: "com.a".to_string(),
            start_time: start,
            started_at: Utc::now(),
        };
        let timeout = Duration::from_secs(30);
        assert!(!challenge.is_expired(start + timeout, timeout));
        assert!(challenge.is_expired(start + timeout + Duration::from_millis(1), timeout));
    }

    #[test]
    fn stats_record_counts() {
        let mut stats = ChallengeStats::default();
        stats.record(AttemptResult::Success);
        stats.record(AttemptResult::Failure);
        stats.record(AttemptResult::Failure);
        stats.record(AttemptResult::Timeout);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.unsuccessful, 2);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn decision_serializes_with_tag() {
        let decision = Decision::allow(AllowReason::NotLocked);
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["decision"], "allow");
        assert_eq!(value["reason"], "not_locked");
    }
}
