//! Completed-set: packages that passed their challenge in the current session.
//!
//! A session for package P starts when its challenge is passed and ends when
//! the user switches to a different app, when the optional session duration
//! elapses, or when everything is reset. Launchers count as "a different app",
//! so going home re-locks whatever was open.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct SessionTracker {
    completed: HashMap<String, Instant>,
    foreground: Option<String>,
    /// Zero means "until the user leaves the app".
    session_duration: Duration,
}

impl SessionTracker {
    pub fn new(session_duration: Duration) -> Self {
        SessionTracker {
            session_duration,
            ..Default::default()
        }
    }

    pub fn mark_completed(&mut self, package_name: &str, now: Instant) {
        tracing::debug!(package = %package_name, "Session started");
        self.completed.insert(package_name.to_string(), now);
    }

    pub fn is_completed(&self, package_name: &str, now: Instant) -> bool {
        match self.completed.get(package_name) {
            Some(completed_at) => !self.is_expired(*completed_at, now),
            None => false,
        }
    }

    /// Drops sessions whose duration has run out. Returns the packages removed.
    pub fn prune_expired(&mut self, now: Instant) -> Vec<String> {
        if self.session_duration.is_zero() {
            return Vec::new();
        }
        let expired: Vec<String> = self
            .completed
            .iter()
            .filter(|(_, completed_at)| self.is_expired(**completed_at, now))
            .map(|(package, _)| package.clone())
            .collect();
        for package in &expired {
            tracing::debug!(package = %package, "Session expired");
            self.completed.remove(package);
        }
        expired
    }

    pub fn end_session(&mut self, package_name: &str) -> bool {
        let ended = self.completed.remove(package_name).is_some();
        if ended {
            tracing::debug!(package = %package_name, "Session ended");
        }
        ended
    }

    pub fn end_all(&mut self) {
        tracing::debug!(count = self.completed.len(), "Ending all sessions");
        self.completed.clear();
        self.foreground = None;
    }

    /// Records a foreground switch. Returns the package whose session ended
    /// because the user left it.
    pub fn handle_switch(&mut self, to_package: &str) -> Option<String> {
        let previous = self.foreground.replace(to_package.to_string());
        match previous {
            Some(from) if from != to_package => {
                tracing::debug!(from = %from, to = %to_package, "App switch");
                if self.end_session(&from) {
                    Some(from)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn foreground(&self) -> Option<&str> {
        self.foreground.as_deref()
    }

    pub fn completed(&self) -> Vec<String> {
        let mut packages: Vec<String> = self.completed.keys().cloned().collect();
        packages.sort();
        packages
    }

    fn is_expired(&self, completed_at: Instant, now: Instant) -> bool {
        !self.session_duration.is_zero()
            && now.saturating_duration_since(completed_at) > self.session_duration
    }
}

/// Launcher heuristics used to decide that the user went back home.
pub fn is_home_screen(package_name: &str) -> bool {
    package_name.contains("launcher")
        || package_name.contains("home")
        || package_name == "com.google.android.apps.nexuslauncher"
}
