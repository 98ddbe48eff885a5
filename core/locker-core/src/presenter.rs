//! The UI side of the coordinator.
//!
//! The coordinator never draws anything. It tells a [`ChallengePresenter`] to
//! show a challenge, to let the user back into an app, or to send them away.
//! Hosts without a live UI connection use [`DirectiveQueue`] and let clients
//! poll the queued directives.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ActiveChallenge;

pub trait ChallengePresenter: Send + Sync {
    fn present(&self, challenge: &ActiveChallenge);
    fn allow(&self, package_name: &str);
    fn deny(&self, package_name: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresenter;

impl ChallengePresenter for NoopPresenter {
    fn present(&self, _challenge: &ActiveChallenge) {}
    fn allow(&self, _package_name: &str) {}
    fn deny(&self, _package_name: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Directive {
    Present {
        challenge: ActiveChallenge,
        issued_at: DateTime<Utc>,
    },
    Allow {
        package: String,
        issued_at: DateTime<Utc>,
    },
    Deny {
        package: String,
        issued_at: DateTime<Utc>,
    },
}

impl Directive {
    pub fn package(&self) -> &str {
        match self {
            Directive::Present { challenge, .. } => &challenge.challenge.locked_package,
            Directive::Allow { package, .. } | Directive::Deny { package, .. } => package,
        }
    }
}

const DEFAULT_CAPACITY: usize = 64;

/// Bounded FIFO of directives. When full, the oldest entry is dropped.
pub struct DirectiveQueue {
    queue: Mutex<VecDeque<Directive>>,
    capacity: usize,
}

impl DirectiveQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        DirectiveQueue {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn drain(&self) -> Vec<Directive> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, directive: Directive) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                tracing::warn!(package = %dropped.package(), "Directive queue full, dropping oldest");
            }
        }
        queue.push_back(directive);
    }
}

impl Default for DirectiveQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengePresenter for DirectiveQueue {
    fn present(&self, challenge: &ActiveChallenge) {
        self.push(Directive::Present {
            challenge: challenge.clone(),
            issued_at: Utc::now(),
        });
    }

    fn allow(&self, package_name: &str) {
        self.push(Directive::Allow {
            package: package_name.to_string(),
            issued_at: Utc::now(),
        });
    }

    fn deny(&self, package_name: &str) {
        self.push(Directive::Deny {
            package: package_name.to_string(),
            issued_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_preserves_order() {
        let queue = DirectiveQueue::new();
        queue.deny("com.a");
        queue.allow("com.b");

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(&drained[0], Directive::Deny { package, .. } if package == "com.a"));
        assert!(matches!(&drained[1], Directive::Allow { package, .. } if package == "com.b"));
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_drops_oldest_when_full() {
        let queue = DirectiveQueue::with_capacity(2);
        queue.deny("com.a");
        queue.deny("com.b");
        queue.deny("com.c");

        let packages: Vec<_> = queue
            .drain()
            .iter()
            .map(|d| d.package().to_string())
            .collect();
        assert_eq!(packages, vec!["com.b", "com.c"]);
    }
}
