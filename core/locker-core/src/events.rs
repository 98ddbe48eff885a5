//! Foreground-app notifications and the loop that feeds them to the coordinator.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinator::LockCoordinator;
use crate::error::Result;
use crate::types::normalize_package;

/// "Package P came to the foreground at time T."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundEvent {
    pub package: String,
    pub observed_at: DateTime<Utc>,
}

impl ForegroundEvent {
    pub fn new(package_name: &str, observed_at: DateTime<Utc>) -> Result<Self> {
        Ok(ForegroundEvent {
            package: normalize_package(package_name)?,
            observed_at,
        })
    }

    pub fn now(package_name: &str) -> Result<Self> {
        Self::new(package_name, Utc::now())
    }
}

/// Drains `events` into the coordinator until every sender is dropped.
///
/// Runs the timeout sweep whenever no event arrives within `sweep_interval`.
pub fn run_event_loop(
    coordinator: Arc<LockCoordinator>,
    events: Receiver<ForegroundEvent>,
    sweep_interval: Duration,
) {
    tracing::debug!(interval_ms = sweep_interval.as_millis() as u64, "Event loop started");
    loop {
        match events.recv_timeout(sweep_interval) {
            Ok(event) => {
                coordinator.handle_foreground(&event);
            }
            Err(RecvTimeoutError::Timeout) => {
                coordinator.sweep_expired();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("Event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{LockRegistry, MemoryStore};
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn event_rejects_blank_package() {
        assert!(ForegroundEvent::now("").is_err());
        assert_eq!(ForegroundEvent::now(" com.a ").unwrap().package, "com.a");
    }

    #[test]
    fn loop_processes_events_until_disconnect() {
        let registry = Arc::new(LockRegistry::new(MemoryStore::with_packages(["com.a"])));
        let coordinator = Arc::new(LockCoordinator::builder(registry).build());
        let (tx, rx) = mpsc::channel();

        let worker = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || run_event_loop(coordinator, rx, Duration::from_millis(10)))
        };

        tx.send(ForegroundEvent::now("com.a").unwrap()).unwrap();
        drop(tx);
        worker.join().unwrap();

        assert_eq!(
            coordinator.current_challenge().unwrap().challenge.locked_package,
            "com.a"
        );
    }
}
