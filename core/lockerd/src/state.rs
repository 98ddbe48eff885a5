//! Daemon-wide state shared by connection handlers.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use locker_core::{
    ChallengeStats, Directive, DirectiveQueue, ForegroundEvent, LockCoordinator, LockRegistry,
    LockerSettings,
};
use tracing::{info, warn};

use crate::db::Db;

pub struct SharedState {
    coordinator: Arc<LockCoordinator>,
    directives: Arc<DirectiveQueue>,
    events: Sender<ForegroundEvent>,
}

impl SharedState {
    /// Wires the coordinator to SQLite and a directive queue. The returned
    /// receiver must be drained by the event loop.
    pub fn new(db: Db, settings: LockerSettings) -> (Self, Receiver<ForegroundEvent>) {
        let stats = match db.load_stats() {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "Failed to load challenge stats; starting from zero");
                ChallengeStats::default()
            }
        };
        info!(
            successful = stats.successful,
            unsuccessful = stats.unsuccessful,
            timed_out = stats.timed_out,
            "Challenge stats loaded"
        );

        let directives = Arc::new(DirectiveQueue::new());
        let stats_db = db.clone();
        let coordinator = LockCoordinator::builder(Arc::new(LockRegistry::new(db)))
            .settings(settings)
            .presenter(directives.clone())
            .initial_stats(stats)
            .on_attempt(move |package, result| {
                if let Err(err) = stats_db.record_attempt(result) {
                    warn!(package = %package, error = %err, "Failed to persist attempt");
                }
            })
            .build();

        let (events, receiver) = mpsc::channel();
        let state = Self {
            coordinator: Arc::new(coordinator),
            directives,
            events,
        };
        (state, receiver)
    }

    pub fn coordinator(&self) -> &Arc<LockCoordinator> {
        &self.coordinator
    }

    pub fn submit_foreground(&self, package: &str, observed_at: DateTime<Utc>) -> Result<(), String> {
        let event = ForegroundEvent::new(package, observed_at).map_err(|err| err.to_string())?;
        self.events
            .send(event)
            .map_err(|_| "Event loop is not running".to_string())
    }

    pub fn drain_directives(&self) -> Vec<Directive> {
        self.directives.drain()
    }
}
