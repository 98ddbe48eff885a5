//! # locker-core
//!
//! Core library for Stroop Locker: decides whether a foregrounded application
//! may run or must first be unlocked with a Stroop colour-naming challenge.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The daemon drives the
//!   coordinator from plain threads and an `mpsc` channel.
//! - **Injected collaborators**: Storage, clock, UI presenter and puzzle source
//!   are passed in at construction. There are no process-wide singletons.
//! - **Fail safe**: Anything that goes wrong resolves to "deny access to the
//!   locked app".
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use locker_core::{LockCoordinator, ForegroundEvent};
//!
//! let coordinator = LockCoordinator::builder(registry).build();
//! coordinator.lock_app("com.example.mail")?;
//! let decision = coordinator.handle_foreground(&ForegroundEvent::now("com.example.mail")?);
//! ```

pub mod challenge;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod presenter;
pub mod registry;
pub mod session;
pub mod settings;
pub mod storage;
pub mod stroop;
pub mod types;

pub use challenge::{ChallengeState, Completion, StartOutcome, CHALLENGE_TIMEOUT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{LockCoordinator, LockCoordinatorBuilder, DEFAULT_OWN_PACKAGE};
pub use error::{LockerError, Result};
pub use events::{run_event_loop, ForegroundEvent};
pub use presenter::{ChallengePresenter, Directive, DirectiveQueue, NoopPresenter};
pub use registry::{LockRegistry, LockedAppStore, MemoryStore};
pub use session::{is_home_screen, SessionTracker};
pub use settings::{load_settings, save_settings, LockerSettings, Theme};
pub use storage::StorageConfig;
pub use stroop::{
    color_by_name, AnswerOption, PuzzleSource, StroopColor, StroopGenerator, StroopPuzzle, PALETTE,
};
pub use types::*;
