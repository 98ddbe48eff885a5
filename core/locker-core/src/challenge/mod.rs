//! Single-slot challenge state machine.
//!
//! At most one challenge exists at a time. The slot moves between two states:
//!
//! ```text
//!            start(P)                 complete(success) / timeout
//!   Idle ─────────────▶ InProgress ──────────────────────────────▶ Idle
//!                        │  ▲
//!                        └──┘ start(P) again returns the same challenge
//! ```
//!
//! A challenge older than the timeout is reported as `Idle` by every query,
//! even before the sweep physically clears it.
//!
//! # Module Structure
//!
//! - [`transition`]: Pure phase/step rules, no locking or clocks
//! - [`state`]: [`ChallengeState`], the synchronized slot that applies them

mod state;
pub(crate) mod transition;

pub use state::{ChallengeState, Completion, StartOutcome, CHALLENGE_TIMEOUT};
pub use transition::{next_step, phase, Phase, SlotEvent, Step};
