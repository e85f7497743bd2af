//! Live device polling module
//!
//! - `state`: per-device live state store, mutated only through patches
//! - `coordinator`: fixed-interval refresh loop and device lifecycle

pub mod coordinator;
pub mod state;

pub use coordinator::{PollCoordinator, RefreshOutcome};
pub use state::DeviceLiveState;
