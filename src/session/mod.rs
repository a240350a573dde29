//! Recording session management
//!
//! This module drives one recording at a time through
//! `Idle -> Starting -> Recording -> Stopping -> Idle`:
//! - Capture-to-encode pipeline with level metering on the capture thread
//! - A single control loop owning all session state (`Recorder`)
//! - Ordered teardown with delete-retry on rollback (`ResourceReclaimer`)
//! - Finalization once capture has cleanly stopped

mod backend;
mod controller;
mod events;
mod pipeline;
mod reclaimer;
mod state;

pub use backend::{HostBackend, RecorderBackend};
pub use controller::{Recorder, RecorderHandle};
pub use events::{FinalizedRecording, LevelReading, SessionEvent};
pub use reclaimer::{ResourceReclaimer, TeardownReport};
pub use state::{ElapsedClock, SessionState};
