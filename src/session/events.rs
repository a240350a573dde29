use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use super::state::SessionState;
use crate::audio::LevelSample;
use crate::error::{CaptureError, SessionError, SessionWarning};
use crate::library::TrackMetadata;

/// Requests sent from a `RecorderHandle` to the control loop
#[derive(Debug, Clone)]
pub(crate) enum Command {
    Start { device: Option<usize> },
    Stop,
    SwitchDevice(usize),
    Close,
    SetMetadata(TrackMetadata),
}

/// Terminal stop notification marshalled from the capture thread
#[derive(Debug)]
pub(crate) struct CaptureNotice {
    pub session_id: Uuid,
    pub error: Option<CaptureError>,
}

/// A recording that was saved
#[derive(Debug, Clone, Serialize)]
pub struct FinalizedRecording {
    pub path: PathBuf,
    pub tagged: bool,
    pub duration: Duration,
    pub device_index: usize,
    pub metadata: TrackMetadata,
}

/// What the control loop reports to the outside
#[derive(Debug)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Started { path: PathBuf, device_index: usize },
    Failed(SessionError),
    Warning(SessionWarning),
    Finalized(FinalizedRecording),
    /// The application should exit now; the control loop has ended
    ShutdownRequested,
}

/// Latest level and elapsed time, published for the display
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LevelReading {
    pub level: LevelSample,
    pub elapsed: Duration,
}
