use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::audio::{AudioFormat, Encoder};
use crate::capture::CaptureEngine;

/// Lifecycle of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Stopping,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Encoder shared between the capture callback and the control loop
pub(crate) type SharedEncoder = Arc<Mutex<Box<dyn Encoder>>>;

/// Lock an encoder, recovering it if a capture callback panicked while
/// holding it
pub(crate) fn lock_encoder(encoder: &SharedEncoder) -> MutexGuard<'_, Box<dyn Encoder>> {
    match encoder.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Counts captured frames; advanced on the capture thread
#[derive(Debug)]
pub struct ElapsedClock {
    format: AudioFormat,
    frames: AtomicU64,
}

impl ElapsedClock {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            frames: AtomicU64::new(0),
        }
    }

    /// Add `frames` and return the new elapsed time
    pub fn advance(&self, frames: u64) -> Duration {
        let total = self.frames.fetch_add(frames, Ordering::Relaxed) + frames;
        self.format.frames_to_duration(total)
    }

    pub fn elapsed(&self) -> Duration {
        self.format.frames_to_duration(self.frames.load(Ordering::Relaxed))
    }
}

/// The one active recording. Owns the engine and encoder exclusively.
pub(crate) struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub device_index: usize,
    pub format: AudioFormat,
    pub output_path: PathBuf,
    pub clock: Arc<ElapsedClock>,
    pub engine: Box<dyn CaptureEngine>,
    pub encoder: Option<SharedEncoder>,
}
