//! Capture engines
//!
//! A capture engine owns one audio input handle. Once started it delivers
//! frames on its own thread and finishes with exactly one terminal stop
//! notification, whether the stop was requested or caused by the device.
//!
//! Platform-specific implementations:
//! - `DeviceEngine`: host input devices via cpal
//! - `ReplayEngine`: in-memory PCM (silence or a WAV file) played as a device

mod device;
mod replay;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::audio::{AudioFormat, AudioFrame};
use crate::error::CaptureError;

pub use device::{list_input_devices, DeviceEngine, InputDevice};
pub use replay::{Pace, ReplayEngine, ReplaySource};

/// Receiver of capture events. Both methods run on the capture thread and
/// must return quickly.
pub trait CaptureSubscriber: Send + Sync {
    fn on_frame(&self, frame: AudioFrame<'_>);

    /// The terminal notification. Called at most once per engine.
    fn on_stopped(&self, error: Option<CaptureError>);
}

/// Slot holding the current subscriber of an engine.
///
/// Cleared by `unsubscribe`; events arriving afterwards are dropped. The
/// terminal notification is delivered at most once even if several stop
/// paths race.
#[derive(Clone)]
pub struct Subscription {
    subscriber: Arc<Mutex<Option<Arc<dyn CaptureSubscriber>>>>,
    terminal_sent: Arc<AtomicBool>,
}

impl Subscription {
    pub fn new(subscriber: Arc<dyn CaptureSubscriber>) -> Self {
        Self {
            subscriber: Arc::new(Mutex::new(Some(subscriber))),
            terminal_sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A subscription with nobody listening
    pub fn detached() -> Self {
        Self {
            subscriber: Arc::new(Mutex::new(None)),
            terminal_sent: Arc::new(AtomicBool::new(false)),
        }
    }

    fn current(&self) -> Option<Arc<dyn CaptureSubscriber>> {
        match self.subscriber.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.subscriber.lock() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.current().is_some()
    }

    pub fn deliver_frame(&self, frame: AudioFrame<'_>) {
        if let Some(subscriber) = self.current() {
            subscriber.on_frame(frame);
        }
    }

    pub fn deliver_stopped(&self, error: Option<CaptureError>) {
        if self.terminal_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(subscriber) = self.current() {
            subscriber.on_stopped(error);
        }
    }
}

/// Owner of one audio input handle
#[async_trait]
pub trait CaptureEngine: Send {
    /// Engine name for logging
    fn name(&self) -> &str;

    /// Open `device_index` at `format` and begin delivering frames to
    /// `subscriber`.
    async fn start(
        &mut self,
        device_index: usize,
        format: AudioFormat,
        subscriber: Arc<dyn CaptureSubscriber>,
    ) -> Result<(), CaptureError>;

    /// Drop the subscriber. Later frames and the terminal notification are
    /// discarded.
    fn unsubscribe(&mut self);

    /// Request capture to cease. Idempotent and non-blocking.
    fn stop(&mut self);

    /// Whether the capture thread has delivered its last frame
    fn is_stopped(&self) -> bool;

    /// Release the input handle, waiting for the capture thread to exit
    async fn dispose(&mut self);
}

/// Where a session's audio comes from
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Host input devices (cpal)
    Device,
    /// In-memory PCM played back as a device
    Replay { source: ReplaySource, pace: Pace },
}

/// Capture engine factory
pub struct CaptureEngineFactory;

impl CaptureEngineFactory {
    /// Create a fresh, unstarted engine for `source`
    pub fn create(source: &CaptureSource) -> Box<dyn CaptureEngine> {
        match source {
            CaptureSource::Device => Box::new(DeviceEngine::new()),
            CaptureSource::Replay { source, pace } => {
                Box::new(ReplayEngine::new(source.clone()).with_pace(*pace))
            }
        }
    }
}
