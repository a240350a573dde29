// Capture callback: meter, clock, encode
//
// Runs on the capture thread. Nothing here may block on the control loop or
// propagate an error; failures are logged once and the terminal notification
// carries the authoritative outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{CaptureNotice, LevelReading};
use super::state::{lock_encoder, ElapsedClock, SharedEncoder};
use crate::audio::{AudioFormat, AudioFrame, LevelMeter};
use crate::capture::CaptureSubscriber;
use crate::error::CaptureError;

pub(crate) struct PipelineSink {
    session_id: Uuid,
    format: AudioFormat,
    encoder: SharedEncoder,
    clock: Arc<ElapsedClock>,
    levels: Arc<watch::Sender<LevelReading>>,
    notices: mpsc::UnboundedSender<CaptureNotice>,
    write_failed: AtomicBool,
}

impl PipelineSink {
    pub fn new(
        session_id: Uuid,
        format: AudioFormat,
        encoder: SharedEncoder,
        clock: Arc<ElapsedClock>,
        levels: Arc<watch::Sender<LevelReading>>,
        notices: mpsc::UnboundedSender<CaptureNotice>,
    ) -> Self {
        Self {
            session_id,
            format,
            encoder,
            clock,
            levels,
            notices,
            write_failed: AtomicBool::new(false),
        }
    }
}

impl CaptureSubscriber for PipelineSink {
    fn on_frame(&self, frame: AudioFrame<'_>) {
        if frame.is_empty() {
            return;
        }

        let level = LevelMeter::measure(frame.bytes(), &self.format);
        let frames = (frame.len() / self.format.bytes_per_frame()) as u64;
        let elapsed = self.clock.advance(frames);
        self.levels.send_replace(LevelReading { level, elapsed });

        let result = lock_encoder(&self.encoder).write(frame);
        if let Err(e) = result {
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                warn!("Session {}: encoder write failed: {}", self.session_id, e);
            }
        }
    }

    fn on_stopped(&self, error: Option<CaptureError>) {
        debug!("Session {}: capture stopped", self.session_id);
        let notice = CaptureNotice {
            session_id: self.session_id,
            error,
        };
        if self.notices.send(notice).is_err() {
            debug!("Control loop gone, dropping stop notice");
        }
    }
}
