// Replay capture engine
//
// Plays an in-memory PCM buffer through the same thread/terminal machinery as
// a real device. Used for `tapedeck record --replay` and in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::worker::{CaptureWorker, WorkerExit};
use super::{CaptureEngine, CaptureSubscriber, Subscription};
use crate::audio::{AudioFile, AudioFormat, AudioFrame, BitDepth};
use crate::error::CaptureError;

/// Frames are delivered in 100ms chunks
const CHUNK_MILLIS: u64 = 100;

/// PCM content to replay
#[derive(Debug, Clone)]
pub enum ReplaySource {
    /// Digital silence in whatever format the session asks for
    Silence { duration: Duration },
    /// Interleaved 16-bit samples with a fixed rate and layout
    Samples {
        samples: Arc<[i16]>,
        sample_rate: u32,
        channels: u16,
    },
}

impl ReplaySource {
    pub fn silence(duration: Duration) -> Self {
        ReplaySource::Silence { duration }
    }

    pub fn from_file(file: &AudioFile) -> Self {
        ReplaySource::Samples {
            samples: file.samples.clone().into(),
            sample_rate: file.sample_rate,
            channels: file.channels,
        }
    }

    /// Format the source was recorded in, if it has one
    pub fn native_format(&self) -> Option<(u32, u16)> {
        match self {
            ReplaySource::Silence { .. } => None,
            ReplaySource::Samples {
                sample_rate,
                channels,
                ..
            } => Some((*sample_rate, *channels)),
        }
    }

    /// Render the whole source as little-endian PCM in `format`
    fn render(&self, format: &AudioFormat) -> Vec<u8> {
        match self {
            ReplaySource::Silence { duration } => {
                let frames = (duration.as_secs_f64() * f64::from(format.sample_rate_hz)).round() as usize;
                vec![0u8; frames * format.bytes_per_frame()]
            }
            ReplaySource::Samples { samples, .. } => match format.bit_depth {
                BitDepth::Sixteen => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
                BitDepth::ThirtyTwo => samples
                    .iter()
                    .flat_map(|&s| (i32::from(s) << 16).to_le_bytes())
                    .collect(),
            },
        }
    }
}

/// Delivery speed of a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// One chunk per chunk duration, like a real device
    RealTime,
    /// A fixed delay between chunks
    Fixed(Duration),
    /// As fast as the subscriber consumes frames
    Unthrottled,
}

impl Pace {
    fn delay(self) -> Duration {
        match self {
            Pace::RealTime => Duration::from_millis(CHUNK_MILLIS),
            Pace::Fixed(delay) => delay,
            Pace::Unthrottled => Duration::ZERO,
        }
    }
}

/// Capture engine replaying a `ReplaySource`
pub struct ReplayEngine {
    source: ReplaySource,
    pace: Pace,
    device_count: usize,
    looping: bool,
    fail_after_chunks: Option<usize>,
    worker: CaptureWorker,
}

impl ReplayEngine {
    pub fn new(source: ReplaySource) -> Self {
        Self {
            source,
            pace: Pace::RealTime,
            device_count: 1,
            looping: false,
            fail_after_chunks: None,
            worker: CaptureWorker::new(),
        }
    }

    pub fn with_pace(mut self, pace: Pace) -> Self {
        self.pace = pace;
        self
    }

    /// Number of device indices this engine accepts
    pub fn with_device_count(mut self, device_count: usize) -> Self {
        self.device_count = device_count;
        self
    }

    /// Restart from the beginning instead of ending when the source runs out
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Simulate the device disappearing after `chunks` chunks
    pub fn fail_after_chunks(mut self, chunks: usize) -> Self {
        self.fail_after_chunks = Some(chunks);
        self
    }

    fn check_format(&self, device_index: usize, format: &AudioFormat) -> Result<(), CaptureError> {
        if self.device_count == 0 {
            return Err(CaptureError::DeviceUnavailable);
        }
        if device_index >= self.device_count {
            return Err(CaptureError::DeviceOpen {
                index: device_index,
                reason: format!("only {} replay devices present", self.device_count),
            });
        }
        if let Some((rate, channels)) = self.source.native_format() {
            if rate != format.sample_rate_hz || channels != format.channels {
                return Err(CaptureError::DeviceOpen {
                    index: device_index,
                    reason: format!(
                        "format {} rejected, source is {}Hz with {} channels",
                        format, rate, channels
                    ),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureEngine for ReplayEngine {
    fn name(&self) -> &str {
        "replay"
    }

    async fn start(
        &mut self,
        device_index: usize,
        format: AudioFormat,
        subscriber: Arc<dyn CaptureSubscriber>,
    ) -> Result<(), CaptureError> {
        if self.worker.is_started() {
            return Err(CaptureError::DeviceOpen {
                index: device_index,
                reason: "engine already started".into(),
            });
        }
        self.check_format(device_index, &format)?;

        let pcm = self.source.render(&format);
        let chunk_frames = (u64::from(format.sample_rate_hz) * CHUNK_MILLIS / 1000).max(1) as usize;
        let chunk_bytes = chunk_frames * format.bytes_per_frame();
        let delay = self.pace.delay();
        let looping = self.looping && !pcm.is_empty();
        let fail_after = self.fail_after_chunks;

        info!(
            "Replaying {} bytes on device {} at {}",
            pcm.len(),
            device_index,
            format
        );

        self.worker
            .spawn("tapedeck-replay", Subscription::new(subscriber), move |context| {
                let frames = context.subscription();
                let mut delivered = 0usize;
                loop {
                    for chunk in pcm.chunks(chunk_bytes) {
                        if fail_after == Some(delivered) {
                            return WorkerExit::Finished(Some(CaptureError::Runtime(
                                "replay device disconnected".into(),
                            )));
                        }
                        frames.deliver_frame(AudioFrame::from_bytes(chunk));
                        delivered += 1;
                        if let Some(error) = context.poll(delay) {
                            return WorkerExit::Finished(error);
                        }
                    }
                    if !looping {
                        return WorkerExit::Finished(None);
                    }
                }
            })
            .map_err(|e| CaptureError::DeviceOpen {
                index: device_index,
                reason: e.to_string(),
            })
    }

    fn unsubscribe(&mut self) {
        self.worker.unsubscribe();
    }

    fn stop(&mut self) {
        self.worker.stop();
    }

    fn is_stopped(&self) -> bool {
        self.worker.is_stopped()
    }

    async fn dispose(&mut self) {
        self.worker.join().await;
    }
}
