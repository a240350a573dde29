// Shared helpers for integration tests
//
// `CountingBackend` hands out replay engines and MP3 encoders that keep track
// of how many are alive, so tests can check that sessions never overlap.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tapedeck::{
    AudioFormat, AudioFrame, CaptureEngine, CaptureError, CaptureSubscriber, EncodeError, Encoder, Mp3Encoder, Pace,
    Recorder, RecorderBackend, ReplayEngine, ReplaySource, SessionEvent, Settings,
};

/// Write a sine tone WAV with hound
pub fn write_sine_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f32, amplitude: f32) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let frames = (sample_rate as f32 * seconds) as u32;
    for n in 0..frames {
        let t = n as f32 / sample_rate as f32;
        let value = (t * 440.0 * std::f32::consts::TAU).sin() * amplitude * f32::from(i16::MAX);
        for _ in 0..channels {
            writer.write_sample(value as i16)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Settings saving into `dir`
pub fn test_settings(dir: &Path) -> Settings {
    Settings {
        save_path: dir.display().to_string(),
        ..Settings::default()
    }
}

/// MP3 files directly inside `dir`
pub fn mp3_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "mp3") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read events until one matches `done`. Returns everything read, including
/// the match.
pub async fn wait_for<F>(recorder: &mut Recorder, mut done: F) -> Result<Vec<SessionEvent>>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let mut events = Vec::new();
    loop {
        let event = match tokio::time::timeout(Duration::from_secs(10), recorder.next_event()).await {
            Ok(Some(event)) => event,
            Ok(None) => bail!("recorder exited; events so far: {:?}", events),
            Err(_) => bail!("timed out waiting for event; events so far: {:?}", events),
        };
        let matched = done(&event);
        events.push(event);
        if matched {
            return Ok(events);
        }
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub live_engines: AtomicUsize,
    pub max_live_engines: AtomicUsize,
    pub engines_started: AtomicUsize,
    pub live_encoders: AtomicUsize,
    pub encoders_created: AtomicUsize,
}

impl Counters {
    pub fn live_engines(&self) -> usize {
        self.live_engines.load(Ordering::SeqCst)
    }

    pub fn max_live_engines(&self) -> usize {
        self.max_live_engines.load(Ordering::SeqCst)
    }

    pub fn engines_started(&self) -> usize {
        self.engines_started.load(Ordering::SeqCst)
    }

    pub fn live_encoders(&self) -> usize {
        self.live_encoders.load(Ordering::SeqCst)
    }
}

/// Scripted backend around `ReplayEngine` and `Mp3Encoder`
#[derive(Clone)]
pub struct CountingBackend {
    pub source: ReplaySource,
    pub pace: Pace,
    pub looping: bool,
    pub device_count: usize,
    pub fail_after_chunks: Option<usize>,
    pub fail_encoder: bool,
    /// Paths to create behind the recorder's back before opening an encoder
    pub taken_paths: Arc<AtomicUsize>,
    pub counters: Arc<Counters>,
}

/// Contents written by `CountingBackend` into paths it takes
pub const OTHER_WRITER: &[u8] = b"written by another process";

impl CountingBackend {
    /// Endless silence, one chunk every 5ms
    pub fn endless(device_count: usize) -> Self {
        Self {
            source: ReplaySource::silence(Duration::from_millis(100)),
            pace: Pace::Fixed(Duration::from_millis(5)),
            looping: true,
            device_count,
            fail_after_chunks: None,
            fail_encoder: false,
            taken_paths: Arc::new(AtomicUsize::new(0)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// `duration` of silence delivered as fast as possible, then a device stop
    pub fn finite(duration: Duration) -> Self {
        Self {
            source: ReplaySource::silence(duration),
            pace: Pace::Unthrottled,
            looping: false,
            ..Self::endless(1)
        }
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl RecorderBackend for CountingBackend {
    fn create_engine(&self) -> Box<dyn CaptureEngine> {
        let mut engine = ReplayEngine::new(self.source.clone())
            .with_pace(self.pace)
            .with_device_count(self.device_count);
        if self.looping {
            engine = engine.looping();
        }
        if let Some(chunks) = self.fail_after_chunks {
            engine = engine.fail_after_chunks(chunks);
        }
        Box::new(CountingEngine {
            inner: engine,
            counters: self.counters(),
            live: false,
        })
    }

    fn create_encoder(
        &self,
        path: &Path,
        format: AudioFormat,
        bitrate_kbps: u32,
    ) -> Result<Box<dyn Encoder>, EncodeError> {
        if self.fail_encoder {
            return Err(EncodeError::Init {
                path: path.to_path_buf(),
                reason: "scripted failure".into(),
            });
        }
        if self
            .taken_paths
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            std::fs::write(path, OTHER_WRITER)?;
        }
        let inner = Mp3Encoder::create(path, format, bitrate_kbps)?;
        self.counters.live_encoders.fetch_add(1, Ordering::SeqCst);
        self.counters.encoders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingEncoder {
            inner,
            counters: self.counters(),
            live: true,
        }))
    }
}

struct CountingEngine {
    inner: ReplayEngine,
    counters: Arc<Counters>,
    live: bool,
}

#[async_trait]
impl CaptureEngine for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    async fn start(
        &mut self,
        device_index: usize,
        format: AudioFormat,
        subscriber: Arc<dyn CaptureSubscriber>,
    ) -> Result<(), CaptureError> {
        self.inner.start(device_index, format, subscriber).await?;
        self.live = true;
        let live = self.counters.live_engines.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live_engines.fetch_max(live, Ordering::SeqCst);
        self.counters.engines_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.inner.unsubscribe();
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn is_stopped(&self) -> bool {
        self.inner.is_stopped()
    }

    async fn dispose(&mut self) {
        self.inner.dispose().await;
        if std::mem::take(&mut self.live) {
            self.counters.live_engines.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct CountingEncoder {
    inner: Mp3Encoder,
    counters: Arc<Counters>,
    live: bool,
}

impl Encoder for CountingEncoder {
    fn write(&mut self, frame: AudioFrame<'_>) -> Result<(), EncodeError> {
        self.inner.write(frame)
    }

    fn flush(&mut self) -> Result<(), EncodeError> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        let result = self.inner.close();
        if std::mem::take(&mut self.live) {
            self.counters.live_encoders.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }
}
