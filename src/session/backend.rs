use std::path::Path;

use crate::audio::{AudioFormat, Encoder, Mp3Encoder};
use crate::capture::{CaptureEngine, CaptureEngineFactory, CaptureSource};
use crate::error::EncodeError;

/// Creates the per-session engine and encoder
pub trait RecorderBackend: Send + Sync {
    /// A fresh, unstarted capture engine
    fn create_engine(&self) -> Box<dyn CaptureEngine>;

    /// An encoder writing to a new file at `path`
    fn create_encoder(
        &self,
        path: &Path,
        format: AudioFormat,
        bitrate_kbps: u32,
    ) -> Result<Box<dyn Encoder>, EncodeError>;
}

/// Capture from `source`, encode to MP3
#[derive(Debug, Clone)]
pub struct HostBackend {
    source: CaptureSource,
}

impl HostBackend {
    pub fn new(source: CaptureSource) -> Self {
        Self { source }
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new(CaptureSource::Device)
    }
}

impl RecorderBackend for HostBackend {
    fn create_engine(&self) -> Box<dyn CaptureEngine> {
        CaptureEngineFactory::create(&self.source)
    }

    fn create_encoder(
        &self,
        path: &Path,
        format: AudioFormat,
        bitrate_kbps: u32,
    ) -> Result<Box<dyn Encoder>, EncodeError> {
        Ok(Box::new(Mp3Encoder::create(path, format, bitrate_kbps)?))
    }
}
