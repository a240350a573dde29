use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// PCM sample width accepted from capture devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    Sixteen,
    ThirtyTwo,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::ThirtyTwo => 32,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        usize::from(self.bits() / 8)
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = String;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(BitDepth::Sixteen),
            32 => Ok(BitDepth::ThirtyTwo),
            other => Err(format!("unsupported bit depth: {other} (expected 16 or 32)")),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

/// Capture format for a recording session (signed little-endian PCM, interleaved)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate_hz: u32,
    /// Sample width
    pub bit_depth: BitDepth,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate_hz: u32, bit_depth: BitDepth, channels: u16) -> Result<Self, String> {
        if sample_rate_hz == 0 {
            return Err("sample rate must be positive".into());
        }
        if !(1..=2).contains(&channels) {
            return Err(format!("unsupported channel count: {channels} (expected 1 or 2)"));
        }
        Ok(Self {
            sample_rate_hz,
            bit_depth,
            channels,
        })
    }

    /// Size of one interleaved frame (one sample per channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.bit_depth.bytes_per_sample() * usize::from(self.channels)
    }

    /// Playback duration of `frames` frames at this format's rate
    pub fn frames_to_duration(&self, frames: u64) -> Duration {
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate_hz))
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate_hz: 44_100,
            bit_depth: BitDepth::Sixteen,
            channels: 2,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}-bit/{}",
            self.sample_rate_hz,
            self.bit_depth.bits(),
            if self.channels == 1 { "mono" } else { "stereo" }
        )
    }
}

/// Raw PCM delivered by a capture engine.
///
/// Borrowed from the engine for the duration of the callback only; the
/// lifetime makes retaining it past the callback impossible.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> AudioFrame<'a> {
    /// Wrap `buffer`, keeping only its first `valid_len` bytes
    pub fn new(buffer: &'a [u8], valid_len: usize) -> Self {
        let valid_len = valid_len.min(buffer.len());
        Self {
            bytes: &buffer[..valid_len],
        }
    }

    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
