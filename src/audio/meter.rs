// Per-channel peak metering for the live level display
//
// Pure functions over raw interleaved PCM. Called inline from the capture
// callback, so nothing here allocates or locks.

use serde::Serialize;

use super::format::{AudioFormat, BitDepth};

const I16_SCALE: f32 = 32_768.0;
const I32_SCALE: f64 = 2_147_483_648.0;

/// Peak amplitude per displayed channel, each in [0.0, 1.0]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LevelSample {
    pub left: f32,
    pub right: f32,
}

impl LevelSample {
    pub fn left_percent(&self) -> f32 {
        to_percent(self.left)
    }

    pub fn right_percent(&self) -> f32 {
        to_percent(self.right)
    }
}

/// Express a normalized level as a display percentage in [0, 100]
pub fn to_percent(level: f32) -> f32 {
    (level * 100.0).clamp(0.0, 100.0)
}

pub struct LevelMeter;

impl LevelMeter {
    /// Peak level for both displayed channels. Mono input is duplicated.
    pub fn measure(buffer: &[u8], format: &AudioFormat) -> LevelSample {
        let left = Self::channel_peak(buffer, format.bit_depth, format.channels, 0);
        let right = if format.channels >= 2 {
            Self::channel_peak(buffer, format.bit_depth, format.channels, 1)
        } else {
            left
        };
        LevelSample { left, right }
    }

    /// Maximum absolute normalized sample for `channel` across `buffer`.
    ///
    /// Samples are read at the channel's byte offset with a stride of one
    /// interleaved frame. A trailing partial sample is ignored.
    pub fn channel_peak(buffer: &[u8], bit_depth: BitDepth, channels: u16, channel: u16) -> f32 {
        let width = bit_depth.bytes_per_sample();
        let stride = width * usize::from(channels.max(1));
        let mut offset = usize::from(channel) * width;
        let mut peak = 0.0f32;

        while offset + width <= buffer.len() {
            let sample = &buffer[offset..offset + width];
            let magnitude = match bit_depth {
                BitDepth::Sixteen => {
                    (f32::from(i16::from_le_bytes([sample[0], sample[1]])) / I16_SCALE).abs()
                }
                BitDepth::ThirtyTwo => {
                    let value = i32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
                    (f64::from(value) / I32_SCALE).abs() as f32
                }
            };
            peak = peak.max(magnitude);
            offset += stride;
        }

        peak.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_stereo_channels_are_separated() {
        let format = AudioFormat::new(44_100, BitDepth::Sixteen, 2).unwrap();
        let buffer = pcm16(&[16_384, -8_192, -16_384, 0]);

        let level = LevelMeter::measure(&buffer, &format);
        assert!((level.left - 0.5).abs() < 1e-6);
        assert!((level.right - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_mono_is_duplicated() {
        let format = AudioFormat::new(44_100, BitDepth::Sixteen, 1).unwrap();
        let buffer = pcm16(&[0, -32_768, 100]);

        let level = LevelMeter::measure(&buffer, &format);
        assert_eq!(level.left, 1.0);
        assert_eq!(level.right, 1.0);
    }

    #[test]
    fn test_partial_trailing_sample_ignored() {
        let mut buffer = pcm16(&[1_000]);
        buffer.push(0x7f);
        let peak = LevelMeter::channel_peak(&buffer, BitDepth::Sixteen, 1, 0);
        assert!((peak - 1_000.0 / 32_768.0).abs() < 1e-6);
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(to_percent(1.5), 100.0);
        assert_eq!(to_percent(-0.1), 0.0);
        assert_eq!(to_percent(0.5), 50.0);
    }
}
