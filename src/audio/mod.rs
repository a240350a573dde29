pub mod encoder;
pub mod file;
pub mod format;
pub mod meter;

pub use encoder::{nearest_bitrate_kbps, Encoder, Mp3Encoder};
pub use file::AudioFile;
pub use format::{AudioFormat, AudioFrame, BitDepth};
pub use meter::{to_percent, LevelMeter, LevelSample};
