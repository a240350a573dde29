use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};
use tracing::{debug, warn};

use super::format::{AudioFormat, AudioFrame, BitDepth};
use crate::error::EncodeError;

/// Incremental sink turning raw PCM frames into a compressed file.
///
/// `flush` and `close` may be called any number of times, including after a
/// failed `write`; redundant calls are no-ops.
pub trait Encoder: Send {
    /// Append one frame of PCM. May block on file I/O.
    fn write(&mut self, frame: AudioFrame<'_>) -> Result<(), EncodeError>;

    /// Push already-encoded data through to the backing file
    fn flush(&mut self) -> Result<(), EncodeError>;

    /// Emit the final frames and release the file
    fn close(&mut self) -> Result<(), EncodeError>;

    /// Path of the backing file
    fn path(&self) -> &Path;
}

/// Bitrates LAME supports for CBR encoding
const LAME_BITRATES_KBPS: [u32; 16] = [
    8, 16, 24, 32, 40, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

/// Closest LAME-supported bitrate to `kbps`. Ties round down.
pub fn nearest_bitrate_kbps(kbps: u32) -> u32 {
    LAME_BITRATES_KBPS
        .iter()
        .copied()
        .min_by_key(|supported| supported.abs_diff(kbps))
        .unwrap_or(128)
}

fn lame_bitrate(kbps: u32) -> Bitrate {
    match nearest_bitrate_kbps(kbps) {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

/// Worst-case MP3 output for `samples` input samples (LAME: 1.25n + 7200)
fn mp3_buffer_size(samples: usize) -> usize {
    samples + samples / 4 + 7_200
}

/// MP3 encoder writing to a freshly created file
pub struct Mp3Encoder {
    path: PathBuf,
    format: AudioFormat,
    lame: Option<mp3lame_encoder::Encoder>,
    file: Option<BufWriter<File>>,
    pcm: Vec<i16>,
    mp3: Vec<u8>,
    bytes_written: u64,
}

impl Mp3Encoder {
    /// Create the encoder and its backing file.
    ///
    /// The file is created with create-new semantics, so an existing file at
    /// `path` is never overwritten; that case fails with
    /// [`EncodeError::Exists`].
    pub fn create(
        path: impl Into<PathBuf>,
        format: AudioFormat,
        bitrate_kbps: u32,
    ) -> Result<Self, EncodeError> {
        let path = path.into();

        let mut builder = Builder::new().ok_or_else(|| init_error(&path, "failed to allocate LAME encoder"))?;
        builder
            .set_num_channels(format.channels as u8)
            .map_err(|e| init_error(&path, format!("channels rejected: {e:?}")))?;
        builder
            .set_sample_rate(format.sample_rate_hz)
            .map_err(|e| init_error(&path, format!("sample rate rejected: {e:?}")))?;
        builder
            .set_brate(lame_bitrate(bitrate_kbps))
            .map_err(|e| init_error(&path, format!("bitrate rejected: {e:?}")))?;
        builder
            .set_quality(Quality::Good)
            .map_err(|e| init_error(&path, format!("quality rejected: {e:?}")))?;
        let lame = builder
            .build()
            .map_err(|e| init_error(&path, format!("LAME initialization failed: {e:?}")))?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => EncodeError::Exists { path: path.clone() },
                _ => init_error(&path, e),
            })?;

        debug!(
            "MP3 encoder opened: {} ({}, {}kbps)",
            path.display(),
            format,
            nearest_bitrate_kbps(bitrate_kbps)
        );

        Ok(Self {
            path,
            format,
            lame: Some(lame),
            file: Some(BufWriter::new(file)),
            pcm: Vec::new(),
            mp3: Vec::new(),
            bytes_written: 0,
        })
    }

    /// Encoded bytes handed to the backing file so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Decode little-endian PCM into whole interleaved i16 frames
    fn decode_pcm(&mut self, bytes: &[u8]) {
        self.pcm.clear();
        match self.format.bit_depth {
            BitDepth::Sixteen => self
                .pcm
                .extend(bytes.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]]))),
            BitDepth::ThirtyTwo => self.pcm.extend(
                bytes
                    .chunks_exact(4)
                    .map(|b| (i32::from_le_bytes([b[0], b[1], b[2], b[3]]) >> 16) as i16),
            ),
        }
        let channels = usize::from(self.format.channels);
        let whole = self.pcm.len() - self.pcm.len() % channels;
        self.pcm.truncate(whole);
    }
}

fn init_error(path: &Path, reason: impl ToString) -> EncodeError {
    EncodeError::Init {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl Encoder for Mp3Encoder {
    fn write(&mut self, frame: AudioFrame<'_>) -> Result<(), EncodeError> {
        if self.lame.is_none() || self.file.is_none() {
            return Err(EncodeError::Closed);
        }

        self.decode_pcm(frame.bytes());
        if self.pcm.is_empty() {
            return Ok(());
        }

        self.mp3.clear();
        self.mp3.reserve(mp3_buffer_size(self.pcm.len()));

        let (Some(lame), Some(file)) = (self.lame.as_mut(), self.file.as_mut()) else {
            return Err(EncodeError::Closed);
        };
        let encoded = if self.format.channels == 1 {
            lame.encode_to_vec(MonoPcm(&self.pcm), &mut self.mp3)
        } else {
            lame.encode_to_vec(InterleavedPcm(&self.pcm), &mut self.mp3)
        }
        .map_err(|e| EncodeError::Encode(format!("{e:?}")))?;

        file.write_all(&self.mp3[..encoded])?;
        self.bytes_written += encoded as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EncodeError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        let lame = self.lame.take();
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        if let Some(mut lame) = lame {
            self.mp3.clear();
            self.mp3.reserve(mp3_buffer_size(0));
            let encoded = lame
                .flush_to_vec::<FlushNoGap>(&mut self.mp3)
                .map_err(|e| EncodeError::Encode(format!("{e:?}")))?;
            file.write_all(&self.mp3[..encoded])?;
            self.bytes_written += encoded as u64;
        }

        file.flush()?;
        file.get_ref().sync_all()?;
        debug!(
            "MP3 encoder closed: {} ({} bytes)",
            self.path.display(),
            self.bytes_written
        );
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Mp3Encoder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close MP3 encoder on drop: {}", e);
        }
    }
}
