// Integration tests for the MP3 encoder
//
// Encoded files are decoded again with symphonia to confirm they hold valid
// MP3 framing of roughly the expected length.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tapedeck::{AudioFormat, AudioFrame, BitDepth, EncodeError, Encoder, Mp3Encoder};
use tempfile::TempDir;

/// Decode an MP3 file, returning (sample rate, channels, decoded frames)
fn decode_mp3(path: &Path) -> Result<(u32, usize, u64)> {
    let file = File::open(path)?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .context("Not a recognizable MP3 stream")?;
    let mut format = probed.format;
    let track = format.default_track().context("No audio track")?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_rate = 0;
    let mut channels = 0;
    let mut frames = 0u64;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder.decode(&packet)?;
        let spec = decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count();
        frames += decoded.frames() as u64;
    }
    Ok((sample_rate, channels, frames))
}

fn tone_pcm(format: &AudioFormat, seconds: f32) -> Vec<u8> {
    let frames = (format.sample_rate_hz as f32 * seconds) as usize;
    let mut bytes = Vec::with_capacity(frames * format.bytes_per_frame());
    for n in 0..frames {
        let t = n as f32 / format.sample_rate_hz as f32;
        let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
        for _ in 0..format.channels {
            match format.bit_depth {
                BitDepth::Sixteen => bytes.extend_from_slice(&((value * 32_767.0) as i16).to_le_bytes()),
                BitDepth::ThirtyTwo => {
                    bytes.extend_from_slice(&((value as f64 * 2_147_483_647.0) as i32).to_le_bytes())
                }
            }
        }
    }
    bytes
}

fn encode(path: &Path, format: AudioFormat, pcm: &[u8]) -> Result<Mp3Encoder> {
    let mut encoder = Mp3Encoder::create(path, format, 128)?;
    // Feed 100ms at a time like a capture callback
    let chunk = format.bytes_per_frame() * (format.sample_rate_hz as usize / 10);
    for piece in pcm.chunks(chunk) {
        encoder.write(AudioFrame::from_bytes(piece))?;
    }
    Ok(encoder)
}

#[test]
fn test_encode_stereo_16_bit() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("stereo.mp3");
    let format = AudioFormat::default();

    let mut encoder = encode(&path, format, &tone_pcm(&format, 1.0))?;
    encoder.close()?;
    assert!(encoder.bytes_written() > 0);
    assert_eq!(std::fs::metadata(&path)?.len(), encoder.bytes_written());

    let (rate, channels, frames) = decode_mp3(&path)?;
    assert_eq!(rate, 44_100);
    assert_eq!(channels, 2);
    // Encoder delay and padding add at most a few MP3 frames
    assert!(frames >= 44_100 && frames < 44_100 + 6 * 1_152, "decoded {} frames", frames);

    Ok(())
}

#[test]
fn test_encode_mono_32_bit() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("mono.mp3");
    let format = AudioFormat::new(48_000, BitDepth::ThirtyTwo, 1).map_err(anyhow::Error::msg)?;

    let mut encoder = encode(&path, format, &tone_pcm(&format, 0.5))?;
    encoder.close()?;

    let (rate, channels, frames) = decode_mp3(&path)?;
    assert_eq!(rate, 48_000);
    assert_eq!(channels, 1);
    assert!(frames >= 24_000, "decoded {} frames", frames);

    Ok(())
}

#[test]
fn test_flush_and_close_are_idempotent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("twice.mp3");
    let format = AudioFormat::default();

    let mut encoder = encode(&path, format, &tone_pcm(&format, 0.2))?;
    encoder.flush()?;
    encoder.flush()?;
    encoder.close()?;
    let size = encoder.bytes_written();

    encoder.close()?;
    encoder.flush()?;
    assert_eq!(encoder.bytes_written(), size, "Redundant close writes nothing");

    let result = encoder.write(AudioFrame::from_bytes(&[0; 4]));
    assert!(matches!(result, Err(EncodeError::Closed)));
    encoder.close()?;

    Ok(())
}

#[test]
fn test_create_never_overwrites() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("taken.mp3");
    std::fs::write(&path, b"keep me")?;

    let result = Mp3Encoder::create(&path, AudioFormat::default(), 192);
    assert!(matches!(result, Err(EncodeError::Exists { .. })));
    assert_eq!(std::fs::read(&path)?, b"keep me");

    let missing_dir = temp_dir.path().join("missing").join("out.mp3");
    assert!(matches!(
        Mp3Encoder::create(&missing_dir, AudioFormat::default(), 192),
        Err(EncodeError::Init { .. })
    ));

    Ok(())
}

#[test]
fn test_drop_closes_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("dropped.mp3");
    let format = AudioFormat::default();

    let encoder = encode(&path, format, &tone_pcm(&format, 0.5))?;
    drop(encoder);

    let (_, _, frames) = decode_mp3(&path)?;
    assert!(frames >= 22_050);
    Ok(())
}
