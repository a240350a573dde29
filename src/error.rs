use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a capture engine, either when opening the device or
/// through the terminal stop notification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("no audio input devices available")]
    DeviceUnavailable,

    #[error("failed to open input device {index}: {reason}")]
    DeviceOpen { index: usize, reason: String },

    #[error("capture failed: {0}")]
    Runtime(String),
}

/// Errors raised by an incremental encoder.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to open encoder output {path}: {reason}")]
    Init { path: PathBuf, reason: String },

    #[error("encoder output {path} already exists")]
    Exists { path: PathBuf },

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("encoder is closed")]
    Closed,

    #[error("encoder I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures while loading or saving the vocabulary file.
#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("failed to read vocabulary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse vocabulary {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize vocabulary: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write vocabulary {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Non-fatal finalization failures. The recording itself is never lost.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("failed to create album directory {path}: {source}")]
    AlbumDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move recording from {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write tags to {path}: {source}")]
    TagWrite {
        path: PathBuf,
        #[source]
        source: id3::Error,
    },

    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
}

/// A temp recording that could not be removed during rollback.
#[derive(Debug, Error)]
#[error("failed to delete {path} after {attempts} attempts: {source}")]
pub struct DeleteRetryExhausted {
    pub path: PathBuf,
    pub attempts: u32,
    #[source]
    pub source: io::Error,
}

/// Failures that abort a session. Reported once through `SessionEvent::Failed`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("failed to prepare save directory {path}: {source}")]
    SaveDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid recording settings: {0}")]
    Settings(#[from] SettingsError),
}

/// Outcomes worth telling the user about that leave the recording intact.
#[derive(Debug, Error)]
pub enum SessionWarning {
    #[error(transparent)]
    Finalize(#[from] FinalizeError),

    #[error("encoder did not shut down cleanly: {0}")]
    Encoder(EncodeError),

    #[error("vocabulary unavailable, starting empty: {0}")]
    Vocabulary(VocabularyError),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("{0}")]
    Invalid(String),
}

/// The recorder's control loop has exited; commands can no longer be sent.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("recorder has shut down")]
pub struct RecorderClosed;
