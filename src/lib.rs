pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod library;
pub mod session;

pub use audio::{AudioFile, AudioFormat, AudioFrame, BitDepth, Encoder, LevelMeter, LevelSample, Mp3Encoder};
pub use capture::{
    list_input_devices, CaptureEngine, CaptureEngineFactory, CaptureSource, CaptureSubscriber, InputDevice, Pace,
    ReplayEngine, ReplaySource,
};
pub use config::Settings;
pub use error::{
    CaptureError, DeleteRetryExhausted, EncodeError, FinalizeError, RecorderClosed, SessionError, SessionWarning,
    SettingsError, VocabularyError,
};
pub use library::{CalendarSystem, Finalizer, TrackMetadata, VocabularyStore};
pub use session::{
    FinalizedRecording, HostBackend, LevelReading, Recorder, RecorderBackend, RecorderHandle, ResourceReclaimer,
    SessionEvent, SessionState,
};
