use std::path::PathBuf;

use serde::Deserialize;

use crate::audio::{AudioFormat, BitDepth};
use crate::error::SettingsError;
use crate::library::CalendarSystem;

/// Settings file looked up next to the working directory when no path is given
pub const DEFAULT_SETTINGS_FILE: &str = "tapedeck";

/// Prefix of environment overrides, e.g. `TAPEDECK_SAMPLE_RATE_HZ=48000`
const ENV_PREFIX: &str = "TAPEDECK";

/// Recorder settings, read-only once loaded
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory recordings are filed under
    pub save_path: String,

    /// Start recording as soon as the recorder launches
    pub auto_start_recording: bool,

    /// Request shutdown once a recording has been saved
    pub close_after_save: bool,

    pub sample_rate_hz: u32,
    pub mp3_bitrate_kbps: u32,
    pub bit_depth: u16,
    pub channels: u16,

    /// Input device used when a start does not name one
    pub device_index: usize,

    /// Calendar for the Year tag
    pub calendar: CalendarSystem,

    /// Defaults to `<save_path>/vocabulary.json`
    pub vocabulary_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            save_path: "~/Music/tapedeck".to_string(),
            auto_start_recording: false,
            close_after_save: false,
            sample_rate_hz: 44_100,
            mp3_bitrate_kbps: 192,
            bit_depth: 16,
            channels: 2,
            device_index: 0,
            calendar: CalendarSystem::Gregorian,
            vocabulary_path: None,
        }
    }
}

impl Settings {
    /// Load defaults, then the settings file, then `TAPEDECK_*` variables.
    ///
    /// With `path` the file must exist; without it `tapedeck.{toml,json,..}`
    /// is used if present.
    pub fn load(path: Option<&str>) -> Result<Self, SettingsError> {
        let defaults = Settings::default();
        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        };

        let settings = config::Config::builder()
            .set_default("save_path", defaults.save_path)?
            .set_default("auto_start_recording", defaults.auto_start_recording)?
            .set_default("close_after_save", defaults.close_after_save)?
            .set_default("sample_rate_hz", i64::from(defaults.sample_rate_hz))?
            .set_default("mp3_bitrate_kbps", i64::from(defaults.mp3_bitrate_kbps))?
            .set_default("bit_depth", i64::from(defaults.bit_depth))?
            .set_default("channels", i64::from(defaults.channels))?
            .set_default("device_index", defaults.device_index as i64)?
            .set_default("calendar", "gregorian")?
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sample_rate_hz == 0 {
            return Err(SettingsError::Invalid("sample_rate_hz must be positive".into()));
        }
        if self.mp3_bitrate_kbps == 0 {
            return Err(SettingsError::Invalid("mp3_bitrate_kbps must be positive".into()));
        }
        if self.save_path.trim().is_empty() {
            return Err(SettingsError::Invalid("save_path must not be empty".into()));
        }
        self.audio_format().map(|_| ())
    }

    /// Capture format requested from the input device
    pub fn audio_format(&self) -> Result<AudioFormat, SettingsError> {
        let bit_depth = BitDepth::try_from(self.bit_depth).map_err(SettingsError::Invalid)?;
        AudioFormat::new(self.sample_rate_hz, bit_depth, self.channels).map_err(SettingsError::Invalid)
    }

    /// `save_path` with `~` and environment variables expanded
    pub fn save_dir(&self) -> PathBuf {
        expand(&self.save_path)
    }

    pub fn vocabulary_path(&self) -> PathBuf {
        match &self.vocabulary_path {
            Some(path) => expand(path),
            None => self.save_dir().join("vocabulary.json"),
        }
    }
}

fn expand(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}
