use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use id3::{Tag, TagLike, Timestamp, Version};
use tracing::{debug, info, warn};

use super::calendar::CalendarSystem;
use super::metadata::TrackMetadata;
use super::paths::{sanitize, unique_path};
use super::vocabulary::VocabularyStore;
use crate::error::FinalizeError;

pub const FALLBACK_TITLE: &str = "Recording";
pub const UNKNOWN_GENRE: &str = "Unknown Genre";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Names tried before giving up on moving a recording
const MOVE_ATTEMPTS: u32 = 8;

/// Where a finished recording ended up
#[derive(Debug)]
pub struct FinalizeOutcome {
    /// Final location of the audio file
    pub path: PathBuf,
    /// Whether the ID3 tags were written
    pub tagged: bool,
    /// Non-fatal problems hit along the way
    pub warnings: Vec<FinalizeError>,
}

/// Files a finished recording: rename, tag, remember the metadata
pub struct Finalizer {
    save_dir: PathBuf,
    calendar: CalendarSystem,
    vocabulary: VocabularyStore,
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() {
        default
    } else {
        value
    }
}

impl Finalizer {
    pub fn new(save_dir: impl Into<PathBuf>, calendar: CalendarSystem, vocabulary: VocabularyStore) -> Self {
        Self {
            save_dir: save_dir.into(),
            calendar,
            vocabulary,
        }
    }

    pub fn vocabulary(&self) -> &VocabularyStore {
        &self.vocabulary
    }

    /// Finalize the recording at `recorded`. Never fails: problems are
    /// collected into the outcome and the audio file is always kept.
    pub fn run(&mut self, recorded: &Path, metadata: &TrackMetadata, date: NaiveDate) -> FinalizeOutcome {
        let mut warnings = Vec::new();
        let title = sanitize(&metadata.title, FALLBACK_TITLE);

        let path = match self.relocate(recorded, &title, &metadata.album) {
            Ok(path) => path,
            Err(e) => {
                warn!("Keeping recording at {}: {}", recorded.display(), e);
                warnings.push(e);
                recorded.to_path_buf()
            }
        };

        let tagged = match self.write_tags(&path, &title, metadata, date) {
            Ok(()) => true,
            Err(e) => {
                warn!("Recording left untagged: {}", e);
                warnings.push(e);
                false
            }
        };

        if tagged {
            if let Err(e) = self.vocabulary.record(metadata) {
                warn!("Failed to update vocabulary: {}", e);
                warnings.push(e.into());
            }
        }

        info!("Recording saved to {}", path.display());
        FinalizeOutcome {
            path,
            tagged,
            warnings,
        }
    }

    /// Move `recorded` to `<save_dir>[/<album>]/<title>.mp3`
    fn relocate(&self, recorded: &Path, title: &str, album: &str) -> Result<PathBuf, FinalizeError> {
        let mut dir = self.save_dir.clone();
        if !album.trim().is_empty() {
            dir.push(sanitize(album, UNKNOWN_ALBUM));
            fs::create_dir_all(&dir).map_err(|source| FinalizeError::AlbumDirectory {
                path: dir.clone(),
                source,
            })?;
        }

        let extension = recorded
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp3".to_string());
        let desired = dir.join(format!("{title}.{extension}"));
        if desired.as_path() == recorded {
            return Ok(desired);
        }

        let mut attempt = 1;
        loop {
            let target = unique_path(&desired);
            match move_without_replacing(recorded, &target) {
                Ok(()) => return Ok(target),
                // Taken between resolving and moving; resolve again
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < MOVE_ATTEMPTS => {
                    debug!("{} appeared while finalizing, trying the next name", target.display());
                    attempt += 1;
                }
                Err(source) => {
                    return Err(FinalizeError::Rename {
                        from: recorded.to_path_buf(),
                        to: target,
                        source,
                    })
                }
            }
        }
    }

    fn write_tags(
        &self,
        path: &Path,
        title: &str,
        metadata: &TrackMetadata,
        date: NaiveDate,
    ) -> Result<(), FinalizeError> {
        let mut tag = Tag::new();
        tag.set_title(title);
        tag.set_genre(or_default(&metadata.genre, UNKNOWN_GENRE));
        tag.set_artist(or_default(&metadata.singer, UNKNOWN_ARTIST));
        tag.set_album(or_default(&metadata.album, UNKNOWN_ALBUM));
        tag.set_date_recorded(Timestamp {
            year: self.calendar.year(date),
            month: None,
            day: None,
            hour: None,
            minute: None,
            second: None,
        });

        tag.write_to_path(path, Version::Id3v24)
            .map_err(|source| FinalizeError::TagWrite {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Move `from` to `to`. Fails with `AlreadyExists` instead of replacing a
/// file at `to`, which a plain rename would do.
fn move_without_replacing(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists || e.kind() == io::ErrorKind::NotFound => {
            return Err(e)
        }
        // No hard links on this filesystem; copy into a new file instead
        Err(e) => {
            debug!("Hard link to {} failed ({}), copying", to.display(), e);
            let mut source = File::open(from)?;
            let mut dest = OpenOptions::new().write(true).create_new(true).open(to)?;
            if let Err(e) = io::copy(&mut source, &mut dest).and_then(|_| dest.sync_all()) {
                drop(dest);
                let _ = fs::remove_file(to);
                return Err(e);
            }
        }
    }

    if let Err(e) = fs::remove_file(from) {
        warn!("Recording moved to {} but {} remains: {}", to.display(), from.display(), e);
    }
    Ok(())
}
