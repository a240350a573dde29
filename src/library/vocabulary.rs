use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::metadata::TrackMetadata;
use crate::error::VocabularyError;

/// Previously used metadata values, offered for reuse
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub genres: Vec<String>,
    pub singers: Vec<String>,
    pub albums: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || list.iter().any(|existing| existing == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

impl Vocabulary {
    /// Add the genre, singer and album of `metadata`. Returns whether anything
    /// was new.
    pub fn merge(&mut self, metadata: &TrackMetadata) -> bool {
        let genre = push_unique(&mut self.genres, &metadata.genre);
        let singer = push_unique(&mut self.singers, &metadata.singer);
        let album = push_unique(&mut self.albums, &metadata.album);
        genre || singer || album
    }
}

/// A `Vocabulary` backed by a JSON file
#[derive(Debug)]
pub struct VocabularyStore {
    path: PathBuf,
    vocabulary: Vocabulary,
}

impl VocabularyStore {
    /// An empty store that will save to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            vocabulary: Vocabulary::default(),
        }
    }

    /// Load the store at `path`. A missing file loads as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VocabularyError> {
        let path = path.into();
        let vocabulary = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| VocabularyError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vocabulary::default(),
            Err(source) => return Err(VocabularyError::Read { path, source }),
        };
        Ok(Self { path, vocabulary })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Merge `metadata` and persist if it added anything
    pub fn record(&mut self, metadata: &TrackMetadata) -> Result<bool, VocabularyError> {
        if !self.vocabulary.merge(metadata) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Write the vocabulary through a temp file and rename
    pub fn save(&self) -> Result<(), VocabularyError> {
        let write_error = |source| VocabularyError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_error)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.vocabulary)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(write_error)?;
        fs::rename(&tmp, &self.path).map_err(write_error)?;

        debug!("Saved vocabulary to {}", self.path.display());
        Ok(())
    }
}
