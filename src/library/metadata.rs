use serde::{Deserialize, Serialize};

/// User-provided description of the recording being made
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMetadata {
    /// File name base and Title tag
    pub title: String,
    pub genre: String,
    /// Written to the Performer tag
    pub singer: String,
    /// Also names the subdirectory the recording is filed under
    pub album: String,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    pub fn with_singer(mut self, singer: impl Into<String>) -> Self {
        self.singer = singer.into();
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }
}
