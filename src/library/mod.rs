//! Filing finished recordings
//!
//! - `paths`: file name sanitizing and collision-free paths
//! - `finalize`: rename into the library, ID3 tags, vocabulary update
//! - `vocabulary`: persisted genre/singer/album lists

mod calendar;
mod finalize;
mod metadata;
mod paths;
mod vocabulary;

pub use calendar::CalendarSystem;
pub use finalize::{
    FinalizeOutcome, Finalizer, FALLBACK_TITLE, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_GENRE,
};
pub use metadata::TrackMetadata;
pub use paths::{recording_path, sanitize, unique_path};
pub use vocabulary::{Vocabulary, VocabularyStore};
