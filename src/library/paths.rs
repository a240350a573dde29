use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

/// Characters rejected by common filesystems
const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn is_invalid(c: char) -> bool {
    INVALID_CHARS.contains(&c) || c.is_ascii_control()
}

/// Make `name` safe to use as a single path component.
///
/// Invalid characters become `_`, whitespace runs collapse to one space and
/// leading/trailing spaces and dots are trimmed. Returns `fallback` if nothing
/// usable remains.
pub fn sanitize(name: &str, fallback: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if is_invalid(c) { '_' } else { c })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c| c == ' ' || c == '.');

    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `path` itself if nothing exists there, otherwise the first free
/// `stem (N).ext` next to it.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1u32;
    loop {
        let file_name = match &extension {
            Some(ext) => format!("{stem} ({counter}).{ext}"),
            None => format!("{stem} ({counter})"),
        };
        let candidate = parent.join(file_name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Temporary location for a recording started at `now`
pub fn recording_path<Tz>(save_dir: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let file_name = format!("recording_{}.mp3", now.format("%Y%m%d_%H%M%S"));
    unique_path(&save_dir.join(file_name))
}
