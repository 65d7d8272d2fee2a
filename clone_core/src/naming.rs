//! On-disk naming scheme for samples and generated artifacts.
//!
//! Samples are stored as `{user_id}_{token}{ext}` and artifacts as
//! `cloned_{user_id}_{token}.wav`. The token is a hyphenated UUIDv7: its
//! leading bits are a millisecond timestamp and the generator is monotonic
//! within the process, so sorting names as strings sorts them by creation
//! time.

use std::path::Path;

use uuid::Uuid;

/// Extensions accepted for uploaded voice samples (lower-case, dot included).
pub const ALLOWED_EXTENSIONS: [&str; 3] = [".wav", ".mp3", ".ogg"];

const ARTIFACT_PREFIX: &str = "cloned_";
const ARTIFACT_EXTENSION: &str = ".wav";
const TOKEN_LEN: usize = 36;

fn new_token() -> String {
    Uuid::now_v7().hyphenated().to_string()
}

/// Fresh sample file name for `user_id`; `ext` includes the leading dot.
pub fn sample_file_name(user_id: &str, ext: &str) -> String {
    format!("{user_id}_{}{ext}", new_token())
}

/// Fresh artifact file name for `user_id`.
pub fn artifact_file_name(user_id: &str) -> String {
    format!("{ARTIFACT_PREFIX}{user_id}_{}{ARTIFACT_EXTENSION}", new_token())
}

/// Owner of a stored sample, or `None` when the name does not follow the
/// `{user_id}_{token}{ext}` scheme.
pub fn sample_owner(file_name: &str) -> Option<&str> {
    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    };
    let split = stem.len().checked_sub(TOKEN_LEN)?;
    if !stem.is_char_boundary(split) {
        return None;
    }
    let (head, token) = stem.split_at(split);
    Uuid::try_parse(token).ok()?;
    let owner = head.strip_suffix('_')?;
    (!owner.is_empty()).then_some(owner)
}

/// Lower-cased extension of an uploaded file name, dot included.
pub fn normalized_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
}

pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext)
}

/// MIME type for a sample, keyed by its file name.
pub fn audio_mime_type(file_name: &str) -> &'static str {
    match normalized_extension(file_name).as_deref() {
        Some(".mp3") => "audio/mpeg",
        Some(".ogg") => "audio/ogg",
        _ => "audio/wav",
    }
}
