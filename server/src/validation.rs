use clone_core::naming::{is_allowed_extension, normalized_extension, ALLOWED_EXTENSIONS};

use crate::error::ApiError;

/// Maximum text length for synthesis requests
const MAX_TEXT_LENGTH: usize = 5000;
/// User ids end up in file names, so keep them short and plain.
const MAX_USER_ID_LENGTH: usize = 64;

/// Validate the `user_id` field and return it trimmed.
pub fn validate_user_id(user_id: Option<&str>) -> Result<&str, ApiError> {
    let user_id = user_id.map(str::trim).unwrap_or_default();
    if user_id.is_empty() {
        return Err(ApiError::InvalidInput(
            "user_id form field is required.".to_string(),
        ));
    }
    check_user_id_format(user_id)?;
    Ok(user_id)
}

fn check_user_id_format(user_id: &str) -> Result<(), ApiError> {
    if user_id.chars().count() > MAX_USER_ID_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "user_id too long (max {} characters)",
            MAX_USER_ID_LENGTH
        )));
    }
    if !user_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::InvalidInput(
            "user_id may only contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

/// Validate an uploaded sample's file name and return its lower-cased extension.
pub fn validate_upload_file_name(file_name: Option<&str>) -> Result<String, ApiError> {
    let file_name = file_name.unwrap_or_default();
    if file_name.is_empty() {
        return Err(ApiError::InvalidInput(
            "No file uploaded or filename missing.".to_string(),
        ));
    }
    match normalized_extension(file_name) {
        Some(ext) if is_allowed_extension(&ext) => Ok(ext),
        _ => Err(ApiError::InvalidInput(format!(
            "Invalid file type. Allowed types: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ))),
    }
}

/// Validate a clone request; returns the trimmed user id and the text.
pub fn validate_clone_request<'a>(
    user_id: Option<&'a str>,
    text: Option<&'a str>,
) -> Result<(&'a str, &'a str), ApiError> {
    let user_id = user_id.map(str::trim).unwrap_or_default();
    let text = text.unwrap_or_default();
    if user_id.is_empty() || text.trim().is_empty() {
        return Err(ApiError::InvalidInput(
            "user_id and text form fields are required.".to_string(),
        ));
    }
    check_user_id_format(user_id)?;
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok((user_id, text))
}

/// Reject anything but a plain file name before touching the disk.
pub fn validate_audio_file_name(file_name: &str) -> Result<(), ApiError> {
    let invalid = file_name.is_empty()
        || file_name.contains("..")
        || file_name.starts_with('/')
        || file_name.starts_with('\\')
        || file_name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ApiError::InvalidInput("Invalid filename.".to_string()));
    }
    Ok(())
}

/// Language codes as the model expects them: `ll` or `ll-cc`, lower-case.
pub fn is_valid_language_code(code: &str) -> bool {
    let is_part = |p: &str| p.len() == 2 && p.chars().all(|c| c.is_ascii_lowercase());
    let parts: Vec<&str> = code.split('-').collect();
    match parts.as_slice() {
        [lang] => is_part(lang),
        [lang, region] => is_part(lang) && is_part(region),
        _ => false,
    }
}
