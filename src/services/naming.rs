// src/services/naming.rs
//
// Storage keys are `{unix_millis}_{token}`. The token carries enough entropy
// that clients uploading in the same millisecond do not collide.
use crate::models::{ORIGINAL_SUFFIX, THUMB_SUFFIX, WEBP_EXTENSION};
use chrono::Utc;
use uuid::Uuid;

const TOKEN_LEN: usize = 12;

pub fn asset_base() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().timestamp_millis(), &token[..TOKEN_LEN])
}

pub fn main_key(base: &str) -> String {
    format!("{}.{}", base, WEBP_EXTENSION)
}

pub fn thumbnail_key(base: &str) -> String {
    format!("{}{}.{}", base, THUMB_SUFFIX, WEBP_EXTENSION)
}

pub fn original_key(base: &str, extension: &str) -> String {
    format!("{}{}.{}", base, ORIGINAL_SUFFIX, extension)
}

/// `{base}.webp` -> `{base}_thumb.webp`. `None` for anything else, including
/// thumbnails and unprocessed `_original` uploads.
pub fn thumbnail_key_for(main: &str) -> Option<String> {
    let base = main.strip_suffix(&format!(".{}", WEBP_EXTENSION))?;
    if base.is_empty() || base.ends_with(THUMB_SUFFIX) || base.ends_with(ORIGINAL_SUFFIX) {
        return None;
    }
    Some(thumbnail_key(base))
}

pub fn is_thumbnail_key(key: &str) -> bool {
    key.strip_suffix(&format!(".{}", WEBP_EXTENSION))
        .is_some_and(|base| base.ends_with(THUMB_SUFFIX))
}

/// Extension for an unprocessed upload: the file's own if it has a sane one,
/// else one derived from the content type.
pub fn extension_for(name: Option<&str>, content_type: &str) -> String {
    let from_name = name
        .and_then(|n| n.rsplit_once('.'))
        .map(|(stem, ext)| (stem, ext.to_ascii_lowercase()))
        .filter(|(stem, ext)| {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|(_, ext)| ext);
    if let Some(ext) = from_name {
        return ext;
    }

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        "image/heic" => "heic",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "bin",
    }
    .to_string()
}
