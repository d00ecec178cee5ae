//! Deterministic object paths for uploaded files.
//!
//! ```text
//! requests/<form-folder>/<file-id>_<row-id>/<kind>_<YYYYMMDDHHMMSS>_<n>_<name><ext>
//! ```

use std::path::Path;

use super::{UploadKind, UploadTarget};
use crate::sanitize::sanitize_key;

/// Extension used when neither the filename nor the MIME type gives one.
pub const DEFAULT_EXTENSION: &str = ".bin";

const DEFAULT_MIME: &str = "application/octet-stream";

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", ".pdf"),
    ("image/jpeg", ".jpg"),
    ("image/jpg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/heic", ".heic"),
    ("image/heif", ".heif"),
    ("image/tiff", ".tiff"),
    ("text/plain", ".txt"),
    ("text/csv", ".csv"),
    ("application/msword", ".doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    ("application/vnd.ms-excel", ".xls"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xlsx",
    ),
];

/// Extension for a MIME type, ignoring case and parameters.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .unwrap_or(DEFAULT_EXTENSION)
}

/// MIME type for a stored object path, from its extension.
pub fn mime_for_path(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()));
    match ext {
        Some(ext) => MIME_EXTENSIONS
            .iter()
            .find(|(_, known)| *known == ext)
            .map(|(mime, _)| *mime)
            .unwrap_or(DEFAULT_MIME),
        None => DEFAULT_MIME,
    }
}

/// Final path component of a client-supplied filename.
fn base_name(file_name: &str) -> &str {
    file_name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(file_name)
}

/// Extension (with leading dot) for an upload.
///
/// Taken from the original filename when it has one, otherwise from the
/// MIME type.
pub fn extension_for(file_name: &str, mime_type: &str) -> String {
    let from_name = Path::new(base_name(file_name))
        .extension()
        .map(|e| {
            e.to_string_lossy()
                .to_lowercase()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
        })
        .filter(|e| !e.is_empty());

    match from_name {
        Some(ext) => format!(".{}", ext),
        None => extension_for_mime(mime_type).to_string(),
    }
}

/// Sanitized filename without its extension.
pub fn sanitized_stem(file_name: &str) -> String {
    let name = base_name(file_name);
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    sanitize_key(&stem)
}

/// Object path for one upload.
///
/// `position` is the 1-based index within the entry's own list.
pub fn object_path(
    form_folder: &str,
    target: &UploadTarget,
    kind: UploadKind,
    timestamp: &str,
    position: usize,
    file_name: &str,
    mime_type: &str,
) -> String {
    format!(
        "requests/{}/{}_{}/{}_{}_{}_{}{}",
        form_folder,
        target.file_id,
        target.row_id,
        kind,
        timestamp,
        position,
        sanitized_stem(file_name),
        extension_for(file_name, mime_type),
    )
}

/// Variant of `path` with `-<n>` before the extension, for retrying a
/// name that is already taken.
pub fn disambiguate(path: &str, n: usize) -> String {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = name_start + dot;
            format!("{}-{}{}", &path[..dot], n, &path[dot..])
        }
        _ => format!("{}-{}", path, n),
    }
}
