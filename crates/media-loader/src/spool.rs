//! Scoped temporary copies of uploaded bytes.
//!
//! External decoders need a path; the spool file is deleted when the
//! returned handle drops, on success and error paths alike.

use std::io::Write;

use tempfile::NamedTempFile;

use mediamerge_common::error::MergeResult;
use mediamerge_composition_model::asset::RawFile;

/// File suffix matching a MIME type, so decoders can sniff by extension.
pub fn suffix_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "audio/mpeg" | "audio/mp3" => ".mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => ".wav",
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        _ => ".bin",
    }
}

/// Write the file's bytes to a fresh temporary file.
pub fn spool(file: &RawFile) -> MergeResult<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix("mediamerge-")
        .suffix(suffix_for_mime(&file.mime))
        .tempfile()?;
    tmp.write_all(&file.bytes)?;
    tmp.flush()?;
    tracing::trace!(
        asset = %file.name,
        path = %tmp.path().display(),
        bytes = file.len(),
        "Spooled asset"
    );
    Ok(tmp)
}
