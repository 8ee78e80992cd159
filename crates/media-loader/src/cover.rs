//! Cover-image decoding (PNG and JPEG).

use image::{ImageFormat, RgbaImage};

use mediamerge_common::error::{MergeError, MergeResult};
use mediamerge_composition_model::asset::RawFile;

/// A decoded still image in RGBA8.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub name: String,
    pub pixels: RgbaImage,
}

impl ImageHandle {
    pub fn new(name: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            name: name.into(),
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

fn format_for_mime(mime: &str) -> Option<ImageFormat> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        _ => None,
    }
}

/// Decode a PNG or JPEG cover image.
pub fn decode_image(file: &RawFile) -> MergeResult<ImageHandle> {
    let format = format_for_mime(&file.mime).ok_or_else(|| {
        MergeError::unsupported_format(format!("'{}' is not a PNG or JPEG image", file.name))
    })?;
    if file.is_empty() {
        return Err(MergeError::corrupt_asset(&file.name, "file is empty"));
    }

    let decoded = image::load_from_memory_with_format(&file.bytes, format)
        .map_err(|e| MergeError::corrupt_asset(&file.name, format!("image decode failed: {e}")))?;
    let pixels = decoded.to_rgba8();
    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(MergeError::corrupt_asset(&file.name, "image has no pixels"));
    }

    tracing::debug!(
        asset = %file.name,
        width = pixels.width(),
        height = pixels.height(),
        "Decoded image"
    );
    Ok(ImageHandle::new(file.name.clone(), pixels))
}
