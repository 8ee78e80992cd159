//! Glyph rasterization for title, caption, and watermark text.

use std::path::Path;

use fontdue::{Font, FontSettings};

use mediamerge_common::error::{MergeError, MergeResult};

use crate::canvas::Surface;

/// Horizontal anchor for [`TextRenderer::draw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `x` is the horizontal centre of the line.
    Center,
    /// `x` is the right edge of the line.
    Right,
}

/// Pixel extent of a single line of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextExtent {
    pub width: i32,
    pub ascent: i32,
    pub descent: i32,
}

/// Single-line text renderer backed by a TrueType font.
pub struct TextRenderer {
    font: Font,
}

impl std::fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRenderer")
            .field("font", &self.font.name())
            .finish()
    }
}

impl TextRenderer {
    pub fn from_bytes(bytes: &[u8]) -> MergeResult<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| MergeError::invalid_config(format!("failed to parse font: {e}")))?;
        Ok(Self { font })
    }

    pub fn from_path(path: &Path) -> MergeResult<Self> {
        if !path.exists() {
            return Err(MergeError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path)?;
        let renderer = Self::from_bytes(&bytes)?;
        tracing::debug!(path = %path.display(), "Loaded font");
        Ok(renderer)
    }

    pub fn measure(&self, text: &str, size: f32) -> TextExtent {
        let mut extent = TextExtent {
            width: 0,
            ascent: 0,
            descent: 0,
        };
        for ch in text.chars() {
            let metrics = self.font.metrics(ch, size);
            extent.ascent = extent.ascent.max(metrics.height as i32 + metrics.ymin);
            extent.descent = extent.descent.max(-metrics.ymin);
            extent.width += metrics.advance_width.round() as i32;
        }
        extent
    }

    /// Draw one line with its baseline at `baseline_y`.
    pub fn draw(
        &self,
        surface: &mut Surface,
        text: &str,
        size: f32,
        x: f32,
        baseline_y: f32,
        anchor: Anchor,
        color: [u8; 4],
    ) {
        let extent = self.measure(text, size);
        let mut pen_x = match anchor {
            Anchor::Center => x.round() as i32 - extent.width / 2,
            Anchor::Right => x.round() as i32 - extent.width,
        };
        let baseline = baseline_y.round() as i32;

        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, size);
            let left = pen_x + metrics.xmin;
            let top = baseline - (metrics.height as i32 + metrics.ymin);
            surface.blend_mask(left, top, metrics.width, metrics.height, &bitmap, color);
            pen_x += metrics.advance_width.round() as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_font_bytes_rejected() {
        let err = TextRenderer::from_bytes(b"not a font").unwrap_err();
        assert_eq!(err.kind(), mediamerge_common::error::ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_missing_font_file() {
        let err = TextRenderer::from_path(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(matches!(err, MergeError::FileNotFound { .. }));
    }
}
