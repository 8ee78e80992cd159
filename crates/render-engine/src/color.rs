//! Colour matrices for the compositing-wide filter.
//!
//! Matrices operate on normalized RGB in `[0, 1]` and leave alpha alone.
//! Coefficients follow the CSS filter-effects definitions, so a preset like
//! "sepia(0.8) contrast(1.1)" composes into one affine transform.

use mediamerge_composition_model::config::ColorFilter;

/// Affine RGB transform: `out = m[..3] * rgb + m[3]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix {
    rows: [[f32; 4]; 3],
}

impl ColorMatrix {
    pub const IDENTITY: Self = Self {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    fn linear(m: [[f32; 3]; 3]) -> Self {
        Self {
            rows: [
                [m[0][0], m[0][1], m[0][2], 0.0],
                [m[1][0], m[1][1], m[1][2], 0.0],
                [m[2][0], m[2][1], m[2][2], 0.0],
            ],
        }
    }

    pub fn grayscale(amount: f32) -> Self {
        let a = 1.0 - amount.clamp(0.0, 1.0);
        Self::linear([
            [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
            [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
            [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
        ])
    }

    pub fn sepia(amount: f32) -> Self {
        let a = 1.0 - amount.clamp(0.0, 1.0);
        Self::linear([
            [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
            [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
            [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
        ])
    }

    pub fn saturate(s: f32) -> Self {
        Self::linear([
            [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
            [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
            [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
        ])
    }

    pub fn hue_rotate(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::linear([
            [
                0.213 + cos * 0.787 - sin * 0.213,
                0.715 - cos * 0.715 - sin * 0.715,
                0.072 - cos * 0.072 + sin * 0.928,
            ],
            [
                0.213 - cos * 0.213 + sin * 0.143,
                0.715 + cos * 0.285 + sin * 0.140,
                0.072 - cos * 0.072 - sin * 0.283,
            ],
            [
                0.213 - cos * 0.213 - sin * 0.787,
                0.715 - cos * 0.715 + sin * 0.715,
                0.072 + cos * 0.928 + sin * 0.072,
            ],
        ])
    }

    pub fn contrast(c: f32) -> Self {
        let offset = 0.5 - 0.5 * c;
        Self {
            rows: [
                [c, 0.0, 0.0, offset],
                [0.0, c, 0.0, offset],
                [0.0, 0.0, c, offset],
            ],
        }
    }

    pub fn brightness(b: f32) -> Self {
        Self::linear([[b, 0.0, 0.0], [0.0, b, 0.0], [0.0, 0.0, b]])
    }

    /// Apply `self`, then `next`.
    pub fn then(self, next: Self) -> Self {
        let s = &self.rows;
        let n = &next.rows;
        let mut rows = [[0.0f32; 4]; 3];
        for (i, row) in rows.iter_mut().enumerate() {
            for j in 0..3 {
                row[j] = (0..3).map(|k| n[i][k] * s[k][j]).sum();
            }
            row[3] = (0..3).map(|k| n[i][k] * s[k][3]).sum::<f32>() + n[i][3];
        }
        Self { rows }
    }

    /// Transform one RGBA8 pixel.
    pub fn apply(&self, px: [u8; 4]) -> [u8; 4] {
        let rgb = [
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
        ];
        let mut out = [0u8; 4];
        for (i, row) in self.rows.iter().enumerate() {
            let v = row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2] + row[3];
            out[i] = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
        out[3] = px[3];
        out
    }

    /// The composed matrix for a filter preset, or `None` for no filter.
    pub fn for_filter(filter: ColorFilter) -> Option<Self> {
        let m = match filter {
            ColorFilter::None => return None,
            ColorFilter::Bw => Self::grayscale(1.0),
            ColorFilter::Sepia => Self::sepia(0.8),
            ColorFilter::Contrast => Self::contrast(1.4).then(Self::saturate(1.2)),
            ColorFilter::Warm => Self::sepia(0.3)
                .then(Self::saturate(1.4))
                .then(Self::hue_rotate(-10.0)),
            ColorFilter::Cool => Self::saturate(1.1)
                .then(Self::hue_rotate(15.0))
                .then(Self::brightness(1.05)),
            ColorFilter::Retro => Self::sepia(0.5)
                .then(Self::contrast(1.2))
                .then(Self::saturate(0.8))
                .then(Self::brightness(0.95)),
        };
        Some(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_noop() {
        let px = [12, 200, 99, 128];
        assert_eq!(ColorMatrix::IDENTITY.apply(px), px);
    }

    #[test]
    fn test_grayscale_equalizes_channels() {
        let out = ColorMatrix::grayscale(1.0).apply([255, 0, 0, 255]);
        assert_eq!(out[0], out[1]);
        assert_eq!(out[1], out[2]);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn test_contrast_keeps_mid_grey() {
        let out = ColorMatrix::contrast(2.0).apply([128, 128, 128, 255]);
        assert!((out[0] as i32 - 128).abs() <= 1);
        let dark = ColorMatrix::contrast(2.0).apply([64, 64, 64, 255]);
        assert!(dark[0] < 10);
    }

    #[test]
    fn test_composition_order() {
        let m = ColorMatrix::brightness(0.5).then(ColorMatrix::contrast(2.0));
        // brightness first: 200 -> 100, then contrast around 127.5 -> ~72
        let out = m.apply([200, 200, 200, 255]);
        assert!((out[0] as i32 - 73).abs() <= 1, "got {}", out[0]);
    }

    #[test]
    fn test_none_filter_has_no_matrix() {
        assert!(ColorMatrix::for_filter(ColorFilter::None).is_none());
        assert!(ColorMatrix::for_filter(ColorFilter::Retro).is_some());
    }
}
