//! Software drawing surface.
//!
//! A [`Surface`] is an RGBA8 image plus a current colour filter. Drawing
//! calls blend with straight (non-premultiplied) alpha.

use image::{Rgba, RgbaImage};

use crate::color::ColorMatrix;

/// Axis-aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Scale around the centre.
    pub fn scaled(self, factor: f32) -> Self {
        let w = self.w * factor;
        let h = self.h * factor;
        Self {
            x: self.x + (self.w - w) / 2.0,
            y: self.y + (self.h - h) / 2.0,
            w,
            h,
        }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

/// Rectangle that covers `dst` with `src`'s aspect ratio, centred.
pub fn cover_rect(src: (u32, u32), dst: (u32, u32)) -> Rect {
    fit_rect(src, dst, f32::max)
}

/// Rectangle that fits inside `dst` with `src`'s aspect ratio, centred.
pub fn contain_rect(src: (u32, u32), dst: (u32, u32)) -> Rect {
    fit_rect(src, dst, f32::min)
}

fn fit_rect(src: (u32, u32), dst: (u32, u32), pick: fn(f32, f32) -> f32) -> Rect {
    let (sw, sh) = (src.0.max(1) as f32, src.1.max(1) as f32);
    let (dw, dh) = (dst.0 as f32, dst.1 as f32);
    let scale = pick(dw / sw, dh / sh);
    let (w, h) = (sw * scale, sh * scale);
    Rect::new((dw - w) / 2.0, (dh - h) / 2.0, w, h)
}

/// Per-draw options.
#[derive(Debug, Clone, Copy)]
pub struct DrawOptions {
    /// Global opacity in `[0, 1]`.
    pub alpha: f32,

    /// Corner radius of the destination rectangle in pixels.
    pub corner_radius: f32,

    /// Box-blur radius applied to the drawn layer in pixels.
    pub blur_radius: u32,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            corner_radius: 0.0,
            blur_radius: 0,
        }
    }
}

/// The composition surface.
#[derive(Debug, Clone)]
pub struct Surface {
    pixels: RgbaImage,
    filter: Option<ColorMatrix>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])),
            filter: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    /// Set the colour filter applied to subsequent image and rect draws.
    pub fn set_filter(&mut self, filter: Option<ColorMatrix>) {
        self.filter = filter;
    }

    pub fn filter(&self) -> Option<ColorMatrix> {
        self.filter
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        for px in self.pixels.pixels_mut() {
            px.0 = color;
        }
    }

    /// Fill a rectangle, blending by `color`'s alpha.
    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 4]) {
        let color = self.filtered(color);
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let a = color[3] as f32 / 255.0;
        for y in y0..y1 {
            for x in x0..x1 {
                blend(self.pixels.get_pixel_mut(x, y), color, a);
            }
        }
    }

    /// Draw `src` scaled into `dest` with bilinear sampling.
    pub fn draw_image(&mut self, src: &RgbaImage, dest: Rect, opts: DrawOptions) {
        if opts.alpha <= 0.0 || src.width() == 0 || src.height() == 0 {
            return;
        }
        if opts.blur_radius > 0 {
            self.draw_blurred(src, dest, opts);
            return;
        }
        let Some((x0, y0, x1, y1)) = self.clip(dest) else {
            return;
        };

        let sx = src.width() as f32 / dest.w;
        let sy = src.height() as f32 / dest.h;
        for y in y0..y1 {
            for x in x0..x1 {
                let (cx, cy) = (x as f32 + 0.5, y as f32 + 0.5);
                let coverage = corner_coverage(dest, opts.corner_radius, cx, cy);
                if coverage <= 0.0 {
                    continue;
                }
                let sample = sample_bilinear(src, (cx - dest.x) * sx - 0.5, (cy - dest.y) * sy - 0.5);
                let sample = self.filtered(sample);
                let a = sample[3] as f32 / 255.0 * opts.alpha.min(1.0) * coverage;
                blend(self.pixels.get_pixel_mut(x, y), sample, a);
            }
        }
    }

    fn draw_blurred(&mut self, src: &RgbaImage, dest: Rect, opts: DrawOptions) {
        // Render the layer at surface size, blur it, then composite.
        let mut layer = Surface {
            pixels: RgbaImage::new(self.width(), self.height()),
            filter: self.filter,
        };
        layer.draw_image(
            src,
            dest,
            DrawOptions {
                alpha: 1.0,
                blur_radius: 0,
                ..opts
            },
        );
        box_blur(&mut layer.pixels, opts.blur_radius);
        for (dst, src) in self.pixels.pixels_mut().zip(layer.pixels.pixels()) {
            let a = src[3] as f32 / 255.0 * opts.alpha.min(1.0);
            if a > 0.0 {
                blend(dst, src.0, a);
            }
        }
    }

    /// Blend a coverage mask (one byte per pixel) at `(left, top)` in `color`.
    pub fn blend_mask(&mut self, left: i32, top: i32, width: usize, height: usize, mask: &[u8], color: [u8; 4]) {
        let base = color[3] as f32 / 255.0;
        for row in 0..height {
            let y = top + row as i32;
            if y < 0 || y >= self.height() as i32 {
                continue;
            }
            for col in 0..width {
                let x = left + col as i32;
                if x < 0 || x >= self.width() as i32 {
                    continue;
                }
                let coverage = mask[row * width + col];
                if coverage == 0 {
                    continue;
                }
                let a = base * coverage as f32 / 255.0;
                blend(self.pixels.get_pixel_mut(x as u32, y as u32), color, a);
            }
        }
    }

    /// Darken towards the edges: transparent inside `inner` (fraction of
    /// the half-diagonal), reaching `strength` opacity at the corners.
    pub fn vignette(&mut self, inner: f32, strength: f32) {
        let (w, h) = (self.width() as f32, self.height() as f32);
        let (cx, cy) = (w / 2.0, h / 2.0);
        let max_d = (cx * cx + cy * cy).sqrt().max(1.0);
        let span = (1.0 - inner).max(f32::EPSILON);
        for (x, y, px) in self.pixels.enumerate_pixels_mut() {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let d = (dx * dx + dy * dy).sqrt() / max_d;
            let t = ((d - inner) / span).clamp(0.0, 1.0);
            if t > 0.0 {
                blend(px, [0, 0, 0, 255], t * strength);
            }
        }
    }

    fn filtered(&self, px: [u8; 4]) -> [u8; 4] {
        match &self.filter {
            Some(m) => m.apply(px),
            None => px,
        }
    }

    fn clip(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        if rect.w <= 0.0 || rect.h <= 0.0 {
            return None;
        }
        let x0 = rect.x.floor().max(0.0) as u32;
        let y0 = rect.y.floor().max(0.0) as u32;
        let x1 = ((rect.x + rect.w).ceil().max(0.0) as u32).min(self.width());
        let y1 = ((rect.y + rect.h).ceil().max(0.0) as u32).min(self.height());
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }
}

fn blend(dst: &mut Rgba<u8>, src: [u8; 4], a: f32) {
    let a = a.clamp(0.0, 1.0);
    for i in 0..3 {
        let v = src[i] as f32 * a + dst[i] as f32 * (1.0 - a);
        dst[i] = v.round() as u8;
    }
    let out_a = a * 255.0 + dst[3] as f32 * (1.0 - a);
    dst[3] = out_a.round().min(255.0) as u8;
}

/// Coverage of pixel centre `(x, y)` inside `rect` with rounded corners.
fn corner_coverage(rect: Rect, radius: f32, x: f32, y: f32) -> f32 {
    let inside_x = x >= rect.x && x <= rect.x + rect.w;
    let inside_y = y >= rect.y && y <= rect.y + rect.h;
    if !inside_x || !inside_y {
        return 0.0;
    }
    let r = radius.min(rect.w / 2.0).min(rect.h / 2.0);
    if r <= 0.0 {
        return 1.0;
    }
    let cx = x.clamp(rect.x + r, rect.x + rect.w - r);
    let cy = y.clamp(rect.y + r, rect.y + rect.h - r);
    let d = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
    // One pixel of anti-aliasing at the arc.
    (r + 0.5 - d).clamp(0.0, 1.0)
}

fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> [u8; 4] {
    let max_x = src.width() as i64 - 1;
    let max_y = src.height() as i64 - 1;
    let x = x.clamp(0.0, max_x as f32);
    let y = y.clamp(0.0, max_y as f32);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = src.get_pixel(x0 as u32, y0 as u32).0;
    let p10 = src.get_pixel(x1 as u32, y0 as u32).0;
    let p01 = src.get_pixel(x0 as u32, y1 as u32).0;
    let p11 = src.get_pixel(x1 as u32, y1 as u32).0;

    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = p00[i] as f32 * (1.0 - fx) + p10[i] as f32 * fx;
        let bottom = p01[i] as f32 * (1.0 - fx) + p11[i] as f32 * fx;
        out[i] = (top * (1.0 - fy) + bottom * fy).round() as u8;
    }
    out
}

/// Separable box blur, clamping at the edges.
pub fn box_blur(img: &mut RgbaImage, radius: u32) {
    if radius == 0 {
        return;
    }
    let (w, h) = img.dimensions();
    let r = radius as i64;
    let mut tmp = img.clone();
    for pass in 0..2 {
        let (src, dst) = if pass == 0 {
            (&*img, &mut tmp)
        } else {
            (&tmp, &mut *img)
        };
        let horizontal = pass == 0;
        let (outer, inner) = if horizontal { (h, w) } else { (w, h) };
        for o in 0..outer {
            let at = |i: i64| -> [u8; 4] {
                let i = i.clamp(0, inner as i64 - 1) as u32;
                if horizontal {
                    src.get_pixel(i, o).0
                } else {
                    src.get_pixel(o, i).0
                }
            };
            let mut sum = [0u32; 4];
            for i in -r..=r {
                let p = at(i);
                for c in 0..4 {
                    sum[c] += p[c] as u32;
                }
            }
            let n = (2 * r + 1) as u32;
            for i in 0..inner as i64 {
                let px = [
                    (sum[0] / n) as u8,
                    (sum[1] / n) as u8,
                    (sum[2] / n) as u8,
                    (sum[3] / n) as u8,
                ];
                let (x, y) = if horizontal { (i as u32, o) } else { (o, i as u32) };
                dst.put_pixel(x, y, Rgba(px));
                let add = at(i + r + 1);
                let sub = at(i - r);
                for c in 0..4 {
                    sum[c] = sum[c] + add[c] as u32 - sub[c] as u32;
                }
            }
        }
    }
}
