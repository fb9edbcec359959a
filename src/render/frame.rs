use std::path::Path;

use anyhow::Context;
use image::imageops::FilterType;

use crate::{
    cache::key::{Fingerprint, KeyBuilder},
    foundation::core::Rgba8,
    foundation::error::{AnimError, AnimResult},
    render::composite::{PremulRgba8, flatten_to_opaque_rgba8, over, unpremultiply},
};

/// A rendered panel or frame as RGBA8 pixels.
///
/// Pixel data is always **premultiplied alpha**, tightly packed and row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRGBA {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Premultiplied RGBA8 bytes.
    pub data: Vec<u8>,
    /// Ground metres covered by one pixel, when the image is a map.
    pub scale_m: Option<f64>,
}

impl FrameRGBA {
    pub fn transparent(width: u32, height: u32) -> Self {
        Self::filled(width, height, Rgba8::TRANSPARENT)
    }

    pub fn filled(width: u32, height: u32, color: Rgba8) -> Self {
        let px = color.to_premul();
        let n = width as usize * height as usize;
        let mut data = Vec::with_capacity(n * 4);
        for _ in 0..n {
            data.extend_from_slice(&px);
        }
        Self {
            width,
            height,
            data,
            scale_m: None,
        }
    }

    pub fn from_premul(width: u32, height: u32, data: Vec<u8>) -> AnimResult<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return Err(AnimError::render(format!(
                "rgba buffer of {} bytes does not match {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            scale_m: None,
        })
    }

    pub fn with_scale(mut self, scale_m: Option<f64>) -> Self {
        self.scale_m = scale_m;
        self
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<PremulRgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.data.chunks_exact(4).all(|px| px[3] == 0)
    }

    pub fn content_fingerprint(&self) -> Fingerprint {
        let mut kb = KeyBuilder::new("frame_content");
        kb.u64(u64::from(self.width))
            .u64(u64::from(self.height))
            .f64(self.scale_m.unwrap_or(f64::NAN))
            .bytes(&self.data);
        kb.finish()
    }

    /// Composite `src` over this frame with its top-left corner at `(x, y)`. Pixels falling
    /// outside this frame are clipped.
    pub fn draw_over(&mut self, src: &FrameRGBA, x: i64, y: i64, opacity: f32) {
        let dst_w = i64::from(self.width);
        let dst_h = i64::from(self.height);
        for sy in 0..i64::from(src.height) {
            let dy = y + sy;
            if dy < 0 || dy >= dst_h {
                continue;
            }
            for sx in 0..i64::from(src.width) {
                let dx = x + sx;
                if dx < 0 || dx >= dst_w {
                    continue;
                }
                let si = ((sy * i64::from(src.width) + sx) * 4) as usize;
                let di = ((dy * dst_w + dx) * 4) as usize;
                let s = [
                    src.data[si],
                    src.data[si + 1],
                    src.data[si + 2],
                    src.data[si + 3],
                ];
                let d = [
                    self.data[di],
                    self.data[di + 1],
                    self.data[di + 2],
                    self.data[di + 3],
                ];
                self.data[di..di + 4].copy_from_slice(&over(d, s, opacity));
            }
        }
    }

    /// Scale to the largest size fitting `max_w`x`max_h` with the aspect ratio preserved.
    /// The map scale is adjusted to the new pixel size.
    pub fn fit_within(&self, max_w: u32, max_h: u32) -> FrameRGBA {
        if max_w == 0 || max_h == 0 || self.width == 0 || self.height == 0 {
            return FrameRGBA::transparent(max_w.max(1), max_h.max(1));
        }
        let ratio = (f64::from(max_w) / f64::from(self.width))
            .min(f64::from(max_h) / f64::from(self.height));
        let w = ((f64::from(self.width) * ratio).round() as u32).clamp(1, max_w);
        let h = ((f64::from(self.height) * ratio).round() as u32).clamp(1, max_h);
        self.resized(w, h)
    }

    /// Resample to exactly `width`x`height`. Upscaling uses nearest neighbour so categorical
    /// map pixels stay crisp.
    pub fn resized(&self, width: u32, height: u32) -> FrameRGBA {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let filter = if width >= self.width && height >= self.height {
            FilterType::Nearest
        } else {
            FilterType::Triangle
        };
        let data = match image::RgbaImage::from_raw(self.width, self.height, self.data.clone()) {
            Some(img) => image::imageops::resize(&img, width, height, filter).into_raw(),
            None => return FrameRGBA::transparent(width, height),
        };
        let scale_m = self
            .scale_m
            .map(|s| s * f64::from(self.width) / f64::from(width));
        FrameRGBA {
            width,
            height,
            data,
            scale_m,
        }
    }

    /// Opaque straight-alpha RGBA8 over `background`.
    pub fn flatten(&self, background: Rgba8) -> AnimResult<Vec<u8>> {
        flatten_to_opaque_rgba8(&self.data, background.to_premul())
    }

    /// Straight-alpha image, preserving transparency.
    pub fn to_rgba_image(&self) -> AnimResult<image::RgbaImage> {
        let mut straight = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(4) {
            straight.extend_from_slice(&unpremultiply([px[0], px[1], px[2], px[3]]));
        }
        image::RgbaImage::from_raw(self.width, self.height, straight)
            .ok_or_else(|| AnimError::render("frame buffer does not match its dimensions"))
    }

    pub fn save_png(&self, path: &Path) -> AnimResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir '{}'", parent.display()))?;
        }
        let img = self.to_rgba_image()?;
        img.save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_png(path: &Path) -> AnimResult<FrameRGBA> {
        let img = image::open(path)
            .with_context(|| format!("read png '{}'", path.display()))?
            .to_rgba8();
        let (width, height) = img.dimensions();
        let mut data = img.into_raw();
        for px in data.chunks_exact_mut(4) {
            let premul = Rgba8::new(px[0], px[1], px[2], px[3]).to_premul();
            px.copy_from_slice(&premul);
        }
        FrameRGBA::from_premul(width, height, data)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/frame.rs"]
mod tests;
