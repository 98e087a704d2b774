use noise::{Fbm, NoiseFn, Perlin};

use crate::utils::ease_clamped;

/// Side of the square puddle mask, independent of the surface size.
pub const PUDDLE_MASK_SIZE: u32 = 256;
/// The reflection copy is this many times smaller than the background.
pub const REFLECTION_DOWNSAMPLE: u32 = 4;
pub const REFLECTION_BLUR_RADIUS: u32 = 2;

/// Tightly packed RGBA8 pixels, row major, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbaImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width * height * 4) as usize],
        }
    }

    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&color);
        }
        Self { width, height, data }
    }

    /// 1x1 magenta, bound whenever no background is available.
    pub fn placeholder() -> Self {
        Self::solid(1, 1, [255, 0, 255, 255])
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let i = ((y * self.width + x) * 4) as usize;
        self.data[i..i + 4].copy_from_slice(&color);
    }
}

/// Precomputed puddle mask. The red channel carries the mask value.
///
/// Fractal noise decides where water pools; a vertical ramp keeps the pools in
/// the lower half of the screen.
pub fn puddle_mask(size: u32, seed: u32) -> RgbaImage {
    let fbm: Fbm<Perlin> = Fbm::new(seed);
    let mut image = RgbaImage::new(size, size);

    for y in 0..size {
        let v = y as f32 / size.max(1) as f32;
        let ground = ease_clamped((v - 0.5) / 0.5);
        for x in 0..size {
            let nx = x as f64 / size as f64 * 4.0;
            let ny = y as f64 / size as f64 * 4.0;
            let n = (fbm.get([nx, ny]) as f32 * 0.5 + 0.5).clamp(0.0, 1.0);
            let value = n * (0.35 + 0.65 * ground);
            let byte = (value * 255.0).round() as u8;
            image.set_pixel(x, y, [byte, byte, byte, 255]);
        }
    }
    image
}

/// Shrinks `src` by `factor` and box-blurs the result. Feeds the puddle reflections.
pub fn blur_downsample(src: &RgbaImage, factor: u32, radius: u32) -> RgbaImage {
    if src.is_empty() {
        return RgbaImage::placeholder();
    }
    let factor = factor.max(1);
    let width = (src.width / factor).max(1);
    let height = (src.height / factor).max(1);

    // average each factor x factor block
    let mut small = RgbaImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut sum = [0u32; 4];
            let mut count = 0u32;
            for sy in y * factor..((y + 1) * factor).min(src.height) {
                for sx in x * factor..((x + 1) * factor).min(src.width) {
                    let p = src.pixel(sx, sy);
                    for c in 0..4 {
                        sum[c] += p[c] as u32;
                    }
                    count += 1;
                }
            }
            let count = count.max(1);
            small.set_pixel(x, y, [
                (sum[0] / count) as u8,
                (sum[1] / count) as u8,
                (sum[2] / count) as u8,
                (sum[3] / count) as u8,
            ]);
        }
    }

    if radius == 0 {
        return small;
    }
    box_blur(&small, radius)
}

fn box_blur(src: &RgbaImage, radius: u32) -> RgbaImage {
    let r = radius as i64;
    let mut out = RgbaImage::new(src.width, src.height);
    for y in 0..src.height as i64 {
        for x in 0..src.width as i64 {
            let mut sum = [0u32; 4];
            let mut count = 0u32;
            for dy in -r..=r {
                for dx in -r..=r {
                    let sx = (x + dx).clamp(0, src.width as i64 - 1) as u32;
                    let sy = (y + dy).clamp(0, src.height as i64 - 1) as u32;
                    let p = src.pixel(sx, sy);
                    for c in 0..4 {
                        sum[c] += p[c] as u32;
                    }
                    count += 1;
                }
            }
            out.set_pixel(x as u32, y as u32, [
                (sum[0] / count) as u8,
                (sum[1] / count) as u8,
                (sum[2] / count) as u8,
                (sum[3] / count) as u8,
            ]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_opaque_magenta() {
        let p = RgbaImage::placeholder();
        assert_eq!((p.width, p.height), (1, 1));
        assert_eq!(p.pixel(0, 0), [255, 0, 255, 255]);
    }

    #[test]
    fn puddles_stay_out_of_the_sky() {
        let mask = puddle_mask(64, 3);
        let threshold = (crate::uniforms::PUDDLE_THRESHOLD * 255.0) as u8;
        for y in 0..32 {
            for x in 0..64 {
                assert!(mask.pixel(x, y)[0] < threshold, "puddle at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn mask_is_deterministic_per_seed() {
        assert_eq!(puddle_mask(16, 9), puddle_mask(16, 9));
    }

    #[test]
    fn downsample_averages_blocks() {
        let mut img = RgbaImage::solid(4, 4, [0, 0, 0, 255]);
        img.set_pixel(0, 0, [200, 100, 40, 255]);
        let small = blur_downsample(&img, 2, 0);
        assert_eq!((small.width, small.height), (2, 2));
        assert_eq!(small.pixel(0, 0), [50, 25, 10, 255]);
        assert_eq!(small.pixel(1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn blur_keeps_solid_colour() {
        let img = RgbaImage::solid(8, 6, [10, 20, 30, 255]);
        let out = blur_downsample(&img, 2, 1);
        assert_eq!((out.width, out.height), (4, 3));
        assert!(out.data.chunks(4).all(|p| p == [10, 20, 30, 255]));
    }
}
