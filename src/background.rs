//! Background sources the renderer samples behind the rain.
//!
//! The renderer only needs three things from a source: the frame currently
//! on display, a version number that changes when that frame changes, and
//! whether the source ever changes at all.

use noise::{Fbm, NoiseFn, Perlin};

use crate::configuration::BackgroundConfig;
use crate::texture::RgbaImage;

/// Resolution of the procedural backdrop. The sampler scales it to the surface.
pub const BACKDROP_SIZE: (u32, u32) = (192, 108);

pub trait BackgroundSource {
    /// Brings the source up to `now_ms` and returns the frame to show, if one is decoded.
    fn current_frame(&mut self, now_ms: f64) -> Option<&RgbaImage>;

    /// Bumps whenever `current_frame` would return different pixels.
    fn content_version(&self) -> u64;

    /// A static source never changes after its first frame.
    fn is_static(&self) -> bool;
}

/// A single image.
pub struct StaticBackground {
    image: RgbaImage,
}

impl StaticBackground {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }
}

impl BackgroundSource for StaticBackground {
    fn current_frame(&mut self, _now_ms: f64) -> Option<&RgbaImage> {
        Some(&self.image)
    }

    fn content_version(&self) -> u64 {
        1
    }

    fn is_static(&self) -> bool {
        true
    }
}

/// Looping forest scene rendered from noise at a fixed presentation rate,
/// so it behaves like a video: a new frame only when presentation time moves.
pub struct AnimatedBackdrop {
    fbm: Fbm<Perlin>,
    frame_rate: f32,
    start_ms: Option<f64>,
    /// Presentation index of the frame in `image`.
    presented: Option<u64>,
    version: u64,
    image: RgbaImage,
    /// Trunk coverage per column, fixed for the lifetime of the source.
    trunks: Vec<f32>,
}

impl AnimatedBackdrop {
    pub fn new(seed: u32, frame_rate: f32) -> Self {
        let fbm: Fbm<Perlin> = Fbm::new(seed);
        let (width, height) = BACKDROP_SIZE;
        let trunks = (0..width)
            .map(|x| {
                let n = fbm.get([x as f64 / width as f64 * 24.0, 0.37]) as f32;
                ((n - 0.25) * 4.0).clamp(0.0, 1.0)
            })
            .collect();

        Self {
            fbm,
            frame_rate: frame_rate.max(0.1),
            start_ms: None,
            presented: None,
            version: 0,
            image: RgbaImage::new(width, height),
            trunks,
        }
    }

    fn presentation_index(&mut self, now_ms: f64) -> u64 {
        let start = *self.start_ms.get_or_insert(now_ms);
        let elapsed_s = ((now_ms - start) / 1000.0).max(0.0);
        (elapsed_s * self.frame_rate as f64).floor() as u64
    }

    fn render(&mut self, index: u64) {
        let t = index as f64 / self.frame_rate as f64;
        let (width, height) = BACKDROP_SIZE;
        let sway = (t * 0.5).sin() * 0.05;

        for y in 0..height {
            let v = y as f64 / height as f64;
            for x in 0..width {
                let u = x as f64 / width as f64;

                // dim sky between the trees
                let mut rgb = [
                    18.0 + 22.0 * v,
                    32.0 + 26.0 * v,
                    28.0 + 20.0 * v,
                ];

                let trunk = self.trunks[x as usize] as f64 * (0.4 + 0.6 * v);
                rgb = mix(rgb, [28.0, 22.0, 18.0], trunk);

                if v < 0.5 {
                    let leaves = self.fbm.get([u * 6.0 + sway, v * 6.0]);
                    if leaves > -0.1 {
                        let shade = 0.6 + 0.4 * leaves.clamp(-1.0, 1.0);
                        let cover = ((0.5 - v) * 4.0).clamp(0.0, 1.0);
                        rgb = mix(rgb, [30.0 * shade, 70.0 * shade, 40.0 * shade], cover);
                    }
                }

                let fog = self.fbm.get([u * 3.0 + t * 0.03, v * 3.0 + 10.0]) * 0.5 + 0.5;
                rgb = mix(rgb, [120.0, 135.0, 130.0], (0.15 + 0.2 * fog) * v);

                self.image.set_pixel(x, y, [
                    rgb[0].clamp(0.0, 255.0) as u8,
                    rgb[1].clamp(0.0, 255.0) as u8,
                    rgb[2].clamp(0.0, 255.0) as u8,
                    255,
                ]);
            }
        }
    }
}

fn mix(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    let t = t.clamp(0.0, 1.0);
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t, a[2] + (b[2] - a[2]) * t]
}

impl BackgroundSource for AnimatedBackdrop {
    fn current_frame(&mut self, now_ms: f64) -> Option<&RgbaImage> {
        let index = self.presentation_index(now_ms);
        if self.presented != Some(index) {
            self.render(index);
            self.presented = Some(index);
            self.version += 1;
        }
        Some(&self.image)
    }

    fn content_version(&self) -> u64 {
        self.version
    }

    fn is_static(&self) -> bool {
        false
    }
}

/// Builds the configured source. `None` means the renderer shows its placeholder.
pub fn from_config(config: &BackgroundConfig) -> Option<Box<dyn BackgroundSource>> {
    match config {
        BackgroundConfig::Animated { seed, frame_rate } => Some(Box::new(AnimatedBackdrop::new(*seed, *frame_rate))),
        BackgroundConfig::Solid { color } => Some(Box::new(StaticBackground::new(RgbaImage::solid(
            1,
            1,
            [color[0], color[1], color[2], 255],
        )))),
        BackgroundConfig::None => None,
    }
}
