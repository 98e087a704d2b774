//! Uniform block for the rain shader and the pure mapping that fills it.
//!
//! Field order and padding mirror `RainUniforms` in `rain.wgsl`; every
//! vec4 lands on a 16 byte boundary.

use crate::configuration::{Settings, MAX_LIGHTS};
use crate::state::{EffectState, FlashState, RenderParameters, WeatherSnapshot, FLASH_COLOR};

/// Rain tint when no weather phase is driving the colour.
pub const DEFAULT_RAIN_COLOR: [f32; 3] = [0.2, 0.3, 1.0];
/// Mask values above this become puddles.
pub const PUDDLE_THRESHOLD: f32 = 0.55;
pub const PUDDLE_REFLECTIVITY: f32 = 0.6;
/// Ripple displacement in UV units.
pub const RIPPLE_STRENGTH: f32 = 0.012;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RainUniforms {
    pub resolution: [f32; 2],
    /// Seconds since the session started.
    pub time: f32,
    pub intensity: f32,
    pub scale: f32,
    /// Radians.
    pub angle: f32,
    pub speed: f32,
    pub mist: f32,
    pub rain_color: [f32; 4],
    /// rgb + alpha of the lightning overlay.
    pub flash: [f32; 4],
    /// puddles on, lighting on, light count, unused.
    pub flags: [u32; 4],
    /// threshold, reflectivity, ripple strength, unused.
    pub puddle: [f32; 4],
    /// xy in pixels, radius in pixels, unused.
    pub light_pos: [[f32; 4]; MAX_LIGHTS],
    /// rgb, intensity.
    pub light_color: [[f32; 4]; MAX_LIGHTS],
}

impl RainUniforms {
    pub fn build(
        params: &RenderParameters,
        settings: &Settings,
        weather: Option<&WeatherSnapshot>,
        flash: FlashState,
        time_s: f32,
        resolution: (u32, u32),
    ) -> Self {
        let color = weather
            .map(|w| w.time_of_day.config().color)
            .unwrap_or(DEFAULT_RAIN_COLOR);

        let mut uniforms = RainUniforms {
            resolution: [resolution.0.max(1) as f32, resolution.1.max(1) as f32],
            time: time_s,
            intensity: params.intensity.min(settings.intensity_ceiling).max(0.0),
            scale: params.scale,
            angle: params.angle.to_radians(),
            speed: params.speed,
            mist: if settings.enable_mist { params.mist } else { 0.0 },
            rain_color: [color[0], color[1], color[2], 1.0],
            flash: [FLASH_COLOR[0], FLASH_COLOR[1], FLASH_COLOR[2], flash.alpha.clamp(0.0, 1.0)],
            flags: [settings.enable_puddles as u32, settings.enable_lighting as u32, 0, 0],
            puddle: [PUDDLE_THRESHOLD, PUDDLE_REFLECTIVITY, RIPPLE_STRENGTH, 0.0],
            ..<RainUniforms as bytemuck::Zeroable>::zeroed()
        };

        if settings.enable_lighting {
            let lights = settings.lights.iter().take(MAX_LIGHTS);
            for (i, light) in lights.enumerate() {
                uniforms.light_pos[i] = [light.position.x, light.position.y, light.radius, 0.0];
                uniforms.light_color[i] = [light.color.x, light.color.y, light.color.z, light.intensity];
                uniforms.flags[2] += 1;
            }
        }

        uniforms
    }

    /// Reads everything it needs straight out of the shared state.
    pub fn from_state(state: &EffectState, time_s: f32, resolution: (u32, u32)) -> Self {
        Self::build(
            &state.render_parameters(),
            &state.settings,
            state.weather.as_ref(),
            state.flash,
            time_s,
            resolution,
        )
    }

    pub fn light_count(&self) -> usize {
        self.flags[2] as usize
    }
}
