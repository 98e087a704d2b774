//! The shared effect context handed to every component.
//!
//! All components run on one thread between scheduler dispatches, so a plain
//! `Rc<RefCell<_>>` is enough. The owner of a field writes it and the rest
//! read it, with one sanctioned exception: the quality controller writes the
//! feature toggles and `intensity_ceiling` in `settings`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::configuration::Settings;
use crate::presets::WeatherPhase;
use crate::time_system::TimeOfDay;

pub type SharedState = Rc<RefCell<EffectState>>;

#[derive(Debug, Clone, Default)]
pub struct EffectState {
    pub settings: Settings,
    /// What the dynamic engine last committed; `None` while it is stopped.
    pub weather: Option<WeatherSnapshot>,
    /// Lightning overlay, read by the renderer every frame.
    pub flash: FlashState,
    notices: Vec<Notice>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherSnapshot {
    pub phase: WeatherPhase,
    pub time_of_day: TimeOfDay,
    /// Rain intensity scaled by the time-of-day light modifier.
    pub light_level: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlashState {
    /// 0 is transparent.
    pub alpha: f32,
}

/// Lightning overlay tint, light blue.
pub const FLASH_COLOR: [f32; 3] = [173.0 / 255.0, 216.0 / 255.0, 230.0 / 255.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Short user-facing message. Never a raw error dump.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl EffectState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn shared(settings: Settings) -> SharedState {
        Rc::new(RefCell::new(Self::new(settings)))
    }

    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push(Notice { level, message: message.into() });
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn render_parameters(&self) -> RenderParameters {
        RenderParameters::from_settings(&self.settings)
    }
}

/// Parameter vector the engine derives each tick and the renderer consumes each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParameters {
    pub intensity: f32,
    pub scale: f32,
    pub speed: f32,
    pub angle: f32,
    pub volume: f32,
    pub mist: f32,
}

impl RenderParameters {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            intensity: settings.rain_intensity,
            scale: settings.rain_scale,
            speed: settings.rain_speed,
            angle: settings.rain_angle,
            volume: settings.rain_volume,
            mist: settings.mist_intensity,
        }
    }

    /// Writes every field back into the settings in one go.
    pub fn apply_to(&self, settings: &mut Settings) {
        settings.rain_intensity = self.intensity;
        settings.rain_scale = self.scale;
        settings.rain_speed = self.speed;
        settings.rain_angle = self.angle;
        settings.rain_volume = self.volume;
        settings.mist_intensity = self.mist;
    }

    pub fn is_finite(&self) -> bool {
        [self.intensity, self.scale, self.speed, self.angle, self.volume, self.mist]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_round_trip_through_settings() {
        let mut settings = Settings::default();
        let params = RenderParameters { intensity: 0.9, scale: 1.1, speed: 1.4, angle: -12.0, volume: 75.0, mist: 0.8 };
        params.apply_to(&mut settings);
        assert_eq!(RenderParameters::from_settings(&settings), params);
    }

    #[test]
    fn notices_drain() {
        let mut state = EffectState::new(Settings::default());
        state.notify(NoticeLevel::Error, "graphics unavailable");
        assert_eq!(state.take_notices().len(), 1);
        assert!(state.take_notices().is_empty());
    }

    #[test]
    fn non_finite_parameters_are_detected() {
        let mut params = RenderParameters::from_settings(&Settings::default());
        assert!(params.is_finite());
        params.angle = f32::INFINITY;
        assert!(!params.is_finite());
    }
}
