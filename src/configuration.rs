// Settings surface for the rain effects.
//
// Holds the sliders and toggles every component reads each tick or frame,
// plus asset locations and the point lights for the lighting pass. Persisted
// as pretty JSON next to the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};

use crate::presets::RainPreset;

/// Most point lights the fragment stage accepts.
pub const MAX_LIGHTS: usize = 8;

/// Rain settings, mirrored one-to-one by the settings panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dynamic_weather: bool,
    pub preset: RainPreset,
    pub enable_thunder: bool,
    pub enable_mist: bool,
    pub enable_puddles: bool,
    pub enable_lighting: bool,
    pub mist_intensity: f32,
    /// Percent; 100 is unity gain.
    pub rain_volume: f32,
    pub rain_intensity: f32,
    pub rain_scale: f32,
    /// Degrees, positive leans right.
    pub rain_angle: f32,
    pub rain_speed: f32,
    pub show_background: bool,
    pub adaptive_quality: bool,
    pub prefer_reduced_motion: bool,
    /// Upper bound on the intensity the renderer uploads. Written by the quality controller.
    pub intensity_ceiling: f32,
    pub lights: Vec<PointLight>,
    pub background: BackgroundConfig,
    pub sounds: SoundConfig,
}

/// A point light for the lighting pass. Position is in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: Vec2,
    pub color: Vec3,
    pub radius: f32,
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackgroundConfig {
    /// Procedural animated forest backdrop.
    Animated { seed: u32, frame_rate: f32 },
    /// Solid colour, uploaded once.
    Solid { color: [u8; 3] },
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    pub directory: PathBuf,
    pub rain_soft: String,
    pub rain_heavy: String,
    pub rain_downpour: String,
    pub thunder: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let heavy = RainPreset::Heavy.config();
        Self {
            dynamic_weather: false,
            preset: RainPreset::Heavy,
            enable_thunder: true,
            enable_mist: true,
            enable_puddles: true,
            enable_lighting: true,
            mist_intensity: heavy.intensity * 0.7,
            rain_volume: heavy.volume,
            rain_intensity: heavy.intensity,
            rain_scale: heavy.scale,
            rain_angle: 0.0,
            rain_speed: 1.0,
            show_background: true,
            adaptive_quality: true,
            prefer_reduced_motion: false,
            intensity_ceiling: INTENSITY_MAX,
            lights: vec![
                PointLight {
                    position: Vec2::new(220.0, 540.0),
                    color: Vec3::new(1.0, 0.78, 0.45),
                    radius: 260.0,
                    intensity: 0.6,
                },
                PointLight {
                    position: Vec2::new(1180.0, 500.0),
                    color: Vec3::new(1.0, 0.7, 0.4),
                    radius: 220.0,
                    intensity: 0.5,
                },
            ],
            background: BackgroundConfig::default(),
            sounds: SoundConfig::default(),
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        BackgroundConfig::Animated { seed: 7, frame_rate: 12.0 }
    }
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("assets/sounds"),
            rain_soft: "rain_soft.ogg".to_string(),
            rain_heavy: "rain_heavy.ogg".to_string(),
            rain_downpour: "rain_downpour.ogg".to_string(),
            thunder: (1..=5).map(|i| format!("thunder{}.ogg", i)).collect(),
        }
    }
}

pub const INTENSITY_MAX: f32 = 5.0;

impl Settings {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("rain_intensity", self.rain_intensity, 0.0, INTENSITY_MAX)?;
        check_range("rain_scale", self.rain_scale, 0.05, 3.0)?;
        check_range("rain_speed", self.rain_speed, 0.01, 10.0)?;
        check_range("rain_angle", self.rain_angle, -180.0, 180.0)?;
        check_range("rain_volume", self.rain_volume, 0.0, 500.0)?;
        check_range("mist_intensity", self.mist_intensity, 0.0, 3.0)?;
        check_range("intensity_ceiling", self.intensity_ceiling, 0.0, INTENSITY_MAX)?;

        if self.lights.len() > MAX_LIGHTS {
            return Err(ConfigError::InvalidValue(format!(
                "at most {} lights are supported, got {}",
                MAX_LIGHTS,
                self.lights.len()
            )));
        }
        for (i, light) in self.lights.iter().enumerate() {
            if !(light.radius > 0.0) {
                return Err(ConfigError::InvalidValue(format!("light {} needs a positive radius", i)));
            }
        }

        if let BackgroundConfig::Animated { frame_rate, .. } = self.background {
            if !(frame_rate > 0.0 && frame_rate <= 60.0) {
                return Err(ConfigError::InvalidValue("background frame_rate must be in (0, 60]".to_string()));
            }
        }

        Ok(())
    }

    /// Overwrites the six sliders with the preset's values.
    pub fn apply_preset(&mut self, preset: RainPreset) {
        let config = preset.config();
        self.preset = preset;
        self.rain_volume = config.volume;
        self.rain_intensity = config.intensity;
        self.rain_scale = config.scale;
        self.rain_angle = config.angle;
        self.rain_speed = config.speed;
        self.mist_intensity = config.mist_intensity;
    }

    /// Tones motion down for users who asked for it. Returns true when anything changed.
    pub fn apply_reduced_motion(&mut self) -> bool {
        if !self.prefer_reduced_motion {
            return false;
        }
        let mut changed = false;
        if self.rain_speed > 0.5 {
            self.rain_speed = 0.5;
            changed = true;
        }
        if self.rain_intensity > 0.3 {
            self.rain_intensity = 0.3;
            changed = true;
        }
        if self.enable_thunder {
            self.enable_thunder = false;
            changed = true;
        }
        changed
    }

    /// Rain loop gain for the audio backend.
    pub fn volume_gain(&self) -> f32 {
        (self.rain_volume / 100.0).max(0.0)
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be between {} and {} (got {})",
            name, min, max, value
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid Value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Owns the on-disk settings file.
pub struct ConfigManager {
    settings: Settings,
    config_path: PathBuf,
    auto_save: bool,
}

impl ConfigManager {
    pub fn new<P: Into<PathBuf>>(config_path: P) -> Self {
        let config_path = config_path.into();
        let settings = Self::load_or_create_default(&config_path);

        Self {
            settings,
            config_path,
            auto_save: true,
        }
    }

    fn load_or_create_default(path: &Path) -> Settings {
        match Settings::load_from_file(path) {
            Ok(settings) => {
                if let Err(e) = settings.validate() {
                    log::warn!("Settings validation failed: {}, using defaults", e);
                    Settings::default()
                } else {
                    settings
                }
            }
            Err(e) => {
                log::warn!("Failed to load settings from {}: {}, using defaults", path.display(), e);
                let defaults = Settings::default();
                if let Err(save_err) = defaults.save_to_file(path) {
                    log::error!("Failed to save default settings: {}", save_err);
                }
                defaults
            }
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut candidate = self.settings.clone();
        updater(&mut candidate);
        candidate.validate()?;
        self.settings = candidate;

        if self.auto_save {
            self.save()?;
        }

        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.settings.save_to_file(&self.config_path)
    }

    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let settings = Settings::load_from_file(&self.config_path)?;
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn set_auto_save(&mut self, auto_save: bool) {
        self.auto_save = auto_save;
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.settings = Settings::default();
        if self.auto_save {
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rainglass-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_slider_is_rejected() {
        let mut settings = Settings::default();
        settings.rain_scale = 0.0;
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidValue(_))));

        let mut settings = Settings::default();
        settings.rain_intensity = f32::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn too_many_lights_is_rejected() {
        let mut settings = Settings::default();
        let light = settings.lights[0];
        settings.lights = vec![light; MAX_LIGHTS + 1];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn preset_overwrites_sliders() {
        let mut settings = Settings::default();
        settings.apply_preset(RainPreset::Downpour);
        assert_eq!(settings.preset, RainPreset::Downpour);
        assert_eq!(settings.rain_intensity, 0.91);
        assert_eq!(settings.rain_angle, 15.0);
        assert_eq!(settings.mist_intensity, 1.0);
        assert_eq!(settings.rain_volume, 70.0);
    }

    #[test]
    fn reduced_motion_caps_and_silences() {
        let mut settings = Settings::default();
        settings.apply_preset(RainPreset::Downpour);
        assert!(!settings.apply_reduced_motion());

        settings.prefer_reduced_motion = true;
        assert!(settings.apply_reduced_motion());
        assert_eq!(settings.rain_speed, 0.5);
        assert_eq!(settings.rain_intensity, 0.3);
        assert!(!settings.enable_thunder);
        assert!(!settings.apply_reduced_motion());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "rain_speed": 2.5 }"#).unwrap();
        assert_eq!(settings.rain_speed, 2.5);
        assert_eq!(settings.preset, RainPreset::Heavy);
        assert_eq!(settings.sounds.thunder.len(), 5);
    }

    #[test]
    fn manager_writes_defaults_then_persists_updates() {
        let path = temp_path("manager");
        let _ = fs::remove_file(&path);

        let mut manager = ConfigManager::new(&path);
        assert_eq!(manager.settings(), &Settings::default());
        assert!(path.exists());

        manager.update_config(|s| s.rain_volume = 120.0).unwrap();
        let reloaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(reloaded.rain_volume, 120.0);

        assert!(manager.update_config(|s| s.rain_volume = 900.0).is_err());
        assert_eq!(manager.settings().rain_volume, 120.0);

        let _ = fs::remove_file(&path);
    }
}
