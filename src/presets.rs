//! Static parameter tables: weather phases, the phase transition table and
//! the user-selectable rain presets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six weather intensity states the dynamic engine cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherPhase {
    Drizzle,
    LightRain,
    HeavyRain,
    Downpour,
    Thunderstorm,
    Clearing,
}

/// Target parameter vector for a phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseConfig {
    pub intensity: f32,
    pub scale: f32,
    pub speed: f32,
    pub volume: f32,
    pub mist: f32,
    /// Chance per thunder roll while this phase is active.
    pub thunder: f32,
    /// Degrees of wind drift allowed when this phase comes in.
    pub angle_variation: f32,
}

const DRIZZLE: PhaseConfig = PhaseConfig { intensity: 0.15, scale: 1.8, speed: 0.3, volume: 30.0, mist: 0.4, thunder: 0.01, angle_variation: 5.0 };
const LIGHT_RAIN: PhaseConfig = PhaseConfig { intensity: 0.35, scale: 1.4, speed: 0.5, volume: 45.0, mist: 0.55, thunder: 0.03, angle_variation: 7.0 };
const HEAVY_RAIN: PhaseConfig = PhaseConfig { intensity: 0.65, scale: 1.1, speed: 0.9, volume: 60.0, mist: 0.7, thunder: 0.07, angle_variation: 10.0 };
const DOWNPOUR: PhaseConfig = PhaseConfig { intensity: 0.95, scale: 0.9, speed: 1.4, volume: 75.0, mist: 0.9, thunder: 0.12, angle_variation: 12.0 };
const THUNDERSTORM: PhaseConfig = PhaseConfig { intensity: 0.85, scale: 1.0, speed: 1.7, volume: 85.0, mist: 0.95, thunder: 0.25, angle_variation: 15.0 };
const CLEARING: PhaseConfig = PhaseConfig { intensity: 0.1, scale: 2.2, speed: 0.2, volume: 15.0, mist: 0.25, thunder: 0.001, angle_variation: 3.0 };

impl WeatherPhase {
    pub const ALL: [WeatherPhase; 6] = [
        WeatherPhase::Drizzle,
        WeatherPhase::LightRain,
        WeatherPhase::HeavyRain,
        WeatherPhase::Downpour,
        WeatherPhase::Thunderstorm,
        WeatherPhase::Clearing,
    ];

    pub fn config(self) -> &'static PhaseConfig {
        match self {
            WeatherPhase::Drizzle => &DRIZZLE,
            WeatherPhase::LightRain => &LIGHT_RAIN,
            WeatherPhase::HeavyRain => &HEAVY_RAIN,
            WeatherPhase::Downpour => &DOWNPOUR,
            WeatherPhase::Thunderstorm => &THUNDERSTORM,
            WeatherPhase::Clearing => &CLEARING,
        }
    }

    /// Picks the phase that follows `self` for a uniform roll in [0, 1).
    ///
    /// Thresholds are cumulative and order dependent. `storm + 0.6` can pass
    /// 1.0 in the afternoon, which leaves CLEARING unreachable from LIGHT_RAIN
    /// at those hours; that bias is kept as is.
    pub fn next(self, roll: f64, hour: u32) -> WeatherPhase {
        let storm = storm_chance(hour);
        let clearing = clearing_chance(hour);

        match self {
            WeatherPhase::Drizzle => {
                if roll < 0.6 { WeatherPhase::LightRain } else { WeatherPhase::Clearing }
            }
            WeatherPhase::LightRain => {
                if roll < 0.3 {
                    WeatherPhase::Drizzle
                } else if roll < 0.6 {
                    WeatherPhase::HeavyRain
                } else if roll < storm + 0.6 {
                    WeatherPhase::Thunderstorm
                } else {
                    WeatherPhase::Clearing
                }
            }
            WeatherPhase::HeavyRain => {
                if roll < 0.2 {
                    WeatherPhase::LightRain
                } else if roll < 0.5 {
                    WeatherPhase::Downpour
                } else if roll < storm + 0.5 {
                    WeatherPhase::Thunderstorm
                } else {
                    WeatherPhase::Clearing
                }
            }
            WeatherPhase::Downpour => {
                if roll < 0.3 {
                    WeatherPhase::HeavyRain
                } else if roll < storm + 0.3 {
                    WeatherPhase::Thunderstorm
                } else {
                    WeatherPhase::Clearing
                }
            }
            WeatherPhase::Thunderstorm => {
                if roll < 0.7 { WeatherPhase::HeavyRain } else { WeatherPhase::Clearing }
            }
            WeatherPhase::Clearing => {
                if roll < clearing { WeatherPhase::Drizzle } else { WeatherPhase::LightRain }
            }
        }
    }
}

impl fmt::Display for WeatherPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            WeatherPhase::Drizzle => "DRIZZLE",
            WeatherPhase::LightRain => "LIGHT_RAIN",
            WeatherPhase::HeavyRain => "HEAVY_RAIN",
            WeatherPhase::Downpour => "DOWNPOUR",
            WeatherPhase::Thunderstorm => "THUNDERSTORM",
            WeatherPhase::Clearing => "CLEARING",
        };
        f.write_str(name)
    }
}

/// Storm weight: afternoons (12:00-18:59) are stormier.
pub fn storm_chance(hour: u32) -> f64 {
    if (12..=18).contains(&hour) { 0.4 } else { 0.2 }
}

/// Clearing weight: nights (21:00-06:59) clear up more often.
pub fn clearing_chance(hour: u32) -> f64 {
    if hour >= 21 || hour <= 6 { 0.5 } else { 0.2 }
}

/// Ambient rain loop flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RainSound {
    Soft,
    Heavy,
    Downpour,
}

/// User-selectable rain presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RainPreset {
    Normal,
    Slow,
    Heavy,
    Downpour,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresetConfig {
    pub volume: f32,
    pub intensity: f32,
    pub scale: f32,
    pub angle: f32,
    pub speed: f32,
    pub thunder_rarity: f32,
    pub sound: RainSound,
    pub mist_intensity: f32,
}

impl RainPreset {
    pub fn config(self) -> PresetConfig {
        match self {
            RainPreset::Normal => PresetConfig {
                volume: 70.0,
                intensity: 0.5,
                scale: 1.2,
                angle: -3.0,
                speed: 0.5,
                thunder_rarity: 0.05,
                sound: RainSound::Soft,
                mist_intensity: 0.7,
            },
            RainPreset::Slow => PresetConfig {
                volume: 56.0,
                intensity: 0.14,
                scale: 2.0,
                angle: 0.0,
                speed: 0.4,
                thunder_rarity: 0.02,
                sound: RainSound::Soft,
                mist_intensity: 0.4,
            },
            RainPreset::Heavy => PresetConfig {
                volume: 56.0,
                intensity: 0.28,
                scale: 1.0,
                angle: 7.5,
                speed: 1.2,
                thunder_rarity: 0.1,
                sound: RainSound::Heavy,
                mist_intensity: 0.85,
            },
            RainPreset::Downpour => PresetConfig {
                volume: 70.0,
                intensity: 0.91,
                scale: 1.4,
                angle: 15.0,
                speed: 1.7,
                thunder_rarity: 0.15,
                sound: RainSound::Downpour,
                mist_intensity: 1.0,
            },
        }
    }
}

impl Default for RainPreset {
    fn default() -> Self {
        RainPreset::Heavy
    }
}
