//! Adaptive quality: watches the frame rate and trades effects for headroom.
//!
//! Frames are counted in one-second windows; the last 60 window rates form a
//! rolling average. Every five seconds the average is compared with the
//! floor and the level moves by at most one step.

use std::collections::VecDeque;

use crate::configuration::INTENSITY_MAX;
use crate::state::SharedState;

pub const MAX_LEVEL: u8 = 3;
pub const SAMPLE_WINDOW_MS: f64 = 1_000.0;
pub const MAX_SAMPLES: usize = 60;
pub const EVALUATION_INTERVAL_MS: f64 = 5_000.0;
pub const FPS_FLOOR: f32 = 30.0;
/// Extra frame rate above the floor required before stepping back up.
pub const UPGRADE_HEADROOM: f32 = 10.0;

/// What a level turns on and how hard it caps intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityPreset {
    pub mist: bool,
    pub puddles: bool,
    pub lighting: bool,
    pub intensity_ceiling: f32,
}

impl QualityPreset {
    pub fn for_level(level: u8) -> Self {
        match level {
            0 => QualityPreset { mist: false, puddles: false, lighting: false, intensity_ceiling: 0.5 },
            1 => QualityPreset { mist: true, puddles: false, lighting: false, intensity_ceiling: 1.0 },
            2 => QualityPreset { mist: true, puddles: false, lighting: true, intensity_ceiling: 2.0 },
            _ => QualityPreset { mist: true, puddles: true, lighting: true, intensity_ceiling: INTENSITY_MAX },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityChange {
    pub from: u8,
    pub to: u8,
}

pub struct QualityController {
    shared: SharedState,
    level: u8,
    samples: VecDeque<f32>,
    window_start: Option<f64>,
    window_frames: u32,
    last_evaluation: Option<f64>,
}

impl QualityController {
    pub fn new(shared: SharedState) -> Self {
        Self {
            shared,
            level: MAX_LEVEL,
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            window_start: None,
            window_frames: 0,
            last_evaluation: None,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn average_fps(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    /// Forgets the sample history, e.g. after the frame loop was paused.
    /// The level stays where it is.
    pub fn reset_samples(&mut self) {
        self.samples.clear();
        self.window_start = None;
        self.window_frames = 0;
        self.last_evaluation = None;
    }

    /// Called once per presented frame.
    pub fn record_frame(&mut self, now_ms: f64) -> Option<QualityChange> {
        let start = match self.window_start {
            Some(start) => start,
            None => {
                self.window_start = Some(now_ms);
                self.last_evaluation.get_or_insert(now_ms);
                return None;
            }
        };

        self.window_frames += 1;
        let elapsed = now_ms - start;
        if elapsed >= SAMPLE_WINDOW_MS {
            let fps = (self.window_frames as f64 * 1000.0 / elapsed) as f32;
            if self.samples.len() == MAX_SAMPLES {
                self.samples.pop_front();
            }
            self.samples.push_back(fps);
            self.window_start = Some(now_ms);
            self.window_frames = 0;
        }

        let due = self
            .last_evaluation
            .map_or(true, |last| now_ms - last >= EVALUATION_INTERVAL_MS);
        if !due {
            return None;
        }
        self.last_evaluation = Some(now_ms);
        self.evaluate()
    }

    fn evaluate(&mut self) -> Option<QualityChange> {
        if !self.shared.borrow().settings.adaptive_quality {
            return None;
        }
        let average = self.average_fps()?;

        let from = self.level;
        if average < FPS_FLOOR && self.level > 0 {
            self.level -= 1;
        } else if average > FPS_FLOOR + UPGRADE_HEADROOM && self.level < MAX_LEVEL {
            self.level += 1;
        } else {
            return None;
        }

        self.apply_preset();
        log::info!("Quality level {} -> {} (average {:.1} fps)", from, self.level, average);
        Some(QualityChange { from, to: self.level })
    }

    /// Writes the current level's toggles and ceiling into the shared settings.
    fn apply_preset(&self) {
        let preset = QualityPreset::for_level(self.level);
        let mut state = self.shared.borrow_mut();
        state.settings.enable_mist = preset.mist;
        state.settings.enable_puddles = preset.puddles;
        state.settings.enable_lighting = preset.lighting;
        state.settings.intensity_ceiling = preset.intensity_ceiling;
    }
}
