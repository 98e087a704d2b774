use std::cell::Cell;
use std::rc::Rc;

use chrono::{Local, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Coarse time of day, derived from the local wall-clock hour only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    Dawn,
    Morning,
    Afternoon,
    Dusk,
    Night,
}

/// Per time-of-day modifiers applied on top of the weather phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeOfDayConfig {
    pub light_mod: f32,
    pub color: [f32; 3],
    pub mist_mod: f32,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=7 => TimeOfDay::Dawn,
            8..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Dusk,
            _ => TimeOfDay::Night,
        }
    }

    pub fn config(self) -> TimeOfDayConfig {
        match self {
            TimeOfDay::Dawn => TimeOfDayConfig { light_mod: 0.7, color: [0.3, 0.2, 0.4], mist_mod: 0.9 },
            TimeOfDay::Morning => TimeOfDayConfig { light_mod: 1.0, color: [0.2, 0.3, 1.0], mist_mod: 0.7 },
            TimeOfDay::Afternoon => TimeOfDayConfig { light_mod: 1.1, color: [0.25, 0.35, 1.0], mist_mod: 0.6 },
            TimeOfDay::Dusk => TimeOfDayConfig { light_mod: 0.6, color: [0.4, 0.2, 0.3], mist_mod: 0.85 },
            TimeOfDay::Night => TimeOfDayConfig { light_mod: 0.4, color: [0.15, 0.15, 0.3], mist_mod: 1.0 },
        }
    }

    pub fn is_daytime(self) -> bool {
        matches!(self, TimeOfDay::Morning | TimeOfDay::Afternoon)
    }
}

/// Source of wall-clock time for the weather engine and the scheduler.
///
/// `now_ms` is milliseconds on a monotonic-enough wall clock (the slow
/// sine oscillations are keyed to it); `local_hour` is 0-23 in local time.
pub trait Clock {
    fn now_ms(&self) -> f64;
    fn local_hour(&self) -> u32;
}

/// Real clock backed by chrono.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        SystemClock
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        Utc::now().timestamp_millis() as f64
    }

    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// Hand-driven clock. Clones share the same time, so a test can keep one
/// handle while the host owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
    hour: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new(start_ms: f64, hour: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
            hour: Rc::new(Cell::new(hour % 24)),
        }
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set_now(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn set_hour(&self, hour: u32) {
        self.hour.set(hour % 24);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    fn local_hour(&self) -> u32 {
        self.hour.get()
    }
}
