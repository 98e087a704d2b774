//! Ambient rain loop, thunder claps and the lightning flash.
//!
//! Runs on its own timers, separate from the frame loop. At most one rain
//! loop plays at a time. Thunder rolls every 2-6 s while enabled.

use rand::{Rng, RngCore};

use crate::audio::{AudioOutput, PlaybackHandle, SoundId};
use crate::presets::{RainPreset, RainSound};
use crate::scheduler::{Scheduler, TimerId};
use crate::state::SharedState;

pub const THUNDER_MIN_DELAY_MS: f64 = 2_000.0;
pub const THUNDER_MAX_DELAY_MS: f64 = 6_000.0;
pub const FLASH_DURATION_MS: f64 = 100.0;

struct ActiveLoop {
    sound: RainSound,
    handle: Box<dyn PlaybackHandle>,
}

pub struct Ambience<A: AudioOutput> {
    shared: SharedState,
    audio: A,
    rng: Box<dyn RngCore>,
    rain_loop: Option<ActiveLoop>,
    thunder_timer: Option<TimerId>,
    flash_timer: Option<TimerId>,
    applied_volume: f32,
    muted: bool,
    running: bool,
}

impl<A: AudioOutput> Ambience<A> {
    pub fn new(shared: SharedState, audio: A, rng: Box<dyn RngCore>) -> Self {
        Self {
            shared,
            audio,
            rng,
            rain_loop: None,
            thunder_timer: None,
            flash_timer: None,
            applied_volume: 0.0,
            muted: false,
            running: false,
        }
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn thunder_enabled(&self) -> bool {
        self.thunder_timer.is_some()
    }

    pub fn current_loop(&self) -> Option<RainSound> {
        self.rain_loop.as_ref().map(|l| l.sound)
    }

    /// Starts (or restarts) the loop for `preset` and arms thunder if enabled.
    pub fn start(&mut self, preset: RainPreset, sched: &mut Scheduler) {
        self.running = true;
        self.play_loop(preset.config().sound);
        self.sync(sched);
    }

    pub fn stop(&mut self, sched: &mut Scheduler) {
        self.stop_loop();
        self.disable_thunder(sched);
        if let Some(id) = self.flash_timer.take() {
            sched.clear_timer(id);
        }
        self.shared.borrow_mut().flash.alpha = 0.0;
        self.running = false;
    }

    fn gain(&self) -> f32 {
        if self.muted {
            return 0.0;
        }
        self.shared.borrow().settings.volume_gain()
    }

    fn play_loop(&mut self, sound: RainSound) {
        self.stop_loop();
        let gain = self.gain();
        self.applied_volume = self.shared.borrow().settings.rain_volume;
        match self.audio.play_loop(SoundId::Rain(sound), gain) {
            Ok(handle) => {
                log::info!("Rain loop {:?} playing", sound);
                self.rain_loop = Some(ActiveLoop { sound, handle });
            }
            Err(e) => log::warn!("Rain loop {:?} unavailable: {}", sound, e),
        }
    }

    fn stop_loop(&mut self) {
        if let Some(mut active) = self.rain_loop.take() {
            active.handle.stop();
        }
    }

    pub fn enable_thunder(&mut self, sched: &mut Scheduler) {
        if self.thunder_timer.is_none() {
            self.schedule_thunder(sched);
        }
    }

    /// Stops future claps. A flash already on screen finishes on its own timer.
    pub fn disable_thunder(&mut self, sched: &mut Scheduler) {
        if let Some(id) = self.thunder_timer.take() {
            sched.clear_timer(id);
        }
    }

    fn schedule_thunder(&mut self, sched: &mut Scheduler) {
        let span = THUNDER_MAX_DELAY_MS - THUNDER_MIN_DELAY_MS;
        let delay = THUNDER_MIN_DELAY_MS + self.rng.gen::<f64>() * span;
        self.thunder_timer = Some(sched.set_timeout(delay));
    }

    /// Pushes the current volume setting to the playing loop without restarting it.
    pub fn update_volume(&mut self) {
        let gain = self.gain();
        self.applied_volume = self.shared.borrow().settings.rain_volume;
        if let Some(active) = self.rain_loop.as_mut() {
            active.handle.set_volume(gain);
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.update_volume();
    }

    /// Follows the thunder flag and volume in the shared settings.
    pub fn sync(&mut self, sched: &mut Scheduler) {
        if !self.running {
            return;
        }
        let (thunder, volume) = {
            let state = self.shared.borrow();
            (state.settings.enable_thunder, state.settings.rain_volume)
        };
        if thunder && self.thunder_timer.is_none() {
            self.enable_thunder(sched);
        } else if !thunder && self.thunder_timer.is_some() {
            self.disable_thunder(sched);
        }
        if volume != self.applied_volume {
            self.update_volume();
        }
    }

    pub fn on_timer(&mut self, id: TimerId, sched: &mut Scheduler) -> bool {
        if self.flash_timer == Some(id) {
            self.flash_timer = None;
            self.shared.borrow_mut().flash.alpha = 0.0;
            return true;
        }
        if self.thunder_timer == Some(id) {
            self.thunder_timer = None;
            self.roll_thunder(sched);
            if self.shared.borrow().settings.enable_thunder {
                self.schedule_thunder(sched);
            }
            return true;
        }
        false
    }

    /// Chance per roll: the live weather phase when dynamic weather runs, else the preset.
    fn thunder_chance(&self) -> f32 {
        let state = self.shared.borrow();
        match state.weather {
            Some(weather) => weather.phase.config().thunder,
            None => state.settings.preset.config().thunder_rarity,
        }
    }

    fn roll_thunder(&mut self, sched: &mut Scheduler) {
        if !self.shared.borrow().settings.enable_thunder {
            return;
        }
        if self.rng.gen::<f32>() >= self.thunder_chance() {
            return;
        }

        let alpha = self.rng.gen::<f32>() * 0.7 + 0.3;
        self.shared.borrow_mut().flash.alpha = alpha;
        if let Some(id) = self.flash_timer.take() {
            sched.clear_timer(id);
        }
        self.flash_timer = Some(sched.set_timeout(FLASH_DURATION_MS));

        let count = self.audio.thunder_count();
        if count == 0 {
            return;
        }
        let index = ((self.rng.gen::<f32>() * count as f32) as usize).min(count - 1);
        let gain = self.gain() * (0.7 + 0.3 * self.rng.gen::<f32>());
        if let Err(e) = self.audio.play_once(SoundId::Thunder(index), gain) {
            log::warn!("Thunder clap skipped: {}", e);
        }
    }
}
