//! The effect host: owns the scheduler, the clock and every component, and
//! routes timers and frames to whoever armed them.

use rand::RngCore;

use crate::ambience::Ambience;
use crate::audio::AudioOutput;
use crate::background;
use crate::configuration::Settings;
use crate::presets::RainPreset;
use crate::quality::QualityController;
use crate::renderer::{FrameOutcome, GraphicsBackend, RainRenderer};
use crate::scheduler::{Scheduler, TimerId};
use crate::state::{EffectState, Notice, NoticeLevel, SharedState};
use crate::time_system::Clock;
use crate::weather_system::WeatherEngine;

pub struct EffectHost<B: GraphicsBackend, A: AudioOutput> {
    shared: SharedState,
    sched: Scheduler,
    clock: Box<dyn Clock>,
    weather: WeatherEngine,
    renderer: RainRenderer<B>,
    quality: QualityController,
    ambience: Ambience<A>,
    running: bool,
}

impl<B: GraphicsBackend, A: AudioOutput> EffectHost<B, A> {
    pub fn new(settings: Settings, backend: B, audio: A, clock: Box<dyn Clock>, size: (u32, u32)) -> Self {
        Self::with_rngs(
            settings,
            backend,
            audio,
            clock,
            size,
            Box::new(rand::thread_rng()),
            Box::new(rand::thread_rng()),
        )
    }

    /// Same as `new` with explicit random sources for the weather engine and the thunder rolls.
    pub fn with_rngs(
        settings: Settings,
        backend: B,
        audio: A,
        clock: Box<dyn Clock>,
        size: (u32, u32),
        weather_rng: Box<dyn RngCore>,
        thunder_rng: Box<dyn RngCore>,
    ) -> Self {
        let backdrop = background::from_config(&settings.background);
        let shared = EffectState::shared(settings);
        let sched = Scheduler::new(clock.now_ms());

        Self {
            weather: WeatherEngine::new(shared.clone(), weather_rng),
            renderer: RainRenderer::new(shared.clone(), backend, backdrop, size),
            quality: QualityController::new(shared.clone()),
            ambience: Ambience::new(shared.clone(), audio, thunder_rng),
            shared,
            sched,
            clock,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.sched.advance_to(self.clock.now_ms());

        let (preset, dynamic) = {
            let mut state = self.shared.borrow_mut();
            if state.settings.apply_reduced_motion() {
                state.notify(NoticeLevel::Info, "Reduced motion is on: rain slowed down and thunder turned off.");
            }
            (state.settings.preset, state.settings.dynamic_weather)
        };

        self.renderer.setup(&mut self.sched);
        self.ambience.start(preset, &mut self.sched);
        if dynamic {
            self.weather.start(&mut self.sched, self.clock.as_ref());
        }
        log::info!("Rain effects started (preset {:?}, dynamic weather {})", preset, dynamic);
    }

    /// Stops everything; afterwards no timer or frame request is left behind.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.weather.stop(&mut self.sched);
        self.ambience.stop(&mut self.sched);
        self.renderer.cleanup(&mut self.sched);
        self.quality.reset_samples();
        self.running = false;

        if !self.sched.is_idle() {
            log::warn!(
                "Scheduler not idle after stop: {} timers, {} frames",
                self.sched.pending_timers(),
                self.sched.pending_frames()
            );
        }
        log::info!("Rain effects stopped");
    }

    /// Runs every timer that came due, then one display frame.
    pub fn pump(&mut self) {
        if !self.running {
            return;
        }
        let now = self.clock.now_ms();
        for id in self.sched.advance_to(now) {
            self.dispatch_timer(id);
        }

        for frame in self.sched.take_frames() {
            if let Some(FrameOutcome::Drawn) = self.renderer.on_frame(frame, &mut self.sched) {
                self.quality.record_frame(now);
            }
        }
        // a paused loop must not leave a window open across the gap
        if !self.renderer.is_running() {
            self.quality.reset_samples();
        }

        self.ambience.sync(&mut self.sched);
    }

    fn dispatch_timer(&mut self, id: TimerId) {
        let handled = self.weather.on_timer(id, &mut self.sched, self.clock.as_ref())
            || self.renderer.on_timer(id, &mut self.sched)
            || self.ambience.on_timer(id, &mut self.sched);
        if !handled {
            log::debug!("Timer {:?} has no owner", id);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.renderer.resize(width, height);
    }

    pub fn set_dynamic_weather(&mut self, enabled: bool) {
        self.shared.borrow_mut().settings.dynamic_weather = enabled;
        if !self.running {
            return;
        }
        if enabled {
            self.weather.start(&mut self.sched, self.clock.as_ref());
        } else {
            self.weather.stop(&mut self.sched);
        }
    }

    /// Overwrites the sliders with the preset and restarts the rain loop with its sound.
    pub fn set_preset(&mut self, preset: RainPreset) {
        self.shared.borrow_mut().settings.apply_preset(preset);
        if self.running {
            self.ambience.start(preset, &mut self.sched);
        }
    }

    pub fn set_thunder(&mut self, enabled: bool) {
        self.shared.borrow_mut().settings.enable_thunder = enabled;
        self.ambience.sync(&mut self.sched);
    }

    pub fn set_show_background(&mut self, show: bool) {
        self.shared.borrow_mut().settings.show_background = show;
        if !self.running {
            return;
        }
        if show {
            self.renderer.reset(&mut self.sched);
        } else {
            self.renderer.cleanup(&mut self.sched);
        }
        self.quality.reset_samples();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.shared.borrow_mut().settings.rain_volume = volume.clamp(0.0, 500.0);
        self.ambience.update_volume();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.ambience.set_muted(muted);
    }

    /// The "reset graphics" action.
    pub fn reset_renderer(&mut self) {
        if self.running {
            self.renderer.reset(&mut self.sched);
            self.quality.reset_samples();
        }
    }

    pub fn context_lost(&mut self) {
        self.renderer.handle_context_lost(&mut self.sched);
        self.quality.reset_samples();
    }

    pub fn context_restored(&mut self) {
        self.renderer.handle_context_restored(&mut self.sched);
        self.quality.reset_samples();
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.shared.borrow_mut().take_notices()
    }

    pub fn settings_snapshot(&self) -> Settings {
        self.shared.borrow().settings.clone()
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn weather(&self) -> &WeatherEngine {
        &self.weather
    }

    pub fn renderer(&self) -> &RainRenderer<B> {
        &self.renderer
    }

    pub fn quality(&self) -> &QualityController {
        &self.quality
    }

    pub fn ambience(&self) -> &Ambience<A> {
        &self.ambience
    }
}
