//! Dynamic weather phase engine.
//!
//! Drives the rain parameters through a slow cycle of weather phases. Each
//! phase lasts one cycle; its first few minutes blend from the phase towards
//! the already chosen next phase, and the rest of the cycle breathes around
//! the current phase with a slow sine. The engine ticks on a fixed interval after
//! a short warm-up and writes its results into the shared settings.

use std::fmt;

use rand::{Rng, RngCore};

use crate::presets::{PhaseConfig, WeatherPhase};
use crate::scheduler::{Scheduler, TimerId};
use crate::state::{RenderParameters, SharedState, WeatherSnapshot};
use crate::time_system::{Clock, TimeOfDay};
use crate::utils::{lerp, progress};

/// One full weather phase.
pub const WEATHER_CYCLE_DURATION_MS: f64 = 45.0 * 60.0 * 1000.0;
/// Blend window at the start of each cycle.
pub const PHASE_TRANSITION_TIME_MS: f64 = 5.0 * 60.0 * 1000.0;
pub const TICK_INTERVAL_MS: f64 = 10_000.0;
pub const WARMUP_DELAY_MS: f64 = 2_000.0;

pub const INITIAL_PHASE: WeatherPhase = WeatherPhase::LightRain;
pub const INITIAL_WIND: f32 = -3.0;
/// Wind direction never leaves [-WIND_LIMIT, WIND_LIMIT] degrees.
pub const WIND_LIMIT: f32 = 45.0;
/// The incoming phase enables thunder when its thunder chance is above this.
pub const THUNDER_THRESHOLD: f32 = 0.05;

/// Period of the gusting sine applied to the rain angle.
const GUST_PERIOD_MS: f64 = 60_000.0;
/// Period of the slow breathing sine applied during steady state.
const BREATH_PERIOD_MS: f64 = 300_000.0;
const BREATH_AMPLITUDE: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub enum WeatherError {
    /// The clock reported a time before the current phase started.
    ClockWentBackwards { elapsed_ms: f64 },
    /// A derived parameter came out NaN or infinite.
    NonFiniteParameter(RenderParameters),
    /// Shared state was already borrowed when the tick tried to write it.
    StateBusy,
}

impl fmt::Display for WeatherError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WeatherError::ClockWentBackwards { elapsed_ms } => {
                write!(f, "Clock went backwards: {:.0} ms into the current phase", elapsed_ms)
            }
            WeatherError::NonFiniteParameter(params) => write!(f, "Derived non-finite parameters: {:?}", params),
            WeatherError::StateBusy => write!(f, "Shared effect state is busy"),
        }
    }
}

impl std::error::Error for WeatherError {}

/// Engine-owned phase bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherState {
    pub current_phase: WeatherPhase,
    pub next_phase: WeatherPhase,
    pub phase_start_ms: f64,
    /// Fraction of the cycle elapsed, in [0, 1].
    pub phase_progress: f64,
    pub wind_direction: f32,
    pub time_of_day: TimeOfDay,
}

impl WeatherState {
    fn fresh(now_ms: f64, next_phase: WeatherPhase, time_of_day: TimeOfDay) -> Self {
        Self {
            current_phase: INITIAL_PHASE,
            next_phase,
            phase_start_ms: now_ms,
            phase_progress: 0.0,
            wind_direction: INITIAL_WIND,
            time_of_day,
        }
    }
}

/// What a single tick produced. Mostly useful for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub params: RenderParameters,
    pub phase: WeatherPhase,
    pub next_phase: WeatherPhase,
    /// True when this tick committed a phase change.
    pub transitioned: bool,
    /// `None` outside the blend window.
    pub transition_progress: Option<f64>,
    pub thunder: bool,
    pub light_level: f32,
}

/// Straight blend between two phase vectors. `t = 0` is `current`, `t = 1` is `next`.
///
/// Angle is not part of a phase, so it is left at zero here.
pub fn interpolate(current: &PhaseConfig, next: &PhaseConfig, t: f32) -> RenderParameters {
    RenderParameters {
        intensity: lerp(current.intensity, next.intensity, t),
        scale: lerp(current.scale, next.scale, t),
        speed: lerp(current.speed, next.speed, t),
        angle: 0.0,
        volume: lerp(current.volume, next.volume, t),
        mist: lerp(current.mist, next.mist, t),
    }
}

/// Rain angle: prevailing wind plus a one-minute gust scaled by the current phase.
pub fn gust_angle(wind_direction: f32, current: &PhaseConfig, now_ms: f64) -> f32 {
    wind_direction + (now_ms / GUST_PERIOD_MS).sin() as f32 * current.angle_variation
}

/// Pure parameter derivation for a point in the cycle.
///
/// Returns the parameters and, inside the blend window, the blend fraction.
/// Outside the window the volume stays at `held_volume`, the last value
/// written to the settings.
pub fn derive_parameters(
    current: &PhaseConfig,
    next: &PhaseConfig,
    time_of_day: TimeOfDay,
    wind_direction: f32,
    held_volume: f32,
    elapsed_ms: f64,
    now_ms: f64,
) -> (RenderParameters, Option<f64>) {
    let angle = gust_angle(wind_direction, current, now_ms);

    let t = progress(elapsed_ms, PHASE_TRANSITION_TIME_MS);
    if t < 1.0 {
        let mut params = interpolate(current, next, t as f32);
        params.angle = angle;
        return (params, Some(t));
    }

    let breath = (now_ms / BREATH_PERIOD_MS).sin() as f32 * BREATH_AMPLITUDE;
    let params = RenderParameters {
        intensity: current.intensity + breath * current.intensity,
        scale: current.scale + breath * 0.1,
        speed: current.speed + breath * 0.2,
        angle,
        volume: held_volume,
        mist: current.mist * time_of_day.config().mist_mod,
    };
    (params, None)
}

pub struct WeatherEngine {
    shared: SharedState,
    rng: Box<dyn RngCore>,
    state: WeatherState,
    warmup: Option<TimerId>,
    interval: Option<TimerId>,
    halted: bool,
}

impl WeatherEngine {
    pub fn new(shared: SharedState, rng: Box<dyn RngCore>) -> Self {
        Self {
            shared,
            rng,
            state: WeatherState::fresh(0.0, INITIAL_PHASE, TimeOfDay::Morning),
            warmup: None,
            interval: None,
            halted: false,
        }
    }

    pub fn state(&self) -> &WeatherState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.warmup.is_some() || self.interval.is_some()
    }

    /// Set when a tick failed; the engine stays stopped until the next `start`.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Resets the cycle to LIGHT_RAIN and schedules the first tick after the warm-up.
    /// A running engine is restarted.
    pub fn start(&mut self, sched: &mut Scheduler, clock: &dyn Clock) {
        if self.is_running() {
            self.stop(sched);
        }

        let now = clock.now_ms();
        let hour = clock.local_hour();
        let next_phase = INITIAL_PHASE.next(self.rng.gen::<f64>(), hour);
        self.state = WeatherState::fresh(now, next_phase, TimeOfDay::from_hour(hour));
        self.halted = false;

        self.shared.borrow_mut().weather = Some(self.snapshot(INITIAL_PHASE.config().intensity));
        self.warmup = Some(sched.set_timeout(WARMUP_DELAY_MS));

        log::info!("Dynamic weather started in {} (next: {})", self.state.current_phase, self.state.next_phase);
    }

    pub fn stop(&mut self, sched: &mut Scheduler) {
        if let Some(id) = self.warmup.take() {
            sched.clear_timer(id);
        }
        if let Some(id) = self.interval.take() {
            sched.clear_timer(id);
        }
        self.shared.borrow_mut().weather = None;
    }

    /// Routes a fired timer. Returns false if the id is not ours.
    pub fn on_timer(&mut self, id: TimerId, sched: &mut Scheduler, clock: &dyn Clock) -> bool {
        if self.warmup == Some(id) {
            self.warmup = None;
            self.interval = Some(sched.set_interval(TICK_INTERVAL_MS));
            self.run_tick(sched, clock);
            return true;
        }
        if self.interval == Some(id) {
            self.run_tick(sched, clock);
            return true;
        }
        false
    }

    fn run_tick(&mut self, sched: &mut Scheduler, clock: &dyn Clock) {
        match self.tick(clock) {
            Ok(report) => {
                log::debug!(
                    "Weather tick: {} -> {} intensity {:.2} angle {:.1} thunder {}",
                    report.phase,
                    report.next_phase,
                    report.params.intensity,
                    report.params.angle,
                    report.thunder
                );
            }
            Err(e) => {
                log::error!("Weather update failed, halting dynamic weather: {}", e);
                if let Some(id) = self.interval.take() {
                    sched.clear_timer(id);
                }
                self.halted = true;
            }
        }
    }

    /// One engine step at the clock's current time.
    pub fn tick(&mut self, clock: &dyn Clock) -> Result<TickReport, WeatherError> {
        let now = clock.now_ms();
        let hour = clock.local_hour();

        let elapsed = now - self.state.phase_start_ms;
        if elapsed < 0.0 {
            return Err(WeatherError::ClockWentBackwards { elapsed_ms: elapsed });
        }

        self.state.time_of_day = TimeOfDay::from_hour(hour);
        self.state.phase_progress = progress(elapsed, WEATHER_CYCLE_DURATION_MS);

        let transitioned = self.state.phase_progress >= 1.0;
        if transitioned {
            self.commit_transition(now, hour);
        }

        let held_volume = self
            .shared
            .try_borrow()
            .map_err(|_| WeatherError::StateBusy)?
            .settings
            .rain_volume;
        let current = self.state.current_phase.config();
        let next = self.state.next_phase.config();
        // elapsed from before a commit: the commit tick is past the window and holds steady
        let (params, transition_progress) = derive_parameters(
            current,
            next,
            self.state.time_of_day,
            self.state.wind_direction,
            held_volume,
            elapsed,
            now,
        );
        if !params.is_finite() {
            return Err(WeatherError::NonFiniteParameter(params));
        }

        let thunder = next.thunder > THUNDER_THRESHOLD;
        let light_level = params.intensity * self.state.time_of_day.config().light_mod;
        let snapshot = self.snapshot(light_level);

        let mut shared = self.shared.try_borrow_mut().map_err(|_| WeatherError::StateBusy)?;
        params.apply_to(&mut shared.settings);
        shared.settings.enable_thunder = thunder;
        shared.weather = Some(snapshot);

        Ok(TickReport {
            params,
            phase: self.state.current_phase,
            next_phase: self.state.next_phase,
            transitioned,
            transition_progress,
            thunder,
            light_level,
        })
    }

    fn commit_transition(&mut self, now: f64, hour: u32) {
        let previous = self.state.current_phase;
        self.state.current_phase = self.state.next_phase;
        self.state.next_phase = self.state.current_phase.next(self.rng.gen::<f64>(), hour);
        self.state.phase_start_ms = now;
        self.state.phase_progress = 0.0;

        let max_shift = self.state.next_phase.config().angle_variation;
        let shift = self.rng.gen::<f64>() as f32 * max_shift * 2.0 - max_shift;
        self.state.wind_direction = (self.state.wind_direction + shift).clamp(-WIND_LIMIT, WIND_LIMIT);

        log::info!(
            "Weather phase {} -> {} (next: {}, wind {:.1})",
            previous,
            self.state.current_phase,
            self.state.next_phase,
            self.state.wind_direction
        );
    }

    fn snapshot(&self, light_level: f32) -> WeatherSnapshot {
        WeatherSnapshot {
            phase: self.state.current_phase,
            time_of_day: self.state.time_of_day,
            light_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Settings;
    use crate::state::EffectState;
    use crate::time_system::ManualClock;
    use rand::rngs::mock::StepRng;

    const MORNING: u32 = 9;

    fn engine(rng: StepRng) -> (WeatherEngine, SharedState) {
        let shared = EffectState::shared(Settings::default());
        (WeatherEngine::new(shared.clone(), Box::new(rng)), shared)
    }

    #[test]
    fn interpolation_hits_both_ends() {
        let a = WeatherPhase::LightRain.config();
        let b = WeatherPhase::HeavyRain.config();
        let start = interpolate(a, b, 0.0);
        let end = interpolate(a, b, 1.0);
        let mid = interpolate(a, b, 0.5);
        assert!((start.intensity - a.intensity).abs() < 1e-6);
        assert!((end.intensity - b.intensity).abs() < 1e-6);
        assert!((mid.volume - (a.volume + b.volume) / 2.0).abs() < 1e-4);
    }

    #[test]
    fn steady_state_breathes_around_current_phase() {
        let cfg = WeatherPhase::HeavyRain.config();
        // sin(0) == 0: no breathing, no gust
        let (params, blend) = derive_parameters(cfg, cfg, TimeOfDay::Night, 4.0, 33.0, 600_000.0, 0.0);
        assert!(blend.is_none());
        assert_eq!(params.intensity, cfg.intensity);
        assert_eq!(params.angle, 4.0);
        assert_eq!(params.mist, cfg.mist);
        // the user's volume is left alone outside the blend
        assert_eq!(params.volume, 33.0);

        let (dusk, _) = derive_parameters(cfg, cfg, TimeOfDay::Dusk, 0.0, 33.0, 600_000.0, 0.0);
        assert!((dusk.mist - cfg.mist * 0.85).abs() < 1e-6);
    }

    #[test]
    fn blend_window_reports_progress() {
        let a = WeatherPhase::Drizzle.config();
        let b = WeatherPhase::Downpour.config();
        let elapsed = PHASE_TRANSITION_TIME_MS / 2.0;
        let (params, blend) = derive_parameters(a, b, TimeOfDay::Morning, 0.0, 33.0, elapsed, 0.0);
        let t = blend.expect("inside blend window");
        assert!((t - 0.5).abs() < 1e-9);
        assert!((params.intensity - lerp(a.intensity, b.intensity, 0.5)).abs() < 1e-6);
        assert!((params.volume - lerp(a.volume, b.volume, 0.5)).abs() < 1e-4);

        // the window closes once the first few minutes are over
        let (_, late) = derive_parameters(a, b, TimeOfDay::Morning, 0.0, 33.0, PHASE_TRANSITION_TIME_MS, 0.0);
        assert!(late.is_none());
        let (_, end) = derive_parameters(a, b, TimeOfDay::Morning, 0.0, 33.0, WEATHER_CYCLE_DURATION_MS - 1.0, 0.0);
        assert!(end.is_none());
    }

    #[test]
    fn start_arms_warmup_then_interval() {
        let (mut engine, shared) = engine(StepRng::new(0, 0));
        let clock = ManualClock::new(0.0, MORNING);
        let mut sched = Scheduler::new(0.0);

        engine.start(&mut sched, &clock);
        assert!(engine.is_running());
        // roll 0.0 from LIGHT_RAIN is DRIZZLE
        assert_eq!(engine.state().next_phase, WeatherPhase::Drizzle);
        assert_eq!(shared.borrow().weather.map(|w| w.phase), Some(WeatherPhase::LightRain));

        let fired = sched.advance_to(WARMUP_DELAY_MS);
        assert_eq!(fired.len(), 1);
        assert!(engine.on_timer(fired[0], &mut sched, &clock));
        assert_eq!(sched.pending_timers(), 1);
        assert_eq!(sched.next_deadline(), Some(WARMUP_DELAY_MS + TICK_INTERVAL_MS));

        engine.stop(&mut sched);
        assert!(sched.is_idle());
        assert!(shared.borrow().weather.is_none());
    }

    #[test]
    fn tick_writes_parameters_and_thunder_flag() {
        let (mut engine, shared) = engine(StepRng::new(1 << 63, 0));
        let clock = ManualClock::new(0.0, MORNING);
        let mut sched = Scheduler::new(0.0);
        engine.start(&mut sched, &clock);
        // roll 0.5 from LIGHT_RAIN is HEAVY_RAIN, thunder 0.07
        assert_eq!(engine.state().next_phase, WeatherPhase::HeavyRain);

        shared.borrow_mut().settings.enable_thunder = false;
        clock.set_now(20_000.0);
        let report = engine.tick(&clock).unwrap();
        assert!(report.thunder);
        assert!(!report.transitioned);
        assert!(report.transition_progress.is_some());
        let state = shared.borrow();
        assert!(state.settings.enable_thunder);
        assert_eq!(state.settings.rain_volume, report.params.volume);
        assert_eq!(state.settings.rain_intensity, report.params.intensity);
    }

    #[test]
    fn cycle_end_commits_next_phase_and_shifts_wind() {
        let (mut engine, _shared) = engine(StepRng::new(1 << 63, 0));
        let clock = ManualClock::new(0.0, MORNING);
        let mut sched = Scheduler::new(0.0);
        engine.start(&mut sched, &clock);

        clock.set_now(WEATHER_CYCLE_DURATION_MS);
        let report = engine.tick(&clock).unwrap();
        assert!(report.transitioned);
        assert_eq!(engine.state().current_phase, WeatherPhase::HeavyRain);
        assert_eq!(engine.state().phase_progress, 0.0);
        assert_eq!(engine.state().phase_start_ms, WEATHER_CYCLE_DURATION_MS);
        // roll 0.5 shifts by exactly zero
        assert_eq!(engine.state().wind_direction, INITIAL_WIND);
    }

    #[test]
    fn backwards_clock_halts_engine() {
        let (mut engine, _shared) = engine(StepRng::new(0, 0));
        let clock = ManualClock::new(100_000.0, MORNING);
        let mut sched = Scheduler::new(100_000.0);
        engine.start(&mut sched, &clock);

        clock.set_now(50_000.0);
        assert!(matches!(engine.tick(&clock), Err(WeatherError::ClockWentBackwards { .. })));

        clock.set_now(102_000.0);
        let fired = sched.advance_to(102_000.0);
        engine.on_timer(fired[0], &mut sched, &clock);
        clock.set_now(0.0);
        let fired = sched.advance_to(112_000.0);
        engine.on_timer(fired[0], &mut sched, &clock);
        assert!(engine.is_halted());
        assert!(!engine.is_running());
        assert!(sched.is_idle());
    }

    #[test]
    fn busy_state_is_an_error() {
        let (mut engine, shared) = engine(StepRng::new(0, 0));
        let clock = ManualClock::new(0.0, MORNING);
        let mut sched = Scheduler::new(0.0);
        engine.start(&mut sched, &clock);

        let _guard = shared.borrow();
        assert_eq!(engine.tick(&clock), Err(WeatherError::StateBusy));
    }
}
