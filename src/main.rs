use std::sync::Arc;

use rainglass::audio::RodioOutput;
use rainglass::graphics::WgpuBackend;
use rainglass::logger::init_logger;
use rainglass::state::NoticeLevel;
use rainglass::{
    Clock, ConfigManager, EffectHost, EffectState, ManualClock, RainPreset, Scheduler, SystemClock, WeatherEngine,
};
use winit::{
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

const DEFAULT_CONFIG_PATH: &str = "rainglass.json";
const VOLUME_STEP: f32 = 10.0;

struct Args {
    config_path: String,
    simulate_minutes: Option<f64>,
}

fn parse_args() -> Args {
    let mut args = Args { config_path: DEFAULT_CONFIG_PATH.to_string(), simulate_minutes: None };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--simulate" {
            match iter.next().and_then(|m| m.parse::<f64>().ok()) {
                Some(minutes) if minutes > 0.0 => args.simulate_minutes = Some(minutes),
                _ => log::warn!("--simulate expects a positive number of minutes, ignoring"),
            }
        } else {
            args.config_path = arg;
        }
    }
    args
}

fn main() {
    init_logger();
    let args = parse_args();
    let manager = ConfigManager::new(&args.config_path);

    match args.simulate_minutes {
        Some(minutes) => simulate(&manager, minutes),
        None => run_window(manager),
    }
}

/// Steps the weather engine on a hand-driven clock and logs every tick.
fn simulate(manager: &ConfigManager, minutes: f64) {
    let hour = SystemClock::new().local_hour();
    let clock = ManualClock::new(0.0, hour);
    let shared = EffectState::shared(manager.settings().clone());
    let mut sched = Scheduler::new(0.0);
    let mut engine = WeatherEngine::new(shared.clone(), Box::new(rand::thread_rng()));

    engine.start(&mut sched, &clock);
    let end = minutes * 60_000.0;
    while let Some(deadline) = sched.next_deadline() {
        if deadline > end || engine.is_halted() {
            break;
        }
        clock.set_now(deadline);
        for id in sched.advance_to(deadline) {
            engine.on_timer(id, &mut sched, &clock);
        }

        let state = shared.borrow();
        let weather = engine.state();
        log::info!(
            "[{:>7.1} min] {} -> {} ({:>3.0}%) intensity {:.2} speed {:.2} angle {:>6.1} volume {:>4.1} thunder {}",
            deadline / 60_000.0,
            weather.current_phase,
            weather.next_phase,
            weather.phase_progress * 100.0,
            state.settings.rain_intensity,
            state.settings.rain_speed,
            state.settings.rain_angle,
            state.settings.rain_volume,
            state.settings.enable_thunder
        );
    }
    engine.stop(&mut sched);
}

fn run_window(mut manager: ConfigManager) {
    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Could not open an event loop: {}", e);
            return;
        }
    };
    let window = match WindowBuilder::new().with_title("rainglass").build(&event_loop) {
        Ok(window) => Arc::new(window),
        Err(e) => {
            log::error!("Could not create a window: {}", e);
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let settings = manager.settings().clone();
    let size = window.inner_size();
    let backend = WgpuBackend::new(window.clone());
    let audio = RodioOutput::new(settings.sounds.clone());
    let mut host = EffectHost::new(settings, backend, audio, Box::new(SystemClock::new()), (size.width, size.height));
    host.start();

    let mut muted = false;
    let result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event: WindowEvent::CloseRequested, .. } => {
            host.stop();
            let chosen = host.settings_snapshot();
            let saved = manager.update_config(|s| {
                s.preset = chosen.preset;
                s.dynamic_weather = chosen.dynamic_weather;
                s.enable_thunder = chosen.enable_thunder;
                s.show_background = chosen.show_background;
                s.rain_volume = chosen.rain_volume;
            });
            if let Err(e) = saved {
                log::error!("Could not save settings: {}", e);
            }
            elwt.exit();
        }
        Event::WindowEvent { event: WindowEvent::Resized(size), .. } => {
            host.resize(size.width, size.height);
        }
        Event::WindowEvent {
            event:
                WindowEvent::KeyboardInput {
                    event: KeyEvent { physical_key: PhysicalKey::Code(code), state: ElementState::Pressed, repeat: false, .. },
                    ..
                },
            ..
        } => {
            let settings = host.settings_snapshot();
            match code {
                KeyCode::KeyT => host.set_thunder(!settings.enable_thunder),
                KeyCode::KeyD => host.set_dynamic_weather(!settings.dynamic_weather),
                KeyCode::KeyB => host.set_show_background(!settings.show_background),
                KeyCode::KeyR => host.reset_renderer(),
                KeyCode::KeyM => {
                    muted = !muted;
                    host.set_muted(muted);
                }
                KeyCode::Digit1 => host.set_preset(RainPreset::Normal),
                KeyCode::Digit2 => host.set_preset(RainPreset::Slow),
                KeyCode::Digit3 => host.set_preset(RainPreset::Heavy),
                KeyCode::Digit4 => host.set_preset(RainPreset::Downpour),
                KeyCode::Equal | KeyCode::NumpadAdd => host.set_volume(settings.rain_volume + VOLUME_STEP),
                KeyCode::Minus | KeyCode::NumpadSubtract => host.set_volume(settings.rain_volume - VOLUME_STEP),
                _ => {}
            }
        }
        Event::WindowEvent { event: WindowEvent::RedrawRequested, .. } => {
            host.pump();
            for notice in host.take_notices() {
                match notice.level {
                    NoticeLevel::Info => log::info!("{}", notice.message),
                    NoticeLevel::Error => log::error!("{}", notice.message),
                }
            }
        }
        Event::AboutToWait => window.request_redraw(),
        _ => {}
    });

    if let Err(e) = result {
        log::error!("Event loop ended with an error: {}", e);
    }
}
