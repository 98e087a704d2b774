use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// Installs the env_logger backend. `RUST_LOG` overrides the default `info` level.
pub fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("wgpu_core", log::LevelFilter::Warn)
        .filter_module("wgpu_hal", log::LevelFilter::Warn)
        .filter_module("naga", log::LevelFilter::Warn)
        .parse_default_env()
        .format(|buf, record| {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
            let ts = now.as_secs();
            let ms = now.subsec_millis();
            let time_str = format!("{:02}:{:02}:{:02}.{:03}", (ts / 3600) % 24, (ts / 60) % 60, ts % 60, ms);
            writeln!(buf, "[{} {:<5}] {}", time_str, record.level(), record.args())
        })
        .init();

    log::info!("{} {} logging initialised", crate::NAME, crate::VERSION);
}
