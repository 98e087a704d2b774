//! Procedural rain for a desktop window: a slow weather phase cycle, a layered
//! rain shader, adaptive quality and ambient sound, all driven from one thread.

pub mod ambience;
pub mod audio;
pub mod background;
pub mod configuration;
pub mod graphics;
pub mod logger;
pub mod plugin;
pub mod presets;
pub mod quality;
pub mod renderer;
pub mod scheduler;
pub mod state;
pub mod texture;
pub mod time_system;
pub mod uniforms;
pub mod utils;
pub mod weather_system;

// Re-export commonly used types for convenience
pub use crate::configuration::{ConfigError, ConfigManager, Settings};
pub use crate::plugin::EffectHost;
pub use crate::presets::{RainPreset, WeatherPhase};
pub use crate::renderer::{GraphicsBackend, GraphicsSession, RainRenderer, RenderError};
pub use crate::scheduler::Scheduler;
pub use crate::state::{EffectState, RenderParameters, SharedState};
pub use crate::time_system::{Clock, ManualClock, SystemClock, TimeOfDay};
pub use crate::weather_system::{WeatherEngine, WeatherError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
