//! Configuration: types and loader

pub mod loader;
pub mod types;

pub use loader::{load_config, load_from_toml_str};
pub use types::{AppConfig, AppSettings, InstrumentConfig, PaperAccountConfig, PlanConfig, TrailingConfig};
