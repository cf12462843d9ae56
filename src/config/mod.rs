//! Configuration: TOML file loading, CLI merging targets, and validation.

pub mod loader;
pub mod validation;

pub use loader::{AccountConfig, Config, LimitsConfig, OptionsConfig, TargetsConfig};
pub use validation::{validate_config, validate_screen_names};
