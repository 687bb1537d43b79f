#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

pub use toml_config::{AdminConfig, ApiConfig, DeskConfig, LinksConfig, StoreConfig};

#[cfg(feature = "cli")]
pub use cli::CliConfig;
