#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliArgs;
pub use toml_config::{
    FirewallConfig, NginxConfig, SourceConfig, SourceFormat, SyncConfig, STAGE_CONFIG_PLACEHOLDER,
};
