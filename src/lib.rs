pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::{LocalStorage, NginxControl, RangeFetcher, UfwFirewall};
pub use config::SyncConfig;
pub use crate::core::{
    engine::SyncEngine,
    pipeline::{SyncOptions, SyncPipeline},
};
pub use domain::model::SyncReport;
pub use utils::error::{Result, SyncError};
