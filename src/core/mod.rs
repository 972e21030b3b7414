pub mod engine;
pub mod pipeline;
pub mod reconcile;
pub mod render;

pub use crate::domain::model::{RangeSet, RenderedConfig, SyncReport};
pub use crate::domain::ports::{Firewall, Pipeline, ProxyControl, Storage};
pub use crate::utils::error::Result;
