// Adapters layer: concrete implementations for external systems (http, storage, firewall, proxy).

pub mod http;
pub mod nginx;
pub mod process;
pub mod storage;
pub mod ufw;

pub use http::RangeFetcher;
pub use nginx::NginxControl;
pub use storage::LocalStorage;
pub use ufw::UfwFirewall;
