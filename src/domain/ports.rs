use crate::domain::model::{Artifact, FirewallRule, RangeSet, RenderedConfig, SyncReport};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    /// Current contents of `path`, `None` when the file does not exist.
    fn read_file(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Replace `path` atomically: readers see either the old or the new file.
    fn write_file(
        &self,
        path: &Path,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn remove_file(&self, path: &Path) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Host firewall holding the tagged allow rules.
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Whether the firewall manages IPv6 traffic on this host.
    async fn ipv6_enabled(&self) -> Result<bool>;

    /// Rules carrying the comment `tag`, in the order the firewall lists them.
    async fn list_tagged(&self, tag: &str) -> Result<Vec<FirewallRule>>;

    async fn add(&self, rule: &FirewallRule) -> Result<()>;

    async fn delete(&self, rule: &FirewallRule) -> Result<()>;
}

/// Reverse proxy whose configuration includes the generated files.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// Check `artifacts` from a scratch location, before any live file is
    /// replaced. `Err(ValidationFailed)` when rejected.
    async fn check_staged(&self, artifacts: &[Artifact]) -> Result<()>;

    /// Check the on-disk configuration. `Err(ValidationFailed)` when rejected.
    async fn validate(&self) -> Result<()>;

    async fn reload(&self) -> Result<()>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<RangeSet>;
    async fn transform(&self, ranges: RangeSet) -> Result<RenderedConfig>;
    async fn load(&self, rendered: RenderedConfig) -> Result<SyncReport>;
}
