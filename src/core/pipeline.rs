use crate::adapters::RangeFetcher;
use crate::config::SyncConfig;
use crate::core::reconcile;
use crate::core::render::render;
use crate::core::{Firewall, Pipeline, ProxyControl, Storage};
use crate::domain::model::{Artifact, FirewallSummary, RangeSet, RenderedConfig, SyncReport};
use crate::utils::error::{Result, SyncError};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
    pub skip_firewall: bool,
    pub skip_reload: bool,
}

/// A file about to be replaced, with what was there before.
struct PendingWrite<'a> {
    artifact: &'a Artifact,
    previous: Option<Vec<u8>>,
}

pub struct SyncPipeline<S: Storage, F: Firewall, P: ProxyControl> {
    storage: S,
    firewall: F,
    proxy: P,
    config: SyncConfig,
    options: SyncOptions,
    fetcher: RangeFetcher,
}

impl<S: Storage, F: Firewall, P: ProxyControl> SyncPipeline<S, F, P> {
    pub fn new(
        storage: S,
        firewall: F,
        proxy: P,
        config: SyncConfig,
        options: SyncOptions,
    ) -> Result<Self> {
        let fetcher = RangeFetcher::new(config.source.clone())?;
        Ok(Self {
            storage,
            firewall,
            proxy,
            config,
            options,
            fetcher,
        })
    }

    async fn sync_firewall(&self, ranges: &RangeSet) -> Result<FirewallSummary> {
        if !self.config.firewall.enabled || self.options.skip_firewall {
            tracing::info!("Firewall sync skipped");
            return Ok(FirewallSummary {
                skipped: true,
                ..FirewallSummary::default()
            });
        }

        let ipv6_enabled = self.firewall.ipv6_enabled().await?;
        if !ipv6_enabled {
            tracing::info!("IPv6 disabled in firewall, syncing IPv4 rules only");
        }

        let desired = reconcile::desired_rules(ranges, &self.config.firewall, ipv6_enabled);
        let existing = self
            .firewall
            .list_tagged(&self.config.firewall.comment)
            .await?;
        let plan = reconcile::plan(&existing, &desired);

        tracing::info!(
            "Firewall plan: {} to add, {} to delete, {} unchanged",
            plan.add.len(),
            plan.delete.len(),
            plan.keep.len()
        );

        if self.options.dry_run {
            for rule in &plan.add {
                tracing::info!("[dry-run] would add: {}", rule);
            }
            for rule in &plan.delete {
                tracing::info!("[dry-run] would delete: {}", rule);
            }
        } else {
            // Adds first: a range whose rule changed keeps access throughout.
            for rule in &plan.add {
                tracing::debug!("Adding rule: {}", rule);
                self.firewall.add(rule).await?;
            }
            for rule in &plan.delete {
                tracing::debug!("Deleting rule: {}", rule);
                self.firewall.delete(rule).await?;
            }
        }

        Ok(FirewallSummary {
            skipped: false,
            ipv6_enabled,
            added: plan.add.len(),
            deleted: plan.delete.len(),
            kept: plan.keep.len(),
        })
    }

    /// Artifacts whose rendered content differs from the file on disk.
    async fn pending_writes<'a>(&self, artifacts: &'a [Artifact]) -> Result<Vec<PendingWrite<'a>>> {
        let mut pending = Vec::new();
        for artifact in artifacts {
            let previous = self.storage.read_file(&artifact.path).await?;
            if previous.as_deref() == Some(artifact.content.as_bytes()) {
                tracing::debug!("{} is up to date", artifact.path.display());
                continue;
            }
            pending.push(PendingWrite { artifact, previous });
        }
        Ok(pending)
    }

    /// Put every pending file in place, then let the proxy check the result.
    /// If the proxy rejects it, the previous files come back before returning.
    async fn apply_and_validate(&self, pending: &[PendingWrite<'_>]) -> Result<()> {
        let mut written = 0;
        let mut outcome = Ok(());
        for write in pending {
            if let Err(e) = self
                .storage
                .write_file(&write.artifact.path, write.artifact.content.as_bytes())
                .await
            {
                outcome = Err(e);
                break;
            }
            written += 1;
        }

        if outcome.is_ok() {
            outcome = self.proxy.validate().await;
        }

        if let Err(e) = outcome {
            tracing::error!("New configuration not accepted: {}", e);
            self.restore(&pending[..written], &e).await?;
            return Err(e);
        }

        Ok(())
    }

    /// Undo `written`, newest first. Every file is attempted; any that could
    /// not be put back turns the failure into `RollbackFailed`.
    async fn restore(&self, written: &[PendingWrite<'_>], cause: &SyncError) -> Result<()> {
        let mut stuck = Vec::new();
        let mut reasons = Vec::new();
        for write in written.iter().rev() {
            let path = &write.artifact.path;
            let result = match &write.previous {
                Some(data) => self.storage.write_file(path, data).await,
                None => self.storage.remove_file(path).await,
            };
            match result {
                Ok(()) => tracing::info!("Restored {}", path.display()),
                Err(e) => {
                    tracing::error!("Failed to restore {}: {}", path.display(), e);
                    stuck.push(path.display().to_string());
                    reasons.push(e.to_string());
                }
            }
        }

        if stuck.is_empty() {
            return Ok(());
        }
        Err(SyncError::RollbackFailed {
            files: stuck.join(", "),
            cause: cause.to_string(),
            reason: reasons.join("; "),
        })
    }
}

#[async_trait::async_trait]
impl<S: Storage, F: Firewall, P: ProxyControl> Pipeline for SyncPipeline<S, F, P> {
    async fn extract(&self) -> Result<RangeSet> {
        let ranges = self.fetcher.fetch().await?;
        tracing::info!(
            "Fetched {} IPv4 and {} IPv6 ranges",
            ranges.ipv4.len(),
            ranges.ipv6.len()
        );
        Ok(ranges)
    }

    async fn transform(&self, ranges: RangeSet) -> Result<RenderedConfig> {
        Ok(render(ranges, &self.config.nginx))
    }

    async fn load(&self, rendered: RenderedConfig) -> Result<SyncReport> {
        let mut report = SyncReport {
            ipv4_ranges: rendered.ranges.ipv4.len(),
            ipv6_ranges: rendered.ranges.ipv6.len(),
            dry_run: self.options.dry_run,
            ..SyncReport::default()
        };

        report.firewall = self.sync_firewall(&rendered.ranges).await?;

        let pending = self.pending_writes(&rendered.artifacts).await?;
        report.changed_files = pending
            .iter()
            .map(|w| w.artifact.path.clone())
            .collect::<Vec<PathBuf>>();

        if pending.is_empty() {
            tracing::info!("Proxy configuration unchanged, no reload needed");
            return Ok(report);
        }

        if self.options.dry_run {
            for write in &pending {
                tracing::info!(
                    "[dry-run] would update {} ({})",
                    write.artifact.path.display(),
                    write.artifact.kind
                );
            }
            return Ok(report);
        }

        // Nothing live is touched until the generated files pass on their own.
        self.proxy.check_staged(&rendered.artifacts).await?;
        tracing::debug!("Staged configuration accepted");

        self.apply_and_validate(&pending).await?;
        tracing::info!("Applied {} updated configuration file(s)", pending.len());

        if self.options.skip_reload {
            tracing::info!("Reload skipped, new configuration takes effect on next reload");
            return Ok(report);
        }

        self.proxy.reload().await?;
        report.reloaded = true;
        tracing::info!("Proxy reloaded");

        Ok(report)
    }
}
