use crate::core::Pipeline;
use crate::domain::model::SyncReport;
use crate::utils::error::Result;
use std::time::Instant;

/// Runs one pass of a [`Pipeline`]: extract, transform, load, in order.
pub struct SyncEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> SyncEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<SyncReport> {
        let started = Instant::now();
        tracing::info!("Starting sync");

        tracing::debug!("Fetching published ranges");
        let ranges = self.pipeline.extract().await?;

        tracing::debug!("Rendering proxy configuration");
        let rendered = self.pipeline.transform(ranges).await?;

        tracing::debug!("Applying firewall and proxy changes");
        let report = self.pipeline.load(rendered).await?;

        tracing::info!(
            "Sync finished in {:?}: {} ranges, firewall +{}/-{}, {} file(s) changed, reloaded: {}",
            started.elapsed(),
            report.ipv4_ranges + report.ipv6_ranges,
            report.firewall.added,
            report.firewall.deleted,
            report.changed_files.len(),
            report.reloaded
        );

        Ok(report)
    }
}
