use crate::adapters::process::run_command;
use crate::config::{NginxConfig, STAGE_CONFIG_PLACEHOLDER};
use crate::domain::model::Artifact;
use crate::domain::ports::ProxyControl;
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Drives nginx through configurable command lines (`nginx -t`, `systemctl reload nginx`).
pub struct NginxControl {
    stage_command: Vec<String>,
    validate_command: Vec<String>,
    reload_command: Vec<String>,
}

impl NginxControl {
    pub fn new(validate_command: Vec<String>, reload_command: Vec<String>) -> Self {
        Self {
            stage_command: Vec::new(),
            validate_command,
            reload_command,
        }
    }

    /// Command checking staged files; `{config}` is replaced by the scratch config path.
    pub fn with_stage_command(mut self, stage_command: Vec<String>) -> Self {
        self.stage_command = stage_command;
        self
    }

    pub fn from_config(config: &NginxConfig) -> Self {
        Self::new(
            config.validate_command.clone(),
            config.reload_command.clone(),
        )
        .with_stage_command(config.stage_validate_command.clone())
    }
}

/// Minimal nginx.conf that loads nothing but the staged files.
fn scratch_config(dir: &Path, includes: &[PathBuf]) -> String {
    let mut out = String::new();
    out.push_str(&format!("pid \"{}\";\n", dir.join("nginx.pid").display()));
    out.push_str("error_log stderr;\n");
    out.push_str("events {}\n");
    out.push_str("http {\n");
    for path in includes {
        out.push_str(&format!("    include \"{}\";\n", path.display()));
    }
    out.push_str("}\n");
    out
}

#[async_trait]
impl ProxyControl for NginxControl {
    async fn check_staged(&self, artifacts: &[Artifact]) -> Result<()> {
        if self.stage_command.is_empty() {
            tracing::debug!("Staged check disabled");
            return Ok(());
        }

        // Removed on drop, whatever the outcome.
        let stage = tempfile::Builder::new().prefix("edge-ip-sync-").tempdir()?;
        let mut includes = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let staged = stage.path().join(format!("{}.conf", artifact.kind));
            tokio::fs::write(&staged, artifact.content.as_bytes()).await?;
            includes.push(staged);
        }
        let config_path = stage.path().join("nginx.conf");
        tokio::fs::write(&config_path, scratch_config(stage.path(), &includes)).await?;

        let config_arg = config_path.to_string_lossy();
        let argv: Vec<String> = self
            .stage_command
            .iter()
            .map(|arg| arg.replace(STAGE_CONFIG_PLACEHOLDER, &config_arg))
            .collect();

        let output = run_command(&argv).await?;
        if output.success {
            Ok(())
        } else {
            Err(SyncError::ValidationFailed {
                output: output.diagnostics(),
            })
        }
    }

    async fn validate(&self) -> Result<()> {
        let output = run_command(&self.validate_command).await?;
        if output.success {
            Ok(())
        } else {
            Err(SyncError::ValidationFailed {
                output: output.diagnostics(),
            })
        }
    }

    async fn reload(&self) -> Result<()> {
        let output = run_command(&self.reload_command)
            .await
            .map_err(|e| SyncError::ReloadFailed {
                output: e.to_string(),
            })?;
        if output.success {
            Ok(())
        } else {
            Err(SyncError::ReloadFailed {
                output: output.diagnostics(),
            })
        }
    }
}
