use crate::utils::error::{Result, SyncError};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stderr, or stdout when the tool reports on stdout only.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Run `argv` to completion, capturing output. A non-zero exit is not an error here.
pub async fn run_command(argv: &[String]) -> Result<CommandOutput> {
    let (program, args) = argv.split_first().ok_or_else(|| SyncError::ConfigValidationError {
        field: "command".to_string(),
        message: "empty command line".to_string(),
    })?;

    tracing::debug!("Running: {}", argv.join(" "));
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SyncError::CommandError {
            command: argv.join(" "),
            status: "not started".to_string(),
            stderr: e.to_string(),
        })?;

    Ok(CommandOutput {
        success: output.status.success(),
        status: output.status.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Like [`run_command`] but a non-zero exit becomes `CommandError`.
pub async fn run_checked(argv: &[String]) -> Result<CommandOutput> {
    let output = run_command(argv).await?;
    if output.success {
        Ok(output)
    } else {
        Err(SyncError::CommandError {
            command: argv.join(" "),
            status: output.status.clone(),
            stderr: output.diagnostics(),
        })
    }
}
