use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Failed to replace file: {0}")]
    PersistError(#[from] tempfile::PersistError),

    #[error("Fetch from {url} failed: {reason}")]
    FetchError { url: String, reason: String },

    #[error("Invalid IP range '{line}': {reason}")]
    InvalidRange { line: String, reason: String },

    #[error("Upstream returned no {family} ranges")]
    EmptyRangeList { family: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Command `{command}` failed ({status}): {stderr}")]
    CommandError {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Firewall error: {message}")]
    FirewallError { message: String },

    #[error("Proxy rejected the new configuration: {output}")]
    ValidationFailed { output: String },

    #[error("Proxy reload failed: {output}")]
    ReloadFailed { output: String },

    #[error("Could not restore {files} after the proxy rejected them ({cause}); restore failed: {reason}")]
    RollbackFailed {
        files: String,
        cause: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Configuration,
    Firewall,
    Proxy,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Transient, worth retrying on the next scheduled run.
    Medium,
    High,
    Critical,
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::ApiError(_) | SyncError::FetchError { .. } => ErrorCategory::Network,
            SyncError::SerializationError(_)
            | SyncError::InvalidRange { .. }
            | SyncError::EmptyRangeList { .. } => ErrorCategory::Data,
            SyncError::ConfigValidationError { .. } | SyncError::InvalidConfigValueError { .. } => {
                ErrorCategory::Configuration
            }
            SyncError::FirewallError { .. } => ErrorCategory::Firewall,
            SyncError::ValidationFailed { .. } | SyncError::ReloadFailed { .. } => {
                ErrorCategory::Proxy
            }
            SyncError::IoError(_)
            | SyncError::PersistError(_)
            | SyncError::CommandError { .. }
            | SyncError::RollbackFailed { .. } => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data
            | ErrorCategory::Configuration
            | ErrorCategory::Firewall
            | ErrorCategory::Proxy => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SyncError::ApiError(_) | SyncError::FetchError { .. } => {
                "Check network connectivity to the provider endpoints; the next run will retry"
            }
            SyncError::SerializationError(_) => {
                "The provider API response format may have changed; try source.format = \"text\""
            }
            SyncError::InvalidRange { .. } | SyncError::EmptyRangeList { .. } => {
                "Upstream data looks malformed or truncated; existing configuration was kept"
            }
            SyncError::ConfigValidationError { .. } | SyncError::InvalidConfigValueError { .. } => {
                "Fix the configuration file and rerun with --validate"
            }
            SyncError::FirewallError { .. } => {
                "Inspect `ufw show added` and make sure the tool runs as root"
            }
            SyncError::ValidationFailed { .. } => {
                "Run `nginx -t` to see why the generated files were rejected; the existing configuration was kept"
            }
            SyncError::ReloadFailed { .. } => {
                "New files are in place; reload the proxy manually once the cause is fixed"
            }
            SyncError::RollbackFailed { .. } => {
                "Rejected files are still in place: restore them by hand and check `nginx -t` before any reload or restart"
            }
            SyncError::IoError(_) | SyncError::PersistError(_) | SyncError::CommandError { .. } => {
                "Check file permissions and that the required tools are installed"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not fetch IP ranges: {}", self),
            ErrorCategory::Data => format!("Fetched IP ranges were rejected: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Firewall => format!("Firewall update failed: {}", self),
            ErrorCategory::Proxy => format!("Proxy update failed: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
