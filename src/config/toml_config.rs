use crate::utils::error::{Result, SyncError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Replaced by the scratch configuration path in `nginx.stage_validate_command`.
pub const STAGE_CONFIG_PLACEHOLDER: &str = "{config}";

/// Full configuration. Every section and field has a default, so an empty
/// file (or no file at all) describes the stock Cloudflare + nginx + ufw setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub source: SourceConfig,
    pub nginx: NginxConfig,
    pub firewall: FirewallConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Two plain-text endpoints, one range per line.
    #[default]
    Text,
    /// The provider's JSON API returning both families at once.
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub format: SourceFormat,
    pub ipv4_url: String,
    pub ipv6_url: String,
    pub api_url: String,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            format: SourceFormat::Text,
            ipv4_url: "https://www.cloudflare.com/ips-v4".to_string(),
            ipv6_url: "https://www.cloudflare.com/ips-v6".to_string(),
            api_url: "https://api.cloudflare.com/client/v4/ips".to_string(),
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_seconds: 2,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NginxConfig {
    pub real_ip_path: PathBuf,
    pub geo_path: PathBuf,
    pub real_ip_header: String,
    /// Address the geo block classifies; `$realip_remote_addr` is the peer
    /// before real-IP substitution.
    pub geo_source: String,
    pub geo_variable: String,
    /// Checks the generated files on their own before they replace anything.
    /// `{config}` becomes a scratch nginx.conf including them; empty disables.
    pub stage_validate_command: Vec<String>,
    pub validate_command: Vec<String>,
    pub reload_command: Vec<String>,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            real_ip_path: PathBuf::from("/etc/nginx/conf.d/cloudflare_real_ip.conf"),
            geo_path: PathBuf::from("/etc/nginx/conf.d/cloudflare_geo.conf"),
            real_ip_header: "CF-Connecting-IP".to_string(),
            geo_source: "$realip_remote_addr".to_string(),
            geo_variable: "$cloudflare_ip".to_string(),
            stage_validate_command: vec![
                "nginx".to_string(),
                "-t".to_string(),
                "-c".to_string(),
                STAGE_CONFIG_PLACEHOLDER.to_string(),
            ],
            validate_command: vec!["nginx".to_string(), "-t".to_string()],
            reload_command: vec![
                "systemctl".to_string(),
                "reload".to_string(),
                "nginx".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub enabled: bool,
    pub binary: String,
    pub comment: String,
    /// `tcp`, `udp` or `any`.
    pub protocol: String,
    pub ports: Vec<u16>,
    pub ipv6_config_path: PathBuf,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "ufw".to_string(),
            comment: "Cloudflare IP".to_string(),
            protocol: "tcp".to_string(),
            ports: vec![80, 443],
            ipv6_config_path: PathBuf::from("/etc/default/ufw"),
        }
    }
}

impl FirewallConfig {
    /// Protocol restriction for generated rules; `any` means none.
    pub fn protocol_filter(&self) -> Option<String> {
        match self.protocol.as_str() {
            "any" => None,
            proto => Some(proto.to_string()),
        }
    }
}

impl SyncConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SyncError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Load `path` when it exists, built-in defaults otherwise.
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(
                "No configuration at {}, using defaults",
                path.as_ref().display()
            );
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SyncError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SyncError::ConfigValidationError {
            field: "toml_serialization".to_string(),
            message: e.to_string(),
        })
    }

    /// 替換環境變數 (例如 ${NGINX_CONF_DIR})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| {
            SyncError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: e.to_string(),
            }
        })?;

        // `$realip_remote_addr` and friends have no braces and pass through untouched.
        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        match self.source.format {
            SourceFormat::Text => {
                validation::validate_url("source.ipv4_url", &self.source.ipv4_url)?;
                validation::validate_url("source.ipv6_url", &self.source.ipv6_url)?;
            }
            SourceFormat::Json => {
                validation::validate_url("source.api_url", &self.source.api_url)?;
            }
        }
        validation::validate_positive_number("source.timeout_seconds", self.source.timeout_seconds, 1)?;
        validation::validate_range("source.retry_attempts", self.source.retry_attempts, 0, 10)?;

        validation::validate_path("nginx.real_ip_path", &self.nginx.real_ip_path.to_string_lossy())?;
        validation::validate_path("nginx.geo_path", &self.nginx.geo_path.to_string_lossy())?;
        if self.nginx.real_ip_path == self.nginx.geo_path {
            return Err(SyncError::ConfigValidationError {
                field: "nginx.geo_path".to_string(),
                message: "must differ from nginx.real_ip_path".to_string(),
            });
        }
        validation::validate_non_empty_string("nginx.real_ip_header", &self.nginx.real_ip_header)?;
        validate_nginx_variable("nginx.geo_source", &self.nginx.geo_source)?;
        validate_nginx_variable("nginx.geo_variable", &self.nginx.geo_variable)?;
        if !self.nginx.stage_validate_command.is_empty() {
            validation::validate_command(
                "nginx.stage_validate_command",
                &self.nginx.stage_validate_command,
            )?;
            if !self
                .nginx
                .stage_validate_command
                .iter()
                .any(|arg| arg.contains(STAGE_CONFIG_PLACEHOLDER))
            {
                return Err(SyncError::InvalidConfigValueError {
                    field: "nginx.stage_validate_command".to_string(),
                    value: self.nginx.stage_validate_command.join(" "),
                    reason: format!("Must pass the scratch config via {}", STAGE_CONFIG_PLACEHOLDER),
                });
            }
        }
        validation::validate_command("nginx.validate_command", &self.nginx.validate_command)?;
        validation::validate_command("nginx.reload_command", &self.nginx.reload_command)?;

        if self.firewall.enabled {
            validation::validate_non_empty_string("firewall.binary", &self.firewall.binary)?;
            validation::validate_non_empty_string("firewall.comment", &self.firewall.comment)?;
            if self.firewall.comment.contains(['\'', '"']) {
                return Err(SyncError::InvalidConfigValueError {
                    field: "firewall.comment".to_string(),
                    value: self.firewall.comment.clone(),
                    reason: "Comment cannot contain quotes".to_string(),
                });
            }
            if self.firewall.ports.is_empty() {
                return Err(SyncError::ConfigValidationError {
                    field: "firewall.ports".to_string(),
                    message: "At least one port is required".to_string(),
                });
            }
            if self.firewall.ports.contains(&0) {
                return Err(SyncError::InvalidConfigValueError {
                    field: "firewall.ports".to_string(),
                    value: "0".to_string(),
                    reason: "Port 0 is not a valid destination".to_string(),
                });
            }
            if !matches!(self.firewall.protocol.as_str(), "tcp" | "udp" | "any") {
                return Err(SyncError::InvalidConfigValueError {
                    field: "firewall.protocol".to_string(),
                    value: self.firewall.protocol.clone(),
                    reason: "Supported protocols: tcp, udp, any".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn validate_nginx_variable(field: &str, value: &str) -> Result<()> {
    let valid = value.len() > 1
        && value.starts_with('$')
        && value[1..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SyncError::InvalidConfigValueError {
            field: field.to_string(),
            value: value.to_string(),
            reason: "Expected an nginx variable such as $cloudflare_ip".to_string(),
        })
    }
}

impl Validate for SyncConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
