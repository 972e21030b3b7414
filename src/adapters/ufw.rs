//! ufw-backed [`Firewall`].
//!
//! Rules are listed with `ufw show added`, which prints every user rule as a
//! command line. ufw normalizes the order, so `proto` follows the port list:
//!
//! ```text
//! Added user rules (see 'ufw status' for running firewall):
//! ufw allow from 173.245.48.0/20 to any port 80,443 proto tcp comment 'Cloudflare IP'
//! ```
//!
//! The parser looks tokens up by keyword and accepts either order.

use crate::adapters::process::run_checked;
use crate::domain::model::FirewallRule;
use crate::domain::ports::Firewall;
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct UfwFirewall {
    binary: String,
    ipv6_config_path: PathBuf,
}

impl UfwFirewall {
    pub fn new(binary: impl Into<String>, ipv6_config_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ipv6_config_path: ipv6_config_path.into(),
        }
    }

    fn argv(&self, args: Vec<String>) -> Vec<String> {
        std::iter::once(self.binary.clone()).chain(args).collect()
    }

    async fn run(&self, args: Vec<String>) -> Result<String> {
        let argv = self.argv(args);
        run_checked(&argv)
            .await
            .map(|output| output.stdout)
            .map_err(|e| SyncError::FirewallError {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Firewall for UfwFirewall {
    async fn ipv6_enabled(&self) -> Result<bool> {
        match std::fs::read_to_string(&self.ipv6_config_path) {
            Ok(content) => Ok(parse_ipv6_flag(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "{} not found, treating IPv6 as disabled",
                    self.ipv6_config_path.display()
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_tagged(&self, tag: &str) -> Result<Vec<FirewallRule>> {
        let output = self.run(vec!["show".to_string(), "added".to_string()]).await?;
        Ok(parse_added_rules(&output, tag))
    }

    async fn add(&self, rule: &FirewallRule) -> Result<()> {
        let mut args = rule_args(rule);
        args.push("comment".to_string());
        args.push(rule.comment.clone());
        self.run(args).await?;
        Ok(())
    }

    async fn delete(&self, rule: &FirewallRule) -> Result<()> {
        let mut args = vec!["delete".to_string()];
        args.extend(rule_args(rule));
        self.run(args).await?;
        Ok(())
    }
}

/// `allow [proto P] from R to any [port L]` as separate argv entries.
fn rule_args(rule: &FirewallRule) -> Vec<String> {
    let mut args = vec!["allow".to_string()];
    if let Some(proto) = &rule.protocol {
        args.push("proto".to_string());
        args.push(proto.clone());
    }
    args.extend([
        "from".to_string(),
        rule.source.to_string(),
        "to".to_string(),
        "any".to_string(),
    ]);
    if let Some(ports) = rule.port_spec() {
        args.push("port".to_string());
        args.push(ports);
    }
    args
}

/// `IPV6=yes` in `/etc/default/ufw`, quotes and case tolerated. Last assignment wins.
pub fn parse_ipv6_flag(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| key.trim() == "IPV6")
        .map(|(_, value)| {
            value
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .eq_ignore_ascii_case("yes")
        })
        .last()
        .unwrap_or(false)
}

/// Rules from `ufw show added` output whose comment equals `tag`.
pub fn parse_added_rules(output: &str, tag: &str) -> Vec<FirewallRule> {
    let marker = format!(" comment '{}'", tag);
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let spec = line.strip_suffix(marker.as_str())?;
            match parse_rule_spec(spec, tag) {
                Some(rule) => Some(rule),
                None => {
                    tracing::warn!("Ignoring tagged rule in unexpected form: {}", line);
                    None
                }
            }
        })
        .collect()
}

fn parse_rule_spec(spec: &str, tag: &str) -> Option<FirewallRule> {
    let tokens: Vec<&str> = spec.split_whitespace().collect();
    let tokens = match tokens.first() {
        Some(&"ufw") => &tokens[1..],
        _ => &tokens[..],
    };
    if tokens.first() != Some(&"allow") {
        return None;
    }

    let value_after = |key: &str| {
        tokens
            .iter()
            .position(|t| *t == key)
            .and_then(|i| tokens.get(i + 1))
            .copied()
    };

    let source = value_after("from")?.parse().ok()?;
    let protocol = value_after("proto").map(str::to_string);
    let ports = match value_after("port") {
        Some(list) => list
            .split(',')
            .map(|p| p.parse::<u16>().ok())
            .collect::<Option<Vec<_>>>()?,
        None => Vec::new(),
    };

    Some(FirewallRule {
        source,
        protocol,
        ports,
        comment: tag.to_string(),
    })
}
