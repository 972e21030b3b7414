use crate::utils::error::{Result, SyncError};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    fn max_prefix(self) -> u8 {
        match self {
            IpFamily::V4 => 32,
            IpFamily::V6 => 128,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => f.write_str("IPv4"),
            IpFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// An address plus prefix length, e.g. `173.245.48.0/20`.
///
/// Always held in network form: host bits below the prefix are cleared, so
/// `10.0.0.1/8` and `10.0.0.0/8` are the same range, as the firewall sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    addr: IpAddr,
    prefix: u8,
}

impl IpRange {
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self> {
        let family = family_of(&addr);
        if prefix > family.max_prefix() {
            return Err(SyncError::InvalidRange {
                line: format!("{}/{}", addr, prefix),
                reason: format!("prefix exceeds {} for {}", family.max_prefix(), family),
            });
        }
        Ok(Self {
            addr: network_address(addr, prefix),
            prefix,
        })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn family(&self) -> IpFamily {
        family_of(&self.addr)
    }
}

fn network_address(addr: IpAddr, prefix: u8) -> IpAddr {
    // checked_shl yields None for a full-width shift, i.e. a /0 mask.
    match addr {
        IpAddr::V4(v4) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
        }
        IpAddr::V6(v6) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
        }
    }
}

fn family_of(addr: &IpAddr) -> IpFamily {
    match addr {
        IpAddr::V4(_) => IpFamily::V4,
        IpAddr::V6(_) => IpFamily::V6,
    }
}

impl FromStr for IpRange {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| SyncError::InvalidRange {
            line: s.to_string(),
            reason: reason.to_string(),
        };

        let (addr_part, prefix_part) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| invalid("not an IP address"))?;

        let prefix = match prefix_part {
            Some(p) => p.parse::<u8>().map_err(|_| invalid("bad prefix length"))?,
            None => family_of(&addr).max_prefix(),
        };

        IpRange::new(addr, prefix).map_err(|_| invalid("prefix length out of range"))
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Ranges published by the provider, de-duplicated in upstream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    pub ipv4: Vec<IpRange>,
    pub ipv6: Vec<IpRange>,
}

impl RangeSet {
    pub fn all(&self) -> impl Iterator<Item = &IpRange> {
        self.ipv4.iter().chain(self.ipv6.iter())
    }

    pub fn len(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }
}

/// Parse a newline separated list of ranges, all of the given family.
///
/// Blank lines and `#` comments are skipped, duplicates are dropped keeping the
/// first occurrence. An empty result is an error so that a truncated response
/// can never shrink the allow-list to nothing.
pub fn parse_range_list<'a, I>(lines: I, family: IpFamily) -> Result<Vec<IpRange>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut ranges = Vec::new();

    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let range: IpRange = line.parse()?;
        if range.family() != family {
            return Err(SyncError::InvalidRange {
                line: line.to_string(),
                reason: format!("expected an {} range", family),
            });
        }

        if seen.insert(range) {
            ranges.push(range);
        }
    }

    if ranges.is_empty() {
        return Err(SyncError::EmptyRangeList {
            family: family.to_string(),
        });
    }

    Ok(ranges)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    RealIp,
    Geo,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::RealIp => f.write_str("real-ip"),
            ArtifactKind::Geo => f.write_str("geo"),
        }
    }
}

/// A generated configuration file and where it belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct RenderedConfig {
    pub ranges: RangeSet,
    pub artifacts: Vec<Artifact>,
}

/// `allow [proto P] from <range> to any [port a,b] comment '<tag>'`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FirewallRule {
    pub source: IpRange,
    pub protocol: Option<String>,
    pub ports: Vec<u16>,
    pub comment: String,
}

impl FirewallRule {
    /// Port list in the comma separated form the firewall CLI expects.
    pub fn port_spec(&self) -> Option<String> {
        if self.ports.is_empty() {
            return None;
        }
        Some(
            self.ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("allow")?;
        if let Some(proto) = &self.protocol {
            write!(f, " proto {}", proto)?;
        }
        write!(f, " from {} to any", self.source)?;
        if let Some(ports) = self.port_spec() {
            write!(f, " port {}", ports)?;
        }
        write!(f, " comment '{}'", self.comment)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallPlan {
    pub add: Vec<FirewallRule>,
    pub delete: Vec<FirewallRule>,
    pub keep: Vec<FirewallRule>,
}

impl FirewallPlan {
    pub fn is_noop(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FirewallSummary {
    pub skipped: bool,
    pub ipv6_enabled: bool,
    pub added: usize,
    pub deleted: usize,
    pub kept: usize,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub ipv4_ranges: usize,
    pub ipv6_ranges: usize,
    pub firewall: FirewallSummary,
    pub changed_files: Vec<PathBuf>,
    pub reloaded: bool,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn config_changed(&self) -> bool {
        !self.changed_files.is_empty()
    }
}
