//! nginx snippets generated from a [`RangeSet`].
//!
//! Output carries no timestamps so identical input renders byte-identical files.

use crate::config::NginxConfig;
use crate::domain::model::{Artifact, ArtifactKind, RangeSet, RenderedConfig};

pub const HEADER: &str = "# Managed by edge-ip-sync. Manual changes will be overwritten.\n";

/// `set_real_ip_from` for every range, then the trusted header.
pub fn render_real_ip(ranges: &RangeSet, real_ip_header: &str) -> String {
    let mut out = String::from(HEADER);

    out.push_str("\n# IPv4\n");
    for range in &ranges.ipv4 {
        out.push_str(&format!("set_real_ip_from {};\n", range));
    }
    out.push_str("\n# IPv6\n");
    for range in &ranges.ipv6 {
        out.push_str(&format!("set_real_ip_from {};\n", range));
    }

    out.push_str(&format!("\nreal_ip_header {};\n", real_ip_header));
    out
}

/// `geo` block mapping every range to 1, everything else to 0.
pub fn render_geo(ranges: &RangeSet, geo_source: &str, geo_variable: &str) -> String {
    let mut out = String::from(HEADER);

    out.push_str(&format!("\ngeo {} {} {{\n", geo_source, geo_variable));
    out.push_str("    default 0;\n");
    for range in ranges.all() {
        out.push_str(&format!("    {} 1;\n", range));
    }
    out.push_str("}\n");
    out
}

pub fn render(ranges: RangeSet, nginx: &NginxConfig) -> RenderedConfig {
    let artifacts = vec![
        Artifact {
            kind: ArtifactKind::RealIp,
            path: nginx.real_ip_path.clone(),
            content: render_real_ip(&ranges, &nginx.real_ip_header),
        },
        Artifact {
            kind: ArtifactKind::Geo,
            path: nginx.geo_path.clone(),
            content: render_geo(&ranges, &nginx.geo_source, &nginx.geo_variable),
        },
    ];

    RenderedConfig { ranges, artifacts }
}
