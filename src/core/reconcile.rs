use crate::config::FirewallConfig;
use crate::domain::model::{FirewallPlan, FirewallRule, RangeSet};
use std::collections::HashSet;

/// One allow rule per range in scope, IPv4 first.
pub fn desired_rules(
    ranges: &RangeSet,
    firewall: &FirewallConfig,
    include_ipv6: bool,
) -> Vec<FirewallRule> {
    let v6: &[_] = if include_ipv6 { &ranges.ipv6 } else { &[] };
    ranges
        .ipv4
        .iter()
        .chain(v6.iter())
        .map(|range| FirewallRule {
            source: *range,
            protocol: firewall.protocol_filter(),
            ports: firewall.ports.clone(),
            comment: firewall.comment.clone(),
        })
        .collect()
}

/// Diff the tagged rules present on the host against the desired ones.
///
/// Existing rules matching a desired rule are kept; rules that no longer match
/// (gone range, changed ports/protocol) are deleted. Deleting goes by rule
/// spec, which removes every copy, so each spec is planned at most once.
pub fn plan(existing: &[FirewallRule], desired: &[FirewallRule]) -> FirewallPlan {
    let wanted: HashSet<&FirewallRule> = desired.iter().collect();
    let mut kept: HashSet<&FirewallRule> = HashSet::new();
    let mut deleted: HashSet<&FirewallRule> = HashSet::new();
    let mut result = FirewallPlan::default();

    for rule in existing {
        if wanted.contains(rule) {
            if kept.insert(rule) {
                result.keep.push(rule.clone());
            }
        } else if deleted.insert(rule) {
            result.delete.push(rule.clone());
        }
    }

    let mut queued: HashSet<&FirewallRule> = HashSet::new();
    for rule in desired {
        if !kept.contains(rule) && queued.insert(rule) {
            result.add.push(rule.clone());
        }
    }

    result
}
