use regex::Regex;

use crate::request::RestRequest;

/// Deployment order of resource kinds, dependencies first.
///
/// Deletion walks the same table backwards so dependents disappear before
/// the resources they reference. Every kind matching one pattern is
/// emitted as a single contiguous run.
const RES_ORDER: &[&str] = &[
    r"sys/folder",
    r"shared/file-transfer/uploads",
    r"sys/file/ssl-(cert|key)",
    r"ltm/monitor/\w+",
    r"ltm/node",
    r"ltm/pool",
    r"ltm/snat-translation",
    r"ltm/snatpool",
    r"ltm/profile/\w+",
    r"ltm/persistence/\w+",
    r"ltm/snat$",
    r"ltm/rule$",
    r"ltm/virtual-address",
    r"ltm/virtual$",
    r"net/arp$",
    r"net/fdb/tunnel$",
    r"net/ndp$",
    r"net/routing/bgp$",
];

// kinds handled outside the ordered deployment pipeline
const EXTRA_KINDS: &[&str] = &[
    r"^ltm/data-group/internal$",
    r"^net/fdb/tunnel/[^/]+/records$",
    r"^net/routing/bgp/[^/]+/neighbor$",
];

lazy_static! {
    static ref ORDER_PATTERNS: Vec<Regex> = RES_ORDER.iter().map(|p| Regex::new(p).unwrap()).collect();
    static ref EXTRA_PATTERNS: Vec<Regex> = EXTRA_KINDS.iter().map(|p| Regex::new(p).unwrap()).collect();
}

/// True when the kind participates in deployment or is one of the
/// whitelisted side kinds.
pub fn kind_is_supported(kind: &str) -> bool {
    ORDER_PATTERNS.iter().any(|p| p.is_match(kind)) || EXTRA_PATTERNS.iter().any(|p| p.is_match(kind))
}

/// Index of the first order pattern matching `kind`, if any.
fn order_index(kind: &str) -> Option<usize> {
    ORDER_PATTERNS.iter().position(|p| p.is_match(kind))
}

/// Group by kind and emit the groups in taxonomy order.
///
/// `reversed` walks the table backwards (deletion order). Within a kind
/// the insertion order is preserved; kinds outside the table are dropped,
/// they never reach the executor through this path.
pub fn sort_cmds(list: Vec<RestRequest>, reversed: bool) -> Vec<RestRequest> {
    // first-seen kind grouping keeps within-kind insertion order
    let mut kinds: Vec<String> = Vec::new();
    let mut groups: std::collections::BTreeMap<String, Vec<RestRequest>> = Default::default();
    for r in list {
        if !groups.contains_key(&r.kind) {
            kinds.push(r.kind.clone());
        }
        groups.entry(r.kind.clone()).or_default().push(r);
    }

    let indices: Vec<usize> = if reversed {
        (0..ORDER_PATTERNS.len()).rev().collect()
    } else {
        (0..ORDER_PATTERNS.len()).collect()
    };

    let mut out = Vec::new();
    for i in indices {
        for kind in &kinds {
            if order_index(kind) == Some(i) {
                if let Some(run) = groups.remove(kind) {
                    out.extend(run);
                }
            }
        }
    }
    out
}

/// Full command layout: creates forward, updates forward, deletes
/// backward. Creates lay down dependencies first; updates mutate in the
/// same order because their dependencies already exist; deletes run last
/// so dependents go before their dependencies.
pub fn layout_cmds(creates: Vec<RestRequest>, deletes: Vec<RestRequest>, updates: Vec<RestRequest>) -> Vec<RestRequest> {
    let mut cmds = sort_cmds(creates, false);
    cmds.extend(sort_cmds(updates, false));
    cmds.extend(sort_cmds(deletes, true));
    cmds
}
