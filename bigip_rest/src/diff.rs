use std::collections::BTreeMap;

use serde_json::Value;

use bigip_utils::{fields_is_expected, keyname};

use crate::client::Bigip;
use crate::request::{opr2method, Method, Operation, RestRequest, Schedule};
use crate::state::{gather_kinds, Snapshot};
use crate::taxonomy::{layout_cmds, sort_cmds};
use crate::{ErrorKind, Result};

/// Declarative configuration: folder -> "<kind>/<name>" -> body.
///
/// The empty folder key addresses the partition root.
pub type ConfigTree = BTreeMap<String, BTreeMap<String, Value>>;

type RequestsByKind = BTreeMap<String, Vec<RestRequest>>;

fn get_from_exists<'a>(live: &'a Snapshot, kind: &str, partition: &str, subfolder: &str, name: &str) -> Option<&'a Value> {
    live.get(kind)?.get(&keyname(&[partition, subfolder, name]))
}

/// Stage 1: turn one side of the configuration into typed requests,
/// pre-classified against live presence.
///
/// Requests parked with a non-inline schedule never enter the pipeline.
fn cfg_to_requests(partition: &str, operation: Operation, cfg: &ConfigTree, live: &Snapshot) -> Result<RequestsByKind> {
    debug!(
        "generating '{:?}' cmds for partition {}'s config",
        operation, partition
    );
    let mut rrs = RequestsByKind::new();

    for (folder, ress) in cfg {
        if !folder.is_empty() {
            let mut r = RestRequest::folder(folder, partition);
            r.method = opr2method(
                operation,
                get_from_exists(live, "sys/folder", partition, "", folder).is_some(),
            );
            rrs.entry("sys/folder".to_string()).or_default().push(r);
        }

        for (tn, body) in ress {
            let (kind, name) = tn
                .rsplit_once('/')
                .ok_or_else(|| ErrorKind::MalformedTypedName(tn.clone()))?;
            let root = kind.split('/').next().unwrap_or_default();
            let r = match root {
                "ltm" | "net" | "sys" | "gtm" => {
                    let mut r = RestRequest::tm_resource(kind, name, partition, folder, body.clone());
                    r.method = opr2method(operation, get_from_exists(live, kind, partition, folder, name).is_some());
                    r
                }
                "shared" => RestRequest::shared_resource(kind, name, partition, folder, body, operation)?,
                other => return Err(ErrorKind::UnsupportedRootKind(other.to_string()).into()),
            };
            if r.schedule != Schedule::Inline {
                continue;
            }
            rrs.entry(kind.to_string()).or_default().push(r);
        }
    }
    Ok(rrs)
}

/// Stage 2: reconcile the delete-side and create-side request maps into
/// create/delete/update lists, then reclassify each candidate against the
/// live snapshot.
///
/// A create whose resource is already live degrades to an update, and an
/// update whose submitted fields the device already satisfies is dropped;
/// deploys converge to no-ops on a clean device.
fn sweep_cmds(dels: &RequestsByKind, crts: &RequestsByKind, live: &Snapshot) -> (Vec<RestRequest>, Vec<RestRequest>, Vec<RestRequest>) {
    let mut c = Vec::new();
    let mut d = Vec::new();
    let mut u = Vec::new();

    let kinds: std::collections::BTreeSet<&String> = dels.keys().chain(crts.keys()).collect();

    for kind in kinds {
        match (dels.get(kind.as_str()), crts.get(kind.as_str())) {
            (Some(dl), None) => d.extend(dl.iter().cloned()),
            (None, Some(cl)) => c.extend(cl.iter().cloned()),
            (Some(dl), Some(cl)) => {
                let dkeys: std::collections::BTreeSet<String> = dl.iter().map(|r| r.key()).collect();
                let ckeys: std::collections::BTreeSet<String> = cl.iter().map(|r| r.key()).collect();
                for r in cl {
                    if dkeys.contains(&r.key()) {
                        u.push(r.clone());
                    } else {
                        c.push(r.clone());
                    }
                }
                for r in dl {
                    if !ckeys.contains(&r.key()) {
                        d.push(r.clone());
                    }
                }
            }
            (None, None) => {}
        }
    }

    let lookup = |r: &RestRequest| -> Option<Value> {
        get_from_exists(live, &r.kind, &r.partition, &r.subfolder, &r.res_name).cloned()
    };

    let mut cc = Vec::new();
    let mut dd = Vec::new();
    let mut uu = Vec::new();

    for mut r in c {
        match lookup(&r) {
            None => {
                r.method = Method::Post;
                cc.push(r);
            }
            Some(actual) => {
                if let Some(submitted) = r.body.as_json() {
                    if !fields_is_expected(submitted, &actual) {
                        r.method = Method::Patch;
                        uu.push(r);
                    }
                }
            }
        }
    }
    for mut r in d {
        if lookup(&r).is_some() {
            r.method = Method::Delete;
            dd.push(r);
        }
    }
    for mut r in u {
        match lookup(&r) {
            None => {
                r.method = Method::Post;
                cc.push(r);
            }
            Some(actual) => {
                if let Some(submitted) = r.body.as_json() {
                    if !fields_is_expected(submitted, &actual) {
                        r.method = Method::Patch;
                        uu.push(r);
                    }
                }
            }
        }
    }

    (cc, dd, uu)
}

// a virtual-address created under a legacy naming convention carries a
// name that is not its address; such resources must be rebuilt, patching
// them in place is rejected by the device
fn virtual_address_name_mismatched(reqs: &[RestRequest]) -> bool {
    reqs.iter().any(|r| match r.body.as_json().and_then(|b| b.get("address")).and_then(Value::as_str) {
        Some(addr) => addr != r.res_name,
        None => false,
    })
}

/// Compute the full ordered command list for reconciling `partition` from
/// `ocfg` to `ncfg` given the live snapshot.
pub fn gen_cmds(
    partition: &str,
    ocfg: Option<&ConfigTree>,
    ncfg: Option<&ConfigTree>,
    live: &Snapshot,
) -> Result<Vec<RestRequest>> {
    let mut r_dels = match ocfg {
        Some(cfg) => cfg_to_requests(partition, Operation::Delete, cfg, live)?,
        None => RequestsByKind::new(),
    };
    let mut r_crts = match ncfg {
        Some(cfg) => cfg_to_requests(partition, Operation::Deploy, cfg, live)?,
        None => RequestsByKind::new(),
    };

    const VIRTUAL_KINDS: [&str; 2] = ["ltm/virtual", "ltm/virtual-address"];

    // Virtual-addresses whose name drifted from their address (a leftover
    // of migrations from other orchestrators) cannot be reconciled in
    // place: the pair of virtual + address is torn down and re-created
    // after the main command list, bypassing the live comparison.
    let mut vcmd_dels = Vec::new();
    let mut vcmd_crts = Vec::new();
    let mut va_reqs: Vec<RestRequest> = Vec::new();
    for side in &[&r_dels, &r_crts] {
        if let Some(l) = side.get("ltm/virtual-address") {
            va_reqs.extend(l.iter().cloned());
        }
    }
    if virtual_address_name_mismatched(&va_reqs) {
        let submap = |m: &RequestsByKind| -> RequestsByKind {
            VIRTUAL_KINDS
                .iter()
                .filter_map(|k| m.get(*k).map(|l| (k.to_string(), l.clone())))
                .collect()
        };
        let (cvl, dvl, uvl) = sweep_cmds(&submap(&r_dels), &submap(&r_crts), live);
        if cvl.len() + dvl.len() + uvl.len() != 0 {
            let mut dels_list = Vec::new();
            let mut crts_list = Vec::new();
            for k in &VIRTUAL_KINDS {
                dels_list.extend(r_dels.remove(*k).unwrap_or_default());
                crts_list.extend(r_crts.remove(*k).unwrap_or_default());
            }
            vcmd_dels = sort_cmds(dels_list, true);
            for r in &mut vcmd_dels {
                r.method = Method::Delete;
            }
            vcmd_crts = sort_cmds(crts_list, false);
            for r in &mut vcmd_crts {
                r.method = Method::Post;
            }
        }
    }

    let (cl, dl, ul) = sweep_cmds(&r_dels, &r_crts, live);
    let mut cmds = layout_cmds(cl, dl, ul);
    cmds.extend(vcmd_dels);
    cmds.extend(vcmd_crts);

    if let Ok(bcmds) = serde_json::to_string(&cmds) {
        debug!("commands: {}", bcmds);
    }
    Ok(cmds)
}

impl Bigip {
    /// Fetch live state and compute the ordered command list.
    pub async fn gen_rest_requests(
        &self,
        partition: &str,
        ocfg: Option<&ConfigTree>,
        ncfg: Option<&ConfigTree>,
    ) -> Result<Vec<RestRequest>> {
        let _t = bigip_utils::metrics::time_it("gen_rest_requests");
        let kinds = gather_kinds(ocfg, ncfg);
        let live = self.get_existing_resources(partition, &kinds).await?;
        gen_cmds(partition, ocfg, ncfg, &live)
    }
}
