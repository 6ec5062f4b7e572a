use std::collections::BTreeMap;

use serde_json::Value;

use bigip_utils::{keyname, unified};

use crate::client::Bigip;
use crate::diff::ConfigTree;
use crate::taxonomy::kind_is_supported;
use crate::{ErrorKind, Result, ResultExt};

/// Live device state: kind -> resource key -> resource body.
pub type Snapshot = BTreeMap<String, BTreeMap<String, Value>>;

/// Every kind named by either config tree, plus the folders that anchor
/// them.
pub fn gather_kinds(ocfg: Option<&ConfigTree>, ncfg: Option<&ConfigTree>) -> Vec<String> {
    let mut kinds = vec!["sys/folder".to_string()];
    for cfg in ocfg.iter().chain(ncfg.iter()) {
        for ress in cfg.values() {
            for tn in ress.keys() {
                if let Some((kind, _)) = tn.rsplit_once('/') {
                    kinds.push(kind.to_string());
                }
            }
        }
    }
    unified(kinds)
}

impl Bigip {
    /// Pull the current resources of `partition` for the given kinds.
    ///
    /// A missing partition yields an empty snapshot (it is about to be
    /// created); a kind the device answers 404 for yields an empty map for
    /// that kind. Anything else aborts the read.
    pub async fn get_existing_resources(&self, partition: &str, kinds: &[String]) -> Result<Snapshot> {
        let _t = bigip_utils::metrics::time_it("get_existing_resources");

        let mut exists = Snapshot::new();
        let partitions = self
            .list_partitions()
            .await
            .chain_err(|| "failed to list partitions for checking res existence")?;
        if !partitions.iter().any(|p| p == partition) {
            return Ok(exists);
        }

        for kind in kinds {
            if !listable(kind) {
                debug!("skipping existence listing for kind {}", kind);
                continue;
            }
            let resp = match self.all(&format!("{}?$filter=partition+eq+{}", kind, partition)).await {
                Ok(v) => v,
                Err(e) => {
                    if let ErrorKind::UnexpectedHttpStatus(404, _) = e.kind() {
                        exists.insert(kind.clone(), BTreeMap::new());
                        continue;
                    }
                    return Err(e).chain_err(|| format!("failed to list '{}' of {}", kind, partition));
                }
            };
            let items = resp
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| ErrorKind::MissingField("items".into(), format!("{} listing", kind)))?;
            let entry = exists.entry(kind.clone()).or_default();
            for item in items {
                let name = item
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ErrorKind::MissingField("name".into(), format!("{} item", kind)))?;
                let subfolder = item.get("subPath").and_then(Value::as_str).unwrap_or("");
                entry.insert(keyname(&[partition, subfolder, name]), item.clone());
            }
        }
        Ok(exists)
    }

    /// Partition names, extracted from the first path segment of every
    /// `sys/folder` entry.
    pub async fn list_partitions(&self) -> Result<Vec<String>> {
        let resp = self.all("sys/folder").await.chain_err(|| "failed to list partitions")?;
        let items = resp
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| ErrorKind::MissingField("items".into(), "sys/folder listing".into()))?;
        let mut partitions = Vec::new();
        for item in items {
            if let Some(full_path) = item.get("fullPath").and_then(Value::as_str) {
                let paths: Vec<&str> = full_path.split('/').collect();
                if paths.len() == 2 && !paths[1].is_empty() {
                    partitions.push(paths[1].to_string());
                }
            }
        }
        Ok(unified(partitions))
    }
}

// the reader can only list the tm tree; shared/ and gtm/ kinds never show
// up in partition snapshots
fn listable(kind: &str) -> bool {
    (kind.starts_with("sys/") || kind.starts_with("ltm/") || kind.starts_with("net/")) && kind_is_supported(kind)
}
