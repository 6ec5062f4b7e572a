use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use bigip_utils::keyname;

use crate::client::Bigip;
use crate::{ErrorKind, Result};

fn items_of(resp: &Value, context: &str) -> Result<Vec<Value>> {
    resp.get("items")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| ErrorKind::MissingField("items".into(), context.to_string()).into())
}

impl Bigip {
    /// Addresses of a pool's current members.
    pub async fn members(&self, poolname: &str, partition: &str, subfolder: &str) -> Result<Vec<String>> {
        let name = format!("{}/members", poolname);
        let resp = match self.exist("ltm/pool", &name, partition, subfolder).await? {
            None => return Ok(Vec::new()),
            Some(v) => v,
        };
        let mut members = Vec::new();
        for mb in items_of(&resp, "pool members")? {
            if let Some(addr) = mb.get("address").and_then(Value::as_str) {
                members.push(addr.to_string());
            }
        }
        Ok(members)
    }

    /// Arp table: ip address -> partition-qualified mac.
    pub async fn arps(&self) -> Result<BTreeMap<String, String>> {
        let _t = bigip_utils::metrics::time_it("arps");
        self.neighbor_table("net/arp").await
    }

    /// Ndp table: ip address -> partition-qualified mac.
    pub async fn ndps(&self) -> Result<BTreeMap<String, String>> {
        let _t = bigip_utils::metrics::time_it("ndps");
        self.neighbor_table("net/ndp").await
    }

    async fn neighbor_table(&self, kind: &str) -> Result<BTreeMap<String, String>> {
        let resp = self.all(kind).await?;
        let mut table = BTreeMap::new();
        for item in items_of(&resp, kind)? {
            let ip = item.get("ipAddress").and_then(Value::as_str).unwrap_or_default();
            let partition = item.get("partition").and_then(Value::as_str).unwrap_or_default();
            let mac = item.get("macAddress").and_then(Value::as_str).unwrap_or_default();
            if !ip.is_empty() {
                table.insert(ip.to_string(), keyname(&[partition, mac]));
            }
        }
        Ok(table)
    }

    /// Fdb records of a tunnel: mac -> vtep endpoint.
    pub async fn fdbs(&self, tunnel_name: &str) -> Result<BTreeMap<String, String>> {
        let _t = bigip_utils::metrics::time_it("fdbs");
        let tun = tunnel_name.replace('/', "~");
        let resp = self.all(&format!("net/fdb/tunnel/{}/records", tun)).await?;
        let mut fdbs = BTreeMap::new();
        for item in items_of(&resp, "fdb records")? {
            let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
            let endpoint = item.get("endpoint").and_then(Value::as_str).unwrap_or_default();
            if !name.is_empty() {
                fdbs.insert(name.to_string(), endpoint.to_string());
            }
        }
        Ok(fdbs)
    }

    /// Create the vxlan profile used for flannel-style overlays; existing
    /// profiles are left untouched.
    pub async fn create_vxlan_profile(&self, name: &str, port: &str) -> Result<()> {
        if self.exist("net/tunnels/vxlan", name, "Common", "").await?.is_some() {
            debug!("vxlan profile {} already exists.", name);
            return Ok(());
        }
        debug!("Create vxlan profile {} here.", name);
        let body = obj(vec![
            ("name", json!(name)),
            ("floodingType", json!("none")),
            ("port", json!(port)),
        ]);
        self.deploy("net/tunnels/vxlan", name, "Common", "", body).await
    }

    /// Create or update the vxlan tunnel bound to a profile.
    pub async fn create_vxlan_tunnel(&self, name: &str, key: &str, address: &str, profile: &str) -> Result<()> {
        let body = obj(vec![
            ("name", json!(name)),
            ("key", json!(key)),
            ("localAddress", json!(address)),
            ("profile", json!(profile)),
        ]);
        match self.exist("net/tunnels/tunnel", name, "Common", "").await? {
            None => {
                debug!("Create vxlan tunnel {} here.", name);
                self.deploy("net/tunnels/tunnel", name, "Common", "", body).await
            }
            Some(_) => {
                debug!("Update vxlan tunnel {} here.", name);
                self.update("net/tunnels/tunnel", name, "Common", "", body).await
            }
        }
    }

    /// Create or update a self-ip on a vlan or tunnel.
    pub async fn create_self(&self, name: &str, address: &str, vlan: &str) -> Result<()> {
        let body = obj(vec![
            ("name", json!(name)),
            ("address", json!(address)),
            ("vlan", json!(vlan)),
            ("allowService", json!("all")),
        ]);
        match self.exist("net/self", name, "Common", "").await? {
            None => {
                debug!("Create selfip {} here.", name);
                self.deploy("net/self", name, "Common", "", body).await
            }
            Some(_) => {
                debug!("Update selfip {} here.", name);
                self.update("net/self", name, "Common", "", body).await
            }
        }
    }
}

fn obj(entries: Vec<(&str, Value)>) -> Map<String, Value> {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
