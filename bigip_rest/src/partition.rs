use serde_json::Map;

use crate::client::Bigip;
use crate::{Result, ResultExt};

impl Bigip {
    /// Ensure a partition exists. `Common` is device-owned and left alone.
    pub async fn deploy_partition(&self, name: &str) -> Result<()> {
        if name == "Common" {
            return Ok(());
        }
        let pobj = self.exist("sys/folder", "", name, "").await?;
        if pobj.is_none() {
            return self
                .deploy("sys/folder", name, "/", "", Map::new())
                .await
                .chain_err(|| format!("failed to create partition {}", name));
        }
        Ok(())
    }

    /// Delete a partition if present. `Common` is never deleted.
    pub async fn delete_partition(&self, name: &str) -> Result<()> {
        if name == "Common" {
            return Ok(());
        }
        match self.exist("sys/folder", "", name, "").await? {
            None => Ok(()),
            Some(_) => self
                .delete("sys/folder", name, "", "")
                .await
                .chain_err(|| format!("failed to delete partition {}", name)),
        }
    }

    /// Persist the running configuration, optionally scoped to partitions.
    pub async fn save_sys_config(&self, partitions: &[String]) -> Result<()> {
        let cmd = save_config_cmd(partitions);
        let resp = self.tmsh(&cmd).await?;
        if let Some(result) = resp.get("commandResult") {
            warn!("command {}: {}", cmd, result);
        }
        Ok(())
    }

    /// Flip a sys db variable, e.g. `tmrouted.tmos.routing`.
    pub async fn modify_db_value(&self, name: &str, value: &str) -> Result<()> {
        let cmd = format!("modify sys db {} value {}", name, value);
        debug!("cmd is: {}", cmd);
        let resp = self.tmsh(&cmd).await?;
        if let Some(result) = resp.get("commandResult") {
            warn!("command {}: {}", cmd, result);
        }
        Ok(())
    }
}

fn save_config_cmd(partitions: &[String]) -> String {
    let mut cmd = String::from("save sys config");
    if !partitions.is_empty() {
        cmd.push_str(" partitions { ");
        for p in partitions {
            cmd.push_str(p);
            cmd.push(' ');
        }
        cmd.push('}');
    }
    cmd
}
