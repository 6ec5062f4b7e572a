use serde_json::{json, Map, Value};

use bigip_utils::split_blocks;

use crate::client::{Bigip, TENANT_PARTITION};
use crate::{ErrorKind, Result};

const DG_KIND: &str = "ltm/data-group/internal";
const DG_PREFIX: &str = "f5-kic_";
// the device rejects record strings beyond 65535 chars; stay far below it
const BLOCK_SIZE: usize = 1024;

/// Controller state persisted on the device itself, so a restarted
/// controller can recover what it deployed last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedConfig {
    pub cmkey: String,
    pub as3: String,
    pub rest: String,
    pub psmap: Map<String, Value>,
}

/// Flatten a persisted config into data-group records: base64-encoded
/// values chunked into indexed blocks.
fn build_records(pc: &PersistedConfig) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    if !pc.cmkey.is_empty() {
        records.push(json!({ "name": "cmkey", "data": pc.cmkey }));
    }
    for (prefix, data) in &[("as3", &pc.as3), ("rest", &pc.rest)] {
        if data.is_empty() {
            continue;
        }
        let encoded = base64::encode(data);
        for (i, block) in split_blocks(&encoded, BLOCK_SIZE)?.iter().enumerate() {
            records.push(json!({ "name": format!("{}.{}", prefix, i), "data": block }));
        }
    }
    if !pc.psmap.is_empty() {
        let encoded = base64::encode(serde_json::to_vec(&pc.psmap)?);
        for (i, block) in split_blocks(&encoded, BLOCK_SIZE)?.iter().enumerate() {
            records.push(json!({ "name": format!("psmap.{}", i), "data": block }));
        }
    }
    Ok(records)
}

/// Reassemble a persisted config from the records of a data-group body.
fn parse_records(records: &[Value]) -> Result<PersistedConfig> {
    let mut pc = PersistedConfig::default();
    let mut b64as3 = String::new();
    let mut b64rest = String::new();
    let mut b64psmap = String::new();
    for record in records {
        let name = record
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::MissingField("name".into(), "data-group record".into()))?;
        let data = record.get("data").and_then(Value::as_str).unwrap_or("");
        if name == "cmkey" {
            pc.cmkey = data.to_string();
        } else if name.starts_with("as3") {
            b64as3.push_str(data);
        } else if name.starts_with("rest") {
            b64rest.push_str(data);
        } else if name.starts_with("psmap") {
            b64psmap.push_str(data);
        } else {
            return Err(ErrorKind::UnknownRecord(name.to_string()).into());
        }
    }
    if !b64as3.is_empty() {
        pc.as3 = String::from_utf8_lossy(&base64::decode(&b64as3)?).into_owned();
    }
    if !b64rest.is_empty() {
        pc.rest = String::from_utf8_lossy(&base64::decode(&b64rest)?).into_owned();
    }
    if !b64psmap.is_empty() {
        let raw = base64::decode(&b64psmap)?;
        pc.psmap = serde_json::from_slice(&raw)?;
    }
    Ok(pc)
}

impl Bigip {
    /// Load persisted controller state, `None` when the group is absent.
    pub async fn load_data_group(&self, dgkey: &str) -> Result<Option<PersistedConfig>> {
        let dgname = format!("{}{}", DG_PREFIX, dgkey);
        let resp = match self.exist(DG_KIND, &dgname, TENANT_PARTITION, "").await? {
            None => return Ok(None),
            Some(v) => v,
        };
        let records = resp
            .get("records")
            .and_then(Value::as_array)
            .ok_or_else(|| ErrorKind::MissingField("records".into(), format!("data-group {}", dgname)))?
            .clone();
        Ok(Some(parse_records(&records)?))
    }

    /// Write persisted controller state, replacing the whole group.
    pub async fn save_data_group(&self, dgkey: &str, pc: &PersistedConfig) -> Result<()> {
        let dgname = format!("{}{}", DG_PREFIX, dgkey);
        let existing = self.exist(DG_KIND, &dgname, TENANT_PARTITION, "").await?;

        let mut body = Map::new();
        body.insert("name".into(), json!(dgname));
        body.insert("type".into(), json!("string"));
        body.insert("partition".into(), json!(TENANT_PARTITION));
        body.insert("records".into(), Value::Array(build_records(pc)?));

        match existing {
            None => self.deploy(DG_KIND, &dgname, TENANT_PARTITION, "", body).await,
            Some(_) => self.update(DG_KIND, &dgname, TENANT_PARTITION, "", body).await,
        }
    }

    /// Drop persisted controller state if present.
    pub async fn delete_data_group(&self, dgkey: &str) -> Result<()> {
        let dgname = format!("{}{}", DG_PREFIX, dgkey);
        match self.exist(DG_KIND, &dgname, TENANT_PARTITION, "").await? {
            None => Ok(()),
            Some(_) => self.delete(DG_KIND, &dgname, TENANT_PARTITION, "").await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_round_trip() {
        let mut psmap = Map::new();
        psmap.insert("gateway".into(), json!("10.0.0.254"));
        let pc = PersistedConfig {
            cmkey: "cm-1".into(),
            as3: "a".repeat(3000),
            rest: r#"{"":{"ltm/pool/web":{}}}"#.into(),
            psmap,
        };
        let records = build_records(&pc).unwrap();
        // the as3 payload alone base64-encodes to 4000 chars -> 4 blocks
        assert!(records.len() >= 6);
        let parsed = parse_records(&records).unwrap();
        assert_eq!(parsed, pc);
    }

    #[test]
    fn record_blocks_respect_the_size_cap() {
        let pc = PersistedConfig {
            as3: "x".repeat(10_000),
            ..Default::default()
        };
        for record in build_records(&pc).unwrap() {
            let data = record.get("data").and_then(Value::as_str).unwrap();
            assert!(data.len() <= BLOCK_SIZE);
        }
    }

    #[test]
    fn empty_fields_produce_no_records() {
        let records = build_records(&PersistedConfig::default()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn unknown_record_names_are_rejected() {
        let records = vec![json!({ "name": "bogus", "data": "zz" })];
        assert!(parse_records(&records).is_err());
    }
}
