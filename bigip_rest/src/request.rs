use std::collections::BTreeMap;

use serde_json::Value;

use crate::{ErrorKind, Result};

/// Http verb carried by a rest request; `Nope` marks an inert placeholder
/// the executor skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
    Patch,
    Delete,
    Nope,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Nope => "NOPE",
        };
        f.write_str(s)
    }
}

/// Request payload: a json document for configuration resources, raw bytes
/// for the upload side channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    Json(Value),
    Raw(String),
}

impl Body {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(v) => Some(v),
            Body::Raw(_) => None,
        }
    }
}

/// When the request should run; `Never` requests are dropped before the
/// executor sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Inline,
    Never,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Inline
    }
}

/// The unit of work flowing from the diff engine into the executor.
#[derive(Debug, Clone, Serialize)]
pub struct RestRequest {
    pub kind: String,
    pub res_name: String,
    pub partition: String,
    pub subfolder: String,
    pub res_uri: String,
    pub method: Method,
    pub body: Body,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub with_trans: bool,
    #[serde(skip)]
    pub schedule: Schedule,
}

impl RestRequest {
    /// Resource key used for diff comparison and live lookup.
    pub fn key(&self) -> String {
        bigip_utils::keyname(&[&self.partition, &self.subfolder, &self.res_name])
    }

    /// A `sys/folder` request for a subfolder of `partition`.
    pub fn folder(name: &str, partition: &str) -> RestRequest {
        let kind = "sys/folder";
        RestRequest {
            kind: kind.to_string(),
            res_name: name.to_string(),
            partition: partition.to_string(),
            subfolder: String::new(),
            res_uri: format!("/mgmt/tm/{}", kind),
            method: Method::Nope,
            body: Body::Json(serde_json::json!({ "name": name, "partition": partition })),
            headers: BTreeMap::new(),
            with_trans: true,
            schedule: Schedule::Inline,
        }
    }

    /// A transaction-eligible request against `/mgmt/tm/<kind>`.
    pub fn tm_resource(kind: &str, name: &str, partition: &str, subfolder: &str, body: Value) -> RestRequest {
        RestRequest {
            kind: kind.to_string(),
            res_name: name.to_string(),
            partition: partition.to_string(),
            subfolder: subfolder.to_string(),
            res_uri: format!("/mgmt/tm/{}", kind),
            method: Method::Nope,
            body: Body::Json(body),
            headers: BTreeMap::new(),
            with_trans: true,
            schedule: Schedule::Inline,
        }
    }

    /// Requests for the `shared/` tree, which cannot join transactions.
    ///
    /// Deploying an upload becomes a raw octet-stream POST. Deleting one
    /// becomes an inert placeholder: the device garbage-collects its
    /// download spool on its own, so the bash cleanup is parked with
    /// `Schedule::Never` rather than executed.
    pub fn shared_resource(
        kind: &str,
        name: &str,
        partition: &str,
        subfolder: &str,
        body: &Value,
        operation: Operation,
    ) -> Result<RestRequest> {
        if kind != "shared/file-transfer/uploads" {
            return Err(ErrorKind::UnsupportedSharedKind(kind.to_string()).into());
        }
        let r = match operation {
            Operation::Deploy => {
                let content = body
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ErrorKind::MissingField("content".into(), format!("upload {}", name)))?;
                let size = content.len();
                let mut headers = BTreeMap::new();
                headers.insert("Content-Type".to_string(), "application/octet-stream".to_string());
                headers.insert("Content-Length".to_string(), format!("{}", size));
                headers.insert(
                    "Content-Range".to_string(),
                    format!("0-{}/{}", size.saturating_sub(1), size),
                );
                RestRequest {
                    kind: kind.to_string(),
                    res_name: name.to_string(),
                    partition: partition.to_string(),
                    subfolder: subfolder.to_string(),
                    res_uri: format!("/mgmt/shared/file-transfer/uploads/{}", name),
                    method: Method::Post,
                    body: Body::Raw(content.to_string()),
                    headers,
                    with_trans: false,
                    schedule: Schedule::Inline,
                }
            }
            Operation::Delete => RestRequest {
                kind: kind.to_string(),
                res_name: name.to_string(),
                partition: partition.to_string(),
                subfolder: subfolder.to_string(),
                res_uri: "/mgmt/tm/util/bash".to_string(),
                method: Method::Post,
                body: Body::Json(serde_json::json!({
                    "command": "run",
                    "utilCmdArgs": format!("-c 'rm -f /var/config/rest/downloads/{}'", name),
                })),
                headers: BTreeMap::new(),
                with_trans: false,
                schedule: Schedule::Never,
            },
        };
        Ok(r)
    }
}

/// Which side of the diff a config tree is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deploy,
    Delete,
}

/// Pick the verb from the requested operation and live presence.
pub fn opr2method(operation: Operation, exists: bool) -> Method {
    match (operation, exists) {
        (Operation::Deploy, false) => Method::Post,
        (Operation::Deploy, true) => Method::Patch,
        (Operation::Delete, true) => Method::Delete,
        (Operation::Delete, false) => Method::Nope,
    }
}
