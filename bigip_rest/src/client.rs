use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use regex::Regex;
use reqwest::Method as HttpMethod;
use serde_json::{json, Map, Value};

use bigip_utils::metrics::Metrics;
use bigip_utils::retry_error;

use crate::{ErrorKind, Result, ResultExt};

/// The reserved tenant partition controller state lives in.
pub const TENANT_PARTITION: &str = "cis-c-tenant";

const CALL_TIMEOUT: Duration = Duration::from_secs(60);

lazy_static! {
    static ref RESTARTING_404: Vec<Regex> = vec![
        Regex::new(r"URI path .* not registered").unwrap(),
        Regex::new(r"Public URI path not registered: ").unwrap(),
    ];
}

/// One managed BIG-IP device.
///
/// Holds the precomputed basic-auth header and a TLS-lenient http client;
/// management interfaces ship self-signed certificates.
pub struct Bigip {
    pub url: String,
    pub version: String,
    pub(crate) authorization: String,
    pub(crate) client: reqwest::Client,
}

impl Bigip {
    /// Device handle without touching the network.
    pub fn new(url: &str, user: &str, password: &str) -> Result<Bigip> {
        let auth = format!("Basic {}", base64::encode(format!("{}:{}", user, password)));
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(CALL_TIMEOUT)
            .build()?;
        Ok(Bigip {
            url: url.trim_end_matches('/').to_string(),
            version: String::new(),
            authorization: auth,
            client,
        })
    }

    /// Device handle verified against a live device.
    ///
    /// Probes `sys/version` and ensures the tenant partition exists, the
    /// same way a controller boots before accepting work.
    pub async fn connect(url: &str, user: &str, password: &str) -> Result<Bigip> {
        let mut bigip = Bigip::new(url, user, password)?;
        let sysinfo = bigip
            .all("sys/version")
            .await
            .chain_err(|| ErrorKind::DeviceUnavailable(bigip.url.clone(), "cannot get sys info".into()))?;
        bigip.version = device_version(&sysinfo)?;
        debug!("connected to {} (version {})", bigip.url, bigip.version);
        bigip.deploy_partition(TENANT_PARTITION).await?;
        Ok(bigip)
    }

    pub(crate) fn default_headers(&self) -> BTreeMap<String, String> {
        let mut h = BTreeMap::new();
        h.insert("Content-Type".to_string(), "application/json".to_string());
        h.insert("Authorization".to_string(), self.authorization.clone());
        h
    }

    /// Issue one http call, feeding the icontrol timing gauges.
    ///
    /// Transport failures are retry-marked: the management plane drops
    /// connections while restarting and callers are expected to back off.
    pub(crate) async fn http_request(
        &self,
        method: HttpMethod,
        url: &str,
        payload: Vec<u8>,
        headers: &BTreeMap<String, String>,
    ) -> Result<(u16, Vec<u8>)> {
        let start = Instant::now();
        let label = canonical_path(url);
        let mname = method.as_str().to_string();

        let mut req = self.client.request(method, url);
        for (k, v) in headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let sent = req.body(payload).send().await;

        let millis = start.elapsed().as_secs_f64() * 1000.0;
        Metrics::global().observe_icontrol(&mname, &label, millis);

        let resp = match sent {
            Ok(r) => r,
            Err(e) => return Err(retry_error!("{}", e).into()),
        };
        let code = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok((code, body.to_vec()))
    }

    /// Fetch one resource; `Ok(None)` when the device answers 404.
    pub async fn exist(&self, kind: &str, name: &str, partition: &str, subfolder: &str) -> Result<Option<Value>> {
        let url = format!(
            "{}/mgmt/tm/{}",
            self.url,
            uriname(&[kind, &refname(partition, subfolder, name)])
        );
        let (code, body) = self
            .http_request(HttpMethod::GET, &url, Vec::new(), &self.default_headers())
            .await?;
        match code {
            200 => Ok(Some(serde_json::from_slice(&body)?)),
            404 => Ok(None),
            _ => classify_response(code, &body)
                .chain_err(|| format!("error checking {}", kind))
                .map(|_| None),
        }
    }

    /// Create a resource under `/mgmt/tm/<kind>`.
    pub async fn deploy(
        &self,
        kind: &str,
        name: &str,
        partition: &str,
        subfolder: &str,
        mut body: Map<String, Value>,
    ) -> Result<()> {
        let url = format!("{}/mgmt/tm/{}", self.url, kind);
        if !partition.is_empty() {
            body.insert("partition".into(), json!(partition));
        }
        if !subfolder.is_empty() {
            body.insert("subPath".into(), json!(subfolder));
        }
        body.insert("name".into(), json!(name));
        let payload = serde_json::to_vec(&Value::Object(body))?;
        let (code, resp) = self
            .http_request(HttpMethod::POST, &url, payload, &self.default_headers())
            .await?;
        classify_response(code, &resp)
    }

    /// Patch a resource in place.
    pub async fn update(
        &self,
        kind: &str,
        name: &str,
        partition: &str,
        subfolder: &str,
        body: Map<String, Value>,
    ) -> Result<()> {
        let url = format!("{}/mgmt/tm/{}/{}", self.url, kind, refname(partition, subfolder, name));
        let payload = serde_json::to_vec(&Value::Object(body))?;
        let (code, resp) = self
            .http_request(HttpMethod::PATCH, &url, payload, &self.default_headers())
            .await?;
        classify_response(code, &resp)
    }

    /// Delete a resource; missing resources surface as a 404 error.
    pub async fn delete(&self, kind: &str, name: &str, partition: &str, subfolder: &str) -> Result<()> {
        let url = format!("{}/mgmt/tm/{}/{}", self.url, kind, refname(partition, subfolder, name));
        let (code, resp) = self
            .http_request(HttpMethod::DELETE, &url, Vec::new(), &self.default_headers())
            .await?;
        classify_response(code, &resp)
    }

    /// List a collection, `kind` may carry a query string.
    pub async fn all(&self, kind: &str) -> Result<Value> {
        let url = format!("{}/mgmt/tm/{}", self.url, kind);
        let (code, body) = self
            .http_request(HttpMethod::GET, &url, Vec::new(), &self.default_headers())
            .await?;
        match code {
            200 => Ok(serde_json::from_slice(&body)?),
            _ => {
                classify_response(code, &body)?;
                Err(ErrorKind::UnexpectedHttpStatus(code, String::from_utf8_lossy(&body).into_owned()).into())
            }
        }
    }

    /// Push file content through the upload side channel.
    ///
    /// Returns the path the device stored the file under. Uploads cannot
    /// join transactions.
    pub async fn upload(&self, name: &str, content: &[u8]) -> Result<String> {
        let url = format!("{}/mgmt/shared/file-transfer/uploads/{}", self.url, name);
        let size = content.len();
        let mut headers = self.default_headers();
        headers.insert("Content-Type".into(), "application/octet-stream".into());
        headers.insert("Content-Length".into(), format!("{}", size));
        headers.insert("Content-Range".into(), format!("0-{}/{}", size.saturating_sub(1), size));
        let (code, body) = self
            .http_request(HttpMethod::POST, &url, content.to_vec(), &headers)
            .await?;
        if code != 200 {
            return classify_response(code, &body)
                .chain_err(|| "error uploading")
                .map(|_| String::new());
        }
        let resp: Value = serde_json::from_slice(&body)?;
        match resp.get("localFilePath").and_then(Value::as_str) {
            Some(p) => Ok(p.to_string()),
            None => Err(ErrorKind::MissingField("localFilePath".into(), "upload response".into()).into()),
        }
    }

    /// Run a tmsh command through the util/bash endpoint.
    pub async fn tmsh(&self, cmd: &str) -> Result<Value> {
        let _t = bigip_utils::metrics::time_it("tmsh");
        if cmd.is_empty() {
            return Ok(json!({}));
        }
        let url = format!("{}/mgmt/tm/util/bash", self.url);
        let body = json!({
            "command": "run",
            "utilCmdArgs": format!("-c 'tmsh -c \"{}\"'", cmd),
        });
        debug!("tmsh: POST {} {}", url, body);
        let (code, resp) = self
            .http_request(HttpMethod::POST, &url, serde_json::to_vec(&body)?, &self.default_headers())
            .await?;
        classify_response(code, &resp)?;
        Ok(serde_json::from_slice(&resp)?)
    }
}

/// Map an iControl response onto the error taxonomy.
///
/// 401/500/503 and the restart-flavoured 404s are retry-marked; every
/// other non-2xx is terminal for the request that caused it.
pub fn classify_response(code: u16, body: &[u8]) -> Result<()> {
    let sresp = String::from_utf8_lossy(body).into_owned();
    match code {
        200..=299 => Ok(()),
        401 | 500 | 503 => Err(retry_error!("{}, {}", code, sresp).into()),
        404 => {
            if RESTARTING_404.iter().any(|p| p.is_match(&sresp)) {
                Err(retry_error!("{}, {}", code, sresp).into())
            } else {
                Err(ErrorKind::UnexpectedHttpStatus(code, sresp).into())
            }
        }
        _ => Err(ErrorKind::UnexpectedHttpStatus(code, sresp).into()),
    }
}

/// `~`-joined resource identifier, empty segments omitted.
pub fn refname(partition: &str, subfolder: &str, name: &str) -> String {
    let joined = [partition, subfolder, name]
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("~");
    if joined.is_empty() {
        joined
    } else {
        format!("~{}", joined)
    }
}

/// `/`-joined uri fragment, empty segments omitted.
pub fn uriname(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("/")
}

/// Reduce a call url to its stable lowercase path segments.
///
/// Resource identifiers, ids and query strings would explode the metric
/// label space, so only segments starting with a lowercase letter survive.
pub fn canonical_path(url: &str) -> String {
    let no_query = url.splitn(2, '?').next().unwrap_or(url);
    let mut parts = no_query.splitn(2, "/mgmt");
    let _host = parts.next();
    let rest = match parts.next() {
        Some(r) => r,
        None => return url.to_string(),
    };
    let uri = format!("/mgmt{}", rest);
    let filtered: String = uri
        .split('/')
        .filter(|seg| !seg.is_empty() && seg.chars().next().map_or(false, |c| c.is_ascii_lowercase()))
        .map(|seg| format!("/{}", seg))
        .collect();
    if filtered.is_empty() {
        url.to_string()
    } else {
        filtered
    }
}

/// Walk the nested stats of a `sys/version` listing down to the version
/// description.
pub fn device_version(sysinfo: &Value) -> Result<String> {
    sysinfo
        .get("entries")
        .and_then(|e| e.get("https://localhost/mgmt/tm/sys/version/0"))
        .and_then(|v| v.get("nestedStats"))
        .and_then(|n| n.get("entries"))
        .and_then(|e| e.get("Version"))
        .and_then(|v| v.get("description"))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ErrorKind::MissingField("entries".into(), "sys/version".into()).into())
}
