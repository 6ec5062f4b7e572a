use std::collections::BTreeMap;

use reqwest::Method as HttpMethod;
use serde_json::{json, Value};

use crate::client::{classify_response, refname, Bigip};
use crate::request::{Body, Method, RestRequest};
use crate::{ErrorKind, Result, ResultExt};

impl Bigip {
    /// Open a server-side transaction and return its coordination id.
    pub async fn make_trans(&self) -> Result<f64> {
        let url = format!("{}/mgmt/tm/transaction", self.url);
        let payload = serde_json::to_vec(&json!({}))?;
        let (code, resp) = self
            .http_request(HttpMethod::POST, &url, payload, &self.default_headers())
            .await?;
        classify_response(code, &resp)?;
        let jresp: Value = serde_json::from_slice(&resp)?;
        jresp
            .get("transId")
            .and_then(Value::as_f64)
            .ok_or_else(|| ErrorKind::MissingField("transId".into(), "transaction response".into()).into())
    }

    /// Stream the ordered requests, tagging transaction participants with
    /// the coordination id.
    ///
    /// Returns how many requests were staged into the transaction. Inert
    /// requests are skipped; side-channel requests (uploads, bash) pass
    /// through untagged and are applied immediately.
    pub async fn deploy_with_trans(&self, cmds: &[RestRequest], trans_id: Option<f64>) -> Result<usize> {
        let _t = bigip_utils::metrics::time_it("deploy_with_trans");

        let mut count = 0;
        for r in cmds {
            if r.method == Method::Nope {
                continue;
            }

            let mut bbody = match &r.body {
                Body::Json(v) => {
                    // plain clone: the on-wire payload must keep integer
                    // literals as integers, numeric normalisation is for
                    // comparisons only
                    let mut copied = v.clone();
                    if let Some(obj) = copied.as_object_mut() {
                        if !obj.contains_key("name") {
                            obj.insert("name".into(), json!(r.res_name));
                        }
                        if !obj.contains_key("partition") {
                            obj.insert("partition".into(), json!(r.partition));
                        }
                        if !obj.contains_key("subPath") {
                            obj.insert("subPath".into(), json!(r.subfolder));
                        }
                    }
                    serde_json::to_vec(&copied).chain_err(|| format!("failed to marshal payload: {}", r.res_name))?
                }
                Body::Raw(s) => s.clone().into_bytes(),
            };

            let url = match r.method {
                Method::Post => format!("{}{}", self.url, r.res_uri),
                Method::Patch => format!(
                    "{}{}/{}",
                    self.url,
                    r.res_uri,
                    refname(&r.partition, &r.subfolder, &r.res_name)
                ),
                Method::Delete => {
                    bbody = Vec::new();
                    format!(
                        "{}{}/{}",
                        self.url,
                        r.res_uri,
                        refname(&r.partition, &r.subfolder, &r.res_name)
                    )
                }
                Method::Nope => unreachable!(),
            };
            let http_method = match r.method {
                Method::Post => HttpMethod::POST,
                Method::Patch => HttpMethod::PATCH,
                Method::Delete => HttpMethod::DELETE,
                Method::Nope => unreachable!(),
            };

            let mut headers = BTreeMap::new();
            if let (true, Some(tid)) = (r.with_trans, trans_id) {
                headers.insert("X-F5-REST-Coordination-Id".to_string(), format!("{:.0}", tid));
            }
            for (k, v) in self.default_headers() {
                headers.insert(k, v);
            }
            for (k, v) in &r.headers {
                headers.insert(k.clone(), v.clone());
            }

            debug!("#### {} {}{}", r.method, self.url, r.res_uri);
            let (code, resp) = self.http_request(http_method, &url, bbody, &headers).await?;
            classify_response(code, &resp)?;
            if r.with_trans {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Commit a transaction; the device must report COMPLETED.
    pub async fn commit_trans(&self, trans_id: f64) -> Result<()> {
        let _t = bigip_utils::metrics::time_it("commit_trans");
        let url = format!("{}/mgmt/tm/transaction/{:.0}", self.url, trans_id);
        let payload = serde_json::to_vec(&json!({ "state": "VALIDATING" }))?;
        let (code, resp) = self
            .http_request(HttpMethod::PATCH, &url, payload, &self.default_headers())
            .await?;
        classify_response(code, &resp)?;
        let jresp: Value = serde_json::from_slice(&resp)?;
        match jresp.get("state").and_then(Value::as_str) {
            None => Err(ErrorKind::MissingField("state".into(), "transaction response".into()).into()),
            Some("COMPLETED") => Ok(()),
            Some(_) => Err(ErrorKind::TransactionNotCompleted(String::from_utf8_lossy(&resp).into_owned()).into()),
        }
    }

    /// Apply an ordered command list.
    ///
    /// A transaction is opened only when at least one live request wants
    /// in; a list of pure side-channel work (or no work) never touches the
    /// transaction endpoint.
    pub async fn do_rest_requests(&self, cmds: &[RestRequest]) -> Result<()> {
        let staged = cmds.iter().any(|r| r.with_trans && r.method != Method::Nope);
        if !staged {
            self.deploy_with_trans(cmds, None).await?;
            return Ok(());
        }
        let trans_id = self.make_trans().await?;
        let count = self.deploy_with_trans(cmds, Some(trans_id)).await?;
        if count == 0 {
            return Ok(());
        }
        self.commit_trans(trans_id).await
    }
}
