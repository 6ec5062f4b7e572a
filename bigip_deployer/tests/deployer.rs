#![warn(rust_2018_idioms)]

use std::sync::Arc;
use std::time::Duration;

use mockito::{mock, Matcher};
use serde_json::json;

use bigip_deployer::{DeployContext, DeployRequest, Deployer};
use bigip_rest::{Bigip, ConfigTree};
use bigip_utils::need_retry;

fn device() -> Arc<Bigip> {
    Arc::new(Bigip::new(&mockito::server_url(), "admin", "admin").unwrap())
}

fn node_config() -> ConfigTree {
    let mut cfg = ConfigTree::new();
    cfg.entry(String::new())
        .or_default()
        .insert("ltm/node/node1".to_string(), json!({ "name": "node1", "address": "1.2.3.4" }));
    cfg
}

async fn collect(deployer: &Deployer) -> bigip_deployer::DeployResponse {
    tokio::time::timeout(Duration::from_secs(5), deployer.done().get())
        .await
        .expect("worker did not publish a response in time")
}

// one worker, one mock server: scenarios run back to back with the mock
// registry reset in between
#[tokio::test]
async fn deployer_worker() {
    full_pipeline_publishes_success().await;
    mockito::reset();
    specified_bigip_skips_other_devices().await;
    mockito::reset();
    create_partition_directive_runs_first().await;
    mockito::reset();
    device_failures_are_merged_and_retriable().await;
    mockito::reset();
    one_device_failing_does_not_suppress_the_others().await;
}

async fn full_pipeline_publishes_success() {
    let _folders = mock("GET", "/mgmt/tm/sys/folder")
        .with_status(200)
        .with_body(json!({ "items": [ { "fullPath": "/Common" }, { "fullPath": "/pdep1" } ] }).to_string())
        .create();
    let _folders_f = mock("GET", Matcher::Regex(r"^/mgmt/tm/sys/folder\?\$filter=partition\+eq\+pdep1$".into()))
        .with_status(200)
        .with_body(json!({ "items": [] }).to_string())
        .create();
    let _nodes = mock("GET", Matcher::Regex(r"^/mgmt/tm/ltm/node\?\$filter=partition\+eq\+pdep1$".into()))
        .with_status(200)
        .with_body(json!({ "items": [] }).to_string())
        .create();
    let _open = mock("POST", "/mgmt/tm/transaction")
        .with_status(200)
        .with_body(json!({ "transId": 42 }).to_string())
        .create();
    let op = mock("POST", "/mgmt/tm/ltm/node")
        .match_header("X-F5-REST-Coordination-Id", "42")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create();
    let _commit = mock("PATCH", "/mgmt/tm/transaction/42")
        .with_status(200)
        .with_body(json!({ "state": "COMPLETED" }).to_string())
        .create();

    let deployer = Deployer::start(vec![device()]);
    deployer.pending().add(DeployRequest {
        meta: "create node1 in pdep1".to_string(),
        from: None,
        to: Some(node_config()),
        partition: "pdep1".to_string(),
        context: DeployContext::tagged(),
    });

    let resp = collect(&deployer).await;
    assert!(resp.status.is_ok(), "status: {:?}", resp.status);
    assert_eq!(resp.request.partition, "pdep1");
    op.assert();
    deployer.stop().await;
}

async fn specified_bigip_skips_other_devices() {
    // no mocks: any http call would return 501 and fail the status
    let deployer = Deployer::start(vec![device()]);
    let mut ctx = DeployContext::default();
    ctx.specified_bigip = Some("https://someone-else:8443".to_string());
    deployer.pending().add(DeployRequest {
        meta: "targeted elsewhere".to_string(),
        from: None,
        to: Some(node_config()),
        partition: "pdep2".to_string(),
        context: ctx,
    });

    let resp = collect(&deployer).await;
    assert!(resp.status.is_ok());
    deployer.stop().await;
}

async fn create_partition_directive_runs_first() {
    let probe = mock("GET", "/mgmt/tm/sys/folder/~pdep3")
        .with_status(404)
        .with_body(r#"{"code":404,"message":"01020036:3: The requested folder (/pdep3) was not found."}"#)
        .expect(1)
        .create();
    let create = mock("POST", "/mgmt/tm/sys/folder")
        .match_body(Matcher::PartialJson(json!({ "name": "pdep3" })))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create();
    let _folders = mock("GET", "/mgmt/tm/sys/folder")
        .with_status(200)
        .with_body(json!({ "items": [ { "fullPath": "/pdep3" } ] }).to_string())
        .create();
    let _folders_f = mock("GET", Matcher::Regex(r"^/mgmt/tm/sys/folder\?\$filter=partition\+eq\+pdep3$".into()))
        .with_status(200)
        .with_body(json!({ "items": [] }).to_string())
        .create();

    let deployer = Deployer::start(vec![device()]);
    let mut ctx = DeployContext::default();
    ctx.create_partition = true;
    deployer.pending().add(DeployRequest {
        meta: "bootstrap empty partition".to_string(),
        from: None,
        to: None,
        partition: "pdep3".to_string(),
        context: ctx,
    });

    let resp = collect(&deployer).await;
    assert!(resp.status.is_ok(), "status: {:?}", resp.status);
    probe.assert();
    create.assert();
    deployer.stop().await;
}

async fn device_failures_are_merged_and_retriable() {
    let _folders = mock("GET", "/mgmt/tm/sys/folder")
        .with_status(200)
        .with_body(json!({ "items": [ { "fullPath": "/pdep4" } ] }).to_string())
        .create();
    let _folders_f = mock("GET", Matcher::Regex(r"^/mgmt/tm/sys/folder\?\$filter=partition\+eq\+pdep4$".into()))
        .with_status(200)
        .with_body(json!({ "items": [] }).to_string())
        .create();
    let _nodes = mock("GET", Matcher::Regex(r"^/mgmt/tm/ltm/node\?\$filter=partition\+eq\+pdep4$".into()))
        .with_status(503)
        .with_body("Configuration Utility restarting...")
        .create();

    let deployer = Deployer::start(vec![device()]);
    deployer.pending().add(DeployRequest {
        meta: "hits a restarting control plane".to_string(),
        from: None,
        to: Some(node_config()),
        partition: "pdep4".to_string(),
        context: DeployContext::default(),
    });

    let resp = collect(&deployer).await;
    let err = resp.status.unwrap_err();
    assert!(need_retry(&err), "expected retriable: {}", err);
    assert!(err.to_string().contains(&mockito::server_url()));
    deployer.stop().await;
}

async fn one_device_failing_does_not_suppress_the_others() {
    // unroutable device first, healthy mock second: the worker must fail
    // on the first and still apply the request to the second
    let dead = Arc::new(Bigip::new("http://127.0.0.1:1", "admin", "admin").unwrap());

    let _folders = mock("GET", "/mgmt/tm/sys/folder")
        .with_status(200)
        .with_body(json!({ "items": [ { "fullPath": "/pdep5" } ] }).to_string())
        .create();
    let _folders_f = mock("GET", Matcher::Regex(r"^/mgmt/tm/sys/folder\?\$filter=partition\+eq\+pdep5$".into()))
        .with_status(200)
        .with_body(json!({ "items": [] }).to_string())
        .create();
    let _nodes = mock("GET", Matcher::Regex(r"^/mgmt/tm/ltm/node\?\$filter=partition\+eq\+pdep5$".into()))
        .with_status(200)
        .with_body(json!({ "items": [] }).to_string())
        .create();
    let _open = mock("POST", "/mgmt/tm/transaction")
        .with_status(200)
        .with_body(json!({ "transId": 43 }).to_string())
        .create();
    let op = mock("POST", "/mgmt/tm/ltm/node")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create();
    let _commit = mock("PATCH", "/mgmt/tm/transaction/43")
        .with_status(200)
        .with_body(json!({ "state": "COMPLETED" }).to_string())
        .create();

    let deployer = Deployer::start(vec![dead, device()]);
    deployer.pending().add(DeployRequest {
        meta: "one dead device in the set".to_string(),
        from: None,
        to: Some(node_config()),
        partition: "pdep5".to_string(),
        context: DeployContext::default(),
    });

    let resp = collect(&deployer).await;
    // the healthy device was still driven all the way through
    op.assert();
    // and the dead one's transport error is retriable in the merged status
    let err = resp.status.unwrap_err();
    assert!(need_retry(&err));
    deployer.stop().await;
}
