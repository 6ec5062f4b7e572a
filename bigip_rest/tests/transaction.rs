#![warn(rust_2018_idioms)]

use mockito::{mock, Matcher};
use serde_json::json;

use bigip_rest::{Bigip, Body, Method, RestRequest, Schedule};
use bigip_utils::need_retry;

fn device() -> Bigip {
    Bigip::new(&mockito::server_url(), "admin", "admin").unwrap()
}

fn node_create(partition: &str) -> RestRequest {
    let mut r = RestRequest::tm_resource(
        "ltm/node",
        "node1",
        partition,
        "",
        json!({ "address": "1.2.3.4" }),
    );
    r.method = Method::Post;
    r
}

// the transaction endpoints share paths between scenarios, so they run
// sequentially with the mock server reset in between
#[tokio::test]
async fn transactional_executor() {
    ordered_ops_are_staged_and_committed().await;
    mockito::reset();
    patches_inject_identity_and_address_the_resource().await;
    mockito::reset();
    deletes_address_the_fully_qualified_resource().await;
    mockito::reset();
    side_channel_only_lists_open_no_transaction().await;
    mockito::reset();
    empty_command_list_touches_nothing().await;
    mockito::reset();
    non_completed_commit_is_a_terminal_error().await;
    mockito::reset();
    mid_stream_503_aborts_and_is_retriable().await;
}

async fn ordered_ops_are_staged_and_committed() {
    let open = mock("POST", "/mgmt/tm/transaction")
        .with_status(200)
        .with_body(json!({ "transId": 1602702279 }).to_string())
        .expect(1)
        .create();
    let op = mock("POST", "/mgmt/tm/ltm/node")
        .match_header("X-F5-REST-Coordination-Id", "1602702279")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "name": "node1",
            "partition": "ptx1",
            "address": "1.2.3.4"
        })))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create();
    let commit = mock("PATCH", "/mgmt/tm/transaction/1602702279")
        .match_body(Matcher::Json(json!({ "state": "VALIDATING" })))
        .with_status(200)
        .with_body(json!({ "transId": 1602702279, "state": "COMPLETED" }).to_string())
        .expect(1)
        .create();

    device().do_rest_requests(&[node_create("ptx1")]).await.unwrap();
    open.assert();
    op.assert();
    commit.assert();
}

async fn patches_inject_identity_and_address_the_resource() {
    let _open = mock("POST", "/mgmt/tm/transaction")
        .with_status(200)
        .with_body(json!({ "transId": 5 }).to_string())
        .create();
    let patch = mock("PATCH", "/mgmt/tm/ltm/pool/~ptx6~app~web")
        .match_header("X-F5-REST-Coordination-Id", "5")
        .match_body(Matcher::PartialJson(json!({
            "name": "web",
            "partition": "ptx6",
            "subPath": "app",
            "loadBalancingMode": "round-robin"
        })))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create();
    let _commit = mock("PATCH", "/mgmt/tm/transaction/5")
        .with_status(200)
        .with_body(json!({ "state": "COMPLETED" }).to_string())
        .create();

    let mut r = RestRequest::tm_resource(
        "ltm/pool",
        "web",
        "ptx6",
        "app",
        json!({ "loadBalancingMode": "round-robin" }),
    );
    r.method = Method::Patch;
    device().do_rest_requests(&[r]).await.unwrap();
    patch.assert();
}

async fn empty_command_list_touches_nothing() {
    let open = mock("POST", "/mgmt/tm/transaction").expect(0).create();
    device().do_rest_requests(&[]).await.unwrap();
    open.assert();
}

async fn deletes_address_the_fully_qualified_resource() {
    let _open = mock("POST", "/mgmt/tm/transaction")
        .with_status(200)
        .with_body(json!({ "transId": 7 }).to_string())
        .create();
    let del = mock("DELETE", "/mgmt/tm/ltm/node/~ptx2~node1")
        .match_header("X-F5-REST-Coordination-Id", "7")
        .match_body(Matcher::Exact(String::new()))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create();
    let _commit = mock("PATCH", "/mgmt/tm/transaction/7")
        .with_status(200)
        .with_body(json!({ "state": "COMPLETED" }).to_string())
        .create();

    let mut r = node_create("ptx2");
    r.method = Method::Delete;
    device().do_rest_requests(&[r]).await.unwrap();
    del.assert();
}

async fn side_channel_only_lists_open_no_transaction() {
    let open = mock("POST", "/mgmt/tm/transaction").expect(0).create();
    let upload = mock("POST", "/mgmt/shared/file-transfer/uploads/tls.crt")
        .match_header("Content-Type", "application/octet-stream")
        .match_header("Content-Range", "0-2/3")
        .match_body("pem")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create();

    let mut inert = node_create("ptx3");
    inert.method = Method::Nope;
    let raw = RestRequest {
        kind: "shared/file-transfer/uploads".to_string(),
        res_name: "tls.crt".to_string(),
        partition: "ptx3".to_string(),
        subfolder: String::new(),
        res_uri: "/mgmt/shared/file-transfer/uploads/tls.crt".to_string(),
        method: Method::Post,
        body: Body::Raw("pem".to_string()),
        headers: vec![
            ("Content-Type".to_string(), "application/octet-stream".to_string()),
            ("Content-Range".to_string(), "0-2/3".to_string()),
        ]
        .into_iter()
        .collect(),
        with_trans: false,
        schedule: Schedule::Inline,
    };

    device().do_rest_requests(&[inert, raw]).await.unwrap();
    open.assert();
    upload.assert();
}

async fn non_completed_commit_is_a_terminal_error() {
    let _open = mock("POST", "/mgmt/tm/transaction")
        .with_status(200)
        .with_body(json!({ "transId": 9 }).to_string())
        .create();
    let _op = mock("POST", "/mgmt/tm/ltm/node")
        .with_status(200)
        .with_body("{}")
        .create();
    let _commit = mock("PATCH", "/mgmt/tm/transaction/9")
        .with_status(200)
        .with_body(json!({ "state": "FAILED", "error": "monitor /p1/hm references a nonexistent object" }).to_string())
        .create();

    let err = device().do_rest_requests(&[node_create("ptx4")]).await.unwrap_err();
    assert!(!need_retry(&err));
    assert!(err.to_string().contains("FAILED"));
}

async fn mid_stream_503_aborts_and_is_retriable() {
    let _open = mock("POST", "/mgmt/tm/transaction")
        .with_status(200)
        .with_body(json!({ "transId": 11 }).to_string())
        .create();
    let _op = mock("POST", "/mgmt/tm/ltm/node")
        .with_status(503)
        .with_body("Configuration Utility restarting...")
        .create();
    let commit = mock("PATCH", "/mgmt/tm/transaction/11").expect(0).create();

    let err = device().do_rest_requests(&[node_create("ptx5")]).await.unwrap_err();
    assert!(need_retry(&err));
    commit.assert();
}
