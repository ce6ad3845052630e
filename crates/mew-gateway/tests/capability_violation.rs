//! §8.4 scenario 2: a participant without the matching capability is rejected with
//! `system/error { error: "capability_violation" }`, and the envelope reaches nobody else.

mod common;

use mew_bench::BenchClient;
use serde_json::json;

use common::{TestGateway, participant, recv_kind};

#[tokio::test]
async fn sending_an_unauthorized_kind_yields_capability_violation() {
    let gateway = TestGateway::start(&[participant("x", "tok-x", &["chat"])]).await;

    let x = BenchClient::connect(&gateway.ws_url("tok-x")).await.unwrap();
    let mut x_events = x.subscribe();

    x.send("mcp/request", vec!["tool".to_string()], json!({"method": "tools/list"})).await.unwrap();

    let error = recv_kind(&mut x_events, "system/error").await;
    assert_eq!(error.payload["error"], "capability_violation");
    assert_eq!(error.payload["attempted_kind"], "mcp/request");
}
