//! §8.4 scenario 6: disconnecting a participant reverts the grants it issued, closes the
//! streams it owns, and broadcasts the leave/close notices.

mod common;

use mew_bench::BenchClient;
use mew_gateway::capability::CapabilityRule;
use mew_gateway::kinds;
use serde_json::json;

use common::{TestGateway, participant, recv_kind};

#[tokio::test]
async fn disconnect_reverts_grants_and_closes_owned_streams() {
    let gateway = TestGateway::start(&[
        participant("g", "tok-g", &["capability/grant", "stream/*"]),
        participant("h", "tok-h", &["chat"]),
    ])
    .await;

    let g = BenchClient::connect(&gateway.ws_url("tok-g")).await.unwrap();
    let h = BenchClient::connect(&gateway.ws_url("tok-h")).await.unwrap();
    let h_id = h.participant_id().await;

    let mut h_events = h.subscribe();

    g.grant_capability(&h_id, vec![CapabilityRule::new("mcp/*")]).await.unwrap();
    recv_kind(&mut h_events, kinds::CAPABILITY_GRANT_ACK).await;

    // The grant is in effect: H can now send an mcp/request without a capability violation
    // (name itself in `to` so the accepted envelope echoes back and is observable).
    h.send(kinds::MCP_REQUEST, vec![h_id.clone()], json!({"method": "tools/list"})).await.unwrap();
    recv_kind(&mut h_events, kinds::MCP_REQUEST).await;

    let open = g.request_stream("upload", "owned by g", "utf-8").await.unwrap();
    let stream_id = open.payload["stream_id"].as_str().unwrap().to_string();

    g.disconnect().await.unwrap();

    let leave = recv_kind(&mut h_events, kinds::SYSTEM_PRESENCE).await;
    assert_eq!(leave.payload["event"], "leave");
    assert_eq!(leave.payload["id"], "g");

    let closed = recv_kind(&mut h_events, kinds::STREAM_CLOSE).await;
    assert_eq!(closed.payload["stream_id"], stream_id);

    // H's granted capability was reverted to its base set; the same request now fails.
    h.send(kinds::MCP_REQUEST, vec!["ghost".to_string()], json!({"method": "tools/list"})).await.unwrap();
    let error = recv_kind(&mut h_events, kinds::SYSTEM_ERROR).await;
    assert_eq!(error.payload["error"], "capability_violation");
}
