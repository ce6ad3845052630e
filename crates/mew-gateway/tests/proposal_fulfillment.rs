//! §8.4 scenario 4: an untrusted agent proposes an action it cannot perform directly; a trusted
//! agent fulfills it by emitting the real request with `correlation_id = [proposal.id]`, and the
//! fulfillment is observable by the proposer.

mod common;

use mew_bench::BenchClient;
use mew_gateway::kinds;
use serde_json::json;

use common::{TestGateway, participant, recv_kind};

#[tokio::test]
async fn trusted_agent_fulfills_an_untrusted_proposal() {
    let gateway = TestGateway::start(&[
        participant("p", "tok-p", &["mcp/proposal"]),
        participant("t", "tok-t", &["mcp/*"]),
    ])
    .await;

    let p = BenchClient::connect(&gateway.ws_url("tok-p")).await.unwrap();
    let t = BenchClient::connect(&gateway.ws_url("tok-t")).await.unwrap();

    let mut p_events = p.subscribe();
    let mut t_events = t.subscribe();

    let proposal_payload = json!({"method": "tools/call", "params": {"name": "read_file", "arguments": {"path": "/a"}}});
    p.send(kinds::MCP_PROPOSAL, vec![], proposal_payload.clone()).await.unwrap();

    // P has no mcp/request capability; it cannot perform the action itself.
    let proposal = recv_kind(&mut t_events, kinds::MCP_PROPOSAL).await;
    assert_eq!(proposal.from.as_deref(), Some("p"));
    assert_eq!(proposal.payload, proposal_payload);

    // T performs the real call on P's behalf, correlating the fulfillment back to the proposal.
    let fulfillment_id = proposal.id.clone().unwrap();
    t.reply(kinds::MCP_REQUEST, "p", vec![fulfillment_id.clone()], json!({"method": "tools/call"}))
        .await
        .unwrap();

    let observed_by_p = recv_kind(&mut p_events, kinds::MCP_REQUEST).await;
    assert_eq!(observed_by_p.from.as_deref(), Some("t"));
    assert_eq!(observed_by_p.correlation_id.as_deref(), Some(&[fulfillment_id][..]));
}
