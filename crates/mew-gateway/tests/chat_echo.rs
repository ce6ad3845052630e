//! §8.4 scenario 1: basic chat echo reaches every connected participant with a gateway-stamped
//! `from` and `ts`.

mod common;

use mew_bench::BenchClient;
use serde_json::json;

use common::{TestGateway, participant, recv_kind};

#[tokio::test]
async fn chat_is_broadcast_with_stamped_from_and_ts() {
    let gateway = TestGateway::start(&[
        participant("a", "tok-a", &["chat"]),
        participant("b", "tok-b", &["chat"]),
    ])
    .await;

    let a = BenchClient::connect(&gateway.ws_url("tok-a")).await.unwrap();
    let b = BenchClient::connect(&gateway.ws_url("tok-b")).await.unwrap();

    let mut a_events = a.subscribe();
    let mut b_events = b.subscribe();

    a.send("chat", vec![], json!({"text": "hi"})).await.unwrap();

    let on_a = recv_kind(&mut a_events, "chat").await;
    let on_b = recv_kind(&mut b_events, "chat").await;

    for envelope in [&on_a, &on_b] {
        assert_eq!(envelope.from.as_deref(), Some("a"));
        assert_eq!(envelope.payload["text"], "hi");
        assert!(envelope.ts.is_some(), "gateway must stamp ts");
    }
}
