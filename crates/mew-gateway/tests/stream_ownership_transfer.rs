//! §8.4 scenario 5: every transition of the stream ownership/writer-grant state machine (§4.3),
//! driven entirely through the wire protocol rather than `StreamRegistry` directly.

mod common;

use mew_bench::BenchClient;
use mew_gateway::kinds;

use common::{TestGateway, assert_no_stream_frame, participant, recv_kind, recv_stream_frame};

#[tokio::test]
async fn ownership_and_write_grants_gate_every_frame() {
    let gateway = TestGateway::start(&[
        participant("o", "tok-o", &["stream/*"]),
        participant("w", "tok-w", &["stream/*"]),
    ])
    .await;

    let o = BenchClient::connect(&gateway.ws_url("tok-o")).await.unwrap();
    let w = BenchClient::connect(&gateway.ws_url("tok-w")).await.unwrap();
    let o_id = o.participant_id().await;
    let w_id = w.participant_id().await;

    let mut o_events = o.subscribe();
    let mut w_events = w.subscribe();

    let open = o.request_stream("upload", "test stream", "utf-8").await.unwrap();
    let stream_id = open.payload["stream_id"].as_str().unwrap().to_string();
    assert_eq!(open.payload["owner"], o_id);

    // Owner writes succeed.
    o.send_stream_frame(&stream_id, b"f1").await.unwrap();
    let (id, data) = recv_stream_frame(&mut w_events).await;
    assert_eq!(id, stream_id);
    assert_eq!(data, b"f1");

    // Non-owner, non-writer is rejected.
    w.send_stream_frame(&stream_id, b"f2").await.unwrap();
    assert_no_stream_frame(&mut o_events).await;

    // Owner grants write access; wait for the ack so the state change is guaranteed applied.
    o.grant_stream_write(&stream_id, &w_id).await.unwrap();
    let granted = recv_kind(&mut o_events, kinds::STREAM_WRITE_GRANTED).await;
    assert_eq!(granted.payload["stream_id"], stream_id);

    w.send_stream_frame(&stream_id, b"f3").await.unwrap();
    let (id, data) = recv_stream_frame(&mut o_events).await;
    assert_eq!(id, stream_id);
    assert_eq!(data, b"f3");

    // Ownership transfers to W; the writer set resets to {W} (§4.3).
    o.transfer_stream_ownership(&stream_id, &w_id).await.unwrap();
    let transferred = recv_kind(&mut o_events, kinds::STREAM_OWNERSHIP_TRANSFERRED).await;
    assert_eq!(transferred.payload["new_owner"], w_id);

    // The old owner is no longer an authorized writer.
    o.send_stream_frame(&stream_id, b"f4").await.unwrap();
    assert_no_stream_frame(&mut w_events).await;

    // The new owner can still write.
    w.send_stream_frame(&stream_id, b"f5").await.unwrap();
    let (id, data) = recv_stream_frame(&mut o_events).await;
    assert_eq!(id, stream_id);
    assert_eq!(data, b"f5");
}
