//! §8.4 scenario 3: a tool call routed to a bridge-like participant is answered out of its
//! local tool registry, with a reply correlated back to the original request.
//!
//! The bridge's actual subprocess plumbing (`mew_gateway::bridge`) is exercised separately by
//! that module's own unit tests; here `fs` registers a tool directly on its
//! `runtime::Runtime` (the same `register_tool` call a bridge issues once it has listed its
//! subprocess's tools) so this test covers the gateway's request/reply routing together with
//! the participant runtime's automatic `tools/call` dispatch (§4.2).

mod common;

use std::sync::Arc;

use mew_bench::BenchClient;
use mew_gateway::{kinds, runtime::tools::ToolDescriptor};
use serde_json::json;

use common::{TestGateway, participant};

#[tokio::test]
async fn tool_call_reply_is_correlated_to_the_request() {
    let gateway = TestGateway::start(&[
        participant("fs", "tok-fs", &["mcp/*"]),
        participant("y", "tok-y", &["mcp/*"]),
    ])
    .await;

    let fs = BenchClient::connect(&gateway.ws_url("tok-fs")).await.unwrap();
    let y = BenchClient::connect(&gateway.ws_url("tok-y")).await.unwrap();

    fs.register_tool(
        ToolDescriptor {
            name: "read_file".to_string(),
            description: "reads a file from disk".to_string(),
            input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        },
        Arc::new(|_arguments| {
            Box::pin(async move { Ok(json!({"content": [{"type": "text", "text": "file contents"}]})) })
        }),
    )
    .await;

    let reply = y
        .request(
            kinds::MCP_REQUEST,
            vec!["fs".to_string()],
            json!({"method": "tools/call", "params": {"name": "read_file", "arguments": {"path": "/a"}}}),
        )
        .await
        .unwrap();

    assert_eq!(reply.kind, kinds::MCP_RESPONSE);
    assert_eq!(reply.payload["content"][0]["text"], "file contents");
}

#[tokio::test]
async fn tools_list_reflects_registered_descriptors() {
    let gateway = TestGateway::start(&[
        participant("fs", "tok-fs", &["mcp/*"]),
        participant("y", "tok-y", &["mcp/*"]),
    ])
    .await;

    let fs = BenchClient::connect(&gateway.ws_url("tok-fs")).await.unwrap();
    let y = BenchClient::connect(&gateway.ws_url("tok-y")).await.unwrap();

    fs.register_tool(
        ToolDescriptor {
            name: "read_file".to_string(),
            description: "reads a file from disk".to_string(),
            input_schema: json!({"type": "object"}),
        },
        Arc::new(|_arguments| Box::pin(async move { Ok(json!({})) })),
    )
    .await;

    let tools = y.list_tools("fs").await.unwrap();
    assert_eq!(tools["tools"][0]["name"], "read_file");
}

#[tokio::test]
async fn calling_an_unregistered_tool_yields_method_not_found() {
    let gateway = TestGateway::start(&[
        participant("fs", "tok-fs", &["mcp/*"]),
        participant("y", "tok-y", &["mcp/*"]),
    ])
    .await;

    let fs = BenchClient::connect(&gateway.ws_url("tok-fs")).await.unwrap();
    let y = BenchClient::connect(&gateway.ws_url("tok-y")).await.unwrap();

    // Register at least one tool so the registry is non-empty and the runtime takes over
    // dispatch for this participant, then ask for a name that was never registered.
    fs.register_tool(
        ToolDescriptor {
            name: "read_file".to_string(),
            description: "reads a file from disk".to_string(),
            input_schema: json!({"type": "object"}),
        },
        Arc::new(|_arguments| Box::pin(async move { Ok(json!({})) })),
    )
    .await;

    let reply = y.call_tool("fs", "write_file", json!({"path": "/a"})).await.unwrap();
    assert_eq!(reply["error"]["code"], "method_not_found");
}
