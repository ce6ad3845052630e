//! Thin wrapper around an rmcp stdio client talking to a spawned MCP server subprocess.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParam, Tool},
    service::RunningService,
    transport::TokioChildProcess,
};
use serde_json::{Map, Value};
use tokio::process::Command;

pub struct McpSubprocess {
    service: RunningService<RoleClient, ()>,
}

impl McpSubprocess {
    pub async fn spawn(command: &str, args: &[String], env: &BTreeMap<String, String>) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let transport = TokioChildProcess::new(cmd)
            .with_context(|| format!("failed to spawn mcp subprocess: {command}"))?;
        let service = ().serve(transport).await.context("mcp subprocess initialize failed")?;

        Ok(Self { service })
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result = self.service.list_tools(Default::default()).await.context("tools/list failed")?;
        Ok(result.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Some(map)
            }
        };
        let result = self
            .service
            .call_tool(CallToolRequestParam { name: name.to_string().into(), arguments })
            .await
            .context("tools/call failed")?;
        serde_json::to_value(result).context("failed to serialise tool result")
    }

    pub async fn shutdown(self) -> Result<()> {
        self.service.cancel().await.context("failed to shut down mcp subprocess")?;
        Ok(())
    }
}
