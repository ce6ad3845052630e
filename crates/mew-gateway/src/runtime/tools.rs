//! Local tool registry for participants that answer `mcp/request` envelopes directly (as
//! opposed to participants that only proxy to an external MCP subprocess, see `crate::bridge`).

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use anyhow::Result;
use serde_json::Value;

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
pub type ToolFn = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, (ToolDescriptor, ToolFn)>,
}

impl ToolRegistry {
    pub fn register(&mut self, descriptor: ToolDescriptor, handler: ToolFn) {
        self.handlers.insert(descriptor.name.clone(), (descriptor, handler));
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.handlers.values().map(|(descriptor, _)| descriptor.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value> {
        let (_, handler) = self
            .handlers
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("tool '{name}' is not registered"))?;
        handler(arguments).await
    }
}
