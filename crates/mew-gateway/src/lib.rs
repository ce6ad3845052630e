//! Core library for the Multi-Entity Workspace gateway: the envelope/capability/stream data
//! model, the per-space router, the participant runtime SDK, and the MCP bridge.

pub mod bridge;
pub mod capability;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod kinds;
pub mod participant;
pub mod paths;
pub mod runtime;
pub mod stream;

pub use envelope::{Envelope, PROTOCOL};
pub use error::{GatewayError, Result};
pub use gateway::Space;
pub use paths::{Layout, default_root};
