//! Well-known envelope `kind` strings used by the router and control plane.

pub const SYSTEM_WELCOME: &str = "system/welcome";
pub const SYSTEM_PRESENCE: &str = "system/presence";
pub const SYSTEM_ERROR: &str = "system/error";
pub const SYSTEM_LOG: &str = "system/log";

pub const STREAM_REQUEST: &str = "stream/request";
pub const STREAM_OPEN: &str = "stream/open";
pub const STREAM_CLOSE: &str = "stream/close";
pub const STREAM_GRANT_WRITE: &str = "stream/grant-write";
pub const STREAM_REVOKE_WRITE: &str = "stream/revoke-write";
pub const STREAM_TRANSFER_OWNERSHIP: &str = "stream/transfer-ownership";
pub const STREAM_WRITE_GRANTED: &str = "stream/write-granted";
pub const STREAM_WRITE_REVOKED: &str = "stream/write-revoked";
pub const STREAM_OWNERSHIP_TRANSFERRED: &str = "stream/ownership-transferred";

pub const CAPABILITY_GRANT: &str = "capability/grant";
pub const CAPABILITY_REVOKE: &str = "capability/revoke";
pub const CAPABILITY_GRANT_ACK: &str = "capability/grant-ack";

pub const MCP_REQUEST: &str = "mcp/request";
pub const MCP_RESPONSE: &str = "mcp/response";
pub const MCP_PROPOSAL: &str = "mcp/proposal";
