//! Error type for MCP client/server operations.

use thiserror::Error;

/// Errors from MCP client/server operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to connect to an MCP server, or a connection-level operation failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// MCP initialization handshake failed.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A protocol-level request (e.g. listing tools) failed.
    #[error("protocol error: {0}")]
    Protocol(String),
}
