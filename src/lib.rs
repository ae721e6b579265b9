//! MCP gateway core: exposes local HTTP-style routes and federated MCP
//! servers ("bridges") as one flat tool catalog over JSON-RPC 2.0.

pub mod bridge;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod paths;
pub mod protocol;
pub mod route;
pub mod schema;
pub mod server;
pub mod store;
pub mod upstream;

pub use error::{GatewayError, Result};
pub use protocol::{ProtocolRouter, SessionState};
