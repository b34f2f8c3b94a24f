//! # Backend connection pool
//!
//! Owns every backend subprocess (or remote HTTP channel) the proxy
//! fronts: spawns them, speaks MCP JSON-RPC over their stdio (or over
//! HTTP for remote transports), and exposes the aggregated,
//! namespaced view of their tools/resources/prompts that the Session
//! Router hands to clients.

pub mod framing;
pub mod pool;
pub mod remote;
pub mod stdio;

pub use pool::BackendPool;
