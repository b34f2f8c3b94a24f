//! # Domain layer
//!
//! Core types shared by every other crate in the workspace: the backend
//! definition/status data model, profile documents, workspace sessions,
//! the MCP JSON-RPC envelope, domain events and the single workspace-wide
//! error type. Pure data and traits — no subprocess, file or network I/O
//! lives here.

pub mod backend;
pub mod error;
pub mod events;
pub mod mcp;
pub mod ports;
pub mod profile;
pub mod session;

pub use error::{Error, Result};
