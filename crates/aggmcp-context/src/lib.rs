//! # Context Injector
//!
//! Synthesizes `workspace://…` MCP resources from a workspace directory
//! so clients get project metadata without a backend being involved
//! (spec §4.3).

pub mod analyzer;
pub mod git;
pub mod resources;

pub use analyzer::{ProjectType, WorkspaceAnalysis, WorkspaceAnalyzer};
pub use resources::{ContextInjector, SCHEME_PREFIX};
