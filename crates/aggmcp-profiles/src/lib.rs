//! # Profile engine
//!
//! Matches a workspace's file tree against an ordered list of profiles
//! and resolves the single profile that governs it, per spec §4.2.

pub mod matcher;
pub mod store;

pub use matcher::{resolve_profile, resolve_profile_for_files, scan_workspace_files, DEFAULT_MAX_DEPTH};
pub use store::{watch, watch_with, ProfileStore};
