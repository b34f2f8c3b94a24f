//! Feature side-channels layered on top of tool/resource dispatch:
//! result caching, cost tracking, usage analytics, a security sandbox,
//! relevance-based tool filtering and a small prompt library.

pub mod analytics;
pub mod cache;
pub mod cost;
pub mod prompts;
pub mod security;
pub mod tool_filter;

pub use analytics::Analytics;
pub use cache::ResultCache;
pub use cost::CostTracker;
pub use prompts::PromptLibrary;
pub use security::SecuritySandbox;
