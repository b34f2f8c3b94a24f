//! Configuration loading, backend-definition parsing, path resolution,
//! and hot-reload file watching for the aggregating MCP proxy.

pub mod app_config;
pub mod backends;
pub mod event_bus;
pub mod loader;
pub mod paths;
pub mod watcher;

pub use app_config::AppConfig;
pub use event_bus::BroadcastEventBus;
pub use loader::load;
pub use watcher::FileChangeWatcher;
