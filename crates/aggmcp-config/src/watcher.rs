//! Debounced file-change watcher: watches the containing directory
//! (more reliable than a direct file-node watch), debounces bursts of
//! events, and only notifies consumers when the file's textual content
//! actually differs from what was last seen (spec §4.5 and the "Config
//! broadcast" testable property in spec §8).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aggmcp_domain::error::Result;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Mutex;

/// Debounce window before a burst of filesystem events settles into a
/// single reload attempt (spec §4.5: "300 ms debounce").
pub const DEBOUNCE: std::time::Duration = std::time::Duration::from_millis(300);

/// Watches a single file for content changes, debounced, with change
/// notification only on an actual byte-content diff.
pub struct FileChangeWatcher {
    path: PathBuf,
    last_content: Arc<Mutex<Option<String>>>,
    generation: Arc<AtomicU64>,
    _watcher: RecommendedWatcher,
}

impl FileChangeWatcher {
    /// Start watching `path`'s parent directory for changes to `path`
    /// itself. `on_change` is invoked with the new file content exactly
    /// once per settled burst of events that changes the content; it is
    /// never invoked for a write that leaves bytes unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying OS file watcher cannot be
    /// created or the parent directory cannot be watched.
    pub async fn watch<F>(path: impl Into<PathBuf>, debounce: std::time::Duration, on_change: F) -> Result<Self>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let path = path.into();
        let initial = std::fs::read_to_string(&path).ok();
        let last_content = Arc::new(Mutex::new(initial));
        let generation = Arc::new(AtomicU64::new(0));
        let on_change = Arc::new(on_change);

        let watch_path = path.clone();
        let runtime_handle = tokio::runtime::Handle::current();
        let last_content_cb = Arc::clone(&last_content);
        let generation_cb = Arc::clone(&generation);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if !is_relevant(&event, &watch_path) {
                return;
            }
            let my_gen = generation_cb.fetch_add(1, Ordering::SeqCst) + 1;
            let path = watch_path.clone();
            let last_content = Arc::clone(&last_content_cb);
            let generation = Arc::clone(&generation_cb);
            let on_change = Arc::clone(&on_change);
            let debounce = debounce;
            runtime_handle.spawn(async move {
                tokio::time::sleep(debounce).await;
                if generation.load(Ordering::SeqCst) != my_gen {
                    // A newer event superseded this one; let it settle instead.
                    return;
                }
                let Ok(content) = tokio::fs::read_to_string(&path).await else {
                    return;
                };
                let mut guard = last_content.lock().await;
                if guard.as_deref() == Some(content.as_str()) {
                    return;
                }
                *guard = Some(content.clone());
                drop(guard);
                on_change(content);
            });
        })
        .map_err(|e| aggmcp_domain::error::Error::Config {
            message: format!("failed to create file watcher: {e}"),
            source: Some(Box::new(e)),
        })?;

        let parent = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| aggmcp_domain::error::Error::Config {
                message: format!("failed to watch {}: {e}", parent.display()),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            path,
            last_content,
            generation,
            _watcher: watcher,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current cached content, for diagnostics.
    pub async fn last_content(&self) -> Option<String> {
        self.last_content.lock().await.clone()
    }
}

fn is_relevant(event: &Event, target: &Path) -> bool {
    let matches_path = event.paths.iter().any(|p| p == target);
    if !matches_path {
        return false;
    }
    matches!(
        event.kind,
        notify::EventKind::Modify(notify::event::ModifyKind::Data(_))
            | notify::EventKind::Modify(notify::event::ModifyKind::Any)
            | notify::EventKind::Create(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn unchanged_rewrite_does_not_notify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_config.json");
        std::fs::write(&path, r#"{"mcpServers":{}}"#).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        let _watcher = FileChangeWatcher::watch(&path, Duration::from_millis(50), move |_content| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        // Re-write identical bytes.
        std::fs::write(&path, r#"{"mcpServers":{}}"#).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn changed_content_notifies_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_config.json");
        std::fs::write(&path, r#"{"mcpServers":{}}"#).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        let _watcher = FileChangeWatcher::watch(&path, Duration::from_millis(50), move |_content| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        std::fs::write(&path, r#"{"mcpServers":{"a":{"command":"x"}}}"#).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
