//! Loads the profile document from its well-known location, writing the
//! shipped default the first time none exists (spec §4.2), and keeps an
//! in-memory copy fresh via the shared [`aggmcp_config::FileChangeWatcher`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aggmcp_config::FileChangeWatcher;
use aggmcp_domain::error::{Error, Result};
use aggmcp_domain::profile::{shipped_default_document, Profile, ProfileDocument};
use arc_swap::ArcSwap;

/// Holds the current profile document behind a lock-free swap so readers
/// (every `tools/list`-triggering request, indirectly) never block on a
/// reload in progress.
pub struct ProfileStore {
    path: PathBuf,
    current: ArcSwap<ProfileDocument>,
}

impl ProfileStore {
    /// Load the document at `path`, writing the shipped default first if
    /// nothing exists there yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be created/read, or
    /// exists but fails to parse as a profile document.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_default_document(&path)?;
        let document = read_document(&path)?;
        Ok(Self {
            path,
            current: ArcSwap::from_pointee(document),
        })
    }

    #[must_use]
    pub fn document(&self) -> Arc<ProfileDocument> {
        self.current.load_full()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All profiles, in declared order.
    #[must_use]
    pub fn list_profiles(&self) -> Vec<Profile> {
        self.document().profiles.clone()
    }

    #[must_use]
    pub fn get_profile(&self, name: &str) -> Option<Profile> {
        self.document().profiles.iter().find(|p| p.name == name).cloned()
    }

    /// Insert or replace a profile by name and persist the document to
    /// disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document cannot be written back.
    pub fn upsert_profile(&self, profile: Profile) -> Result<()> {
        let mut document = (*self.document()).clone();
        if let Some(existing) = document.profiles.iter_mut().find(|p| p.name == profile.name) {
            *existing = profile;
        } else {
            document.profiles.push(profile);
        }
        write_document(&self.path, &document)?;
        self.current.store(Arc::new(document));
        Ok(())
    }

    /// Replace the whole in-memory document — called by the file watcher
    /// callback on a settled, content-changed reload.
    pub fn replace(&self, document: ProfileDocument) {
        self.current.store(Arc::new(document));
    }
}

/// Start a background file watch over `store`'s profile document,
/// reloading the in-memory copy on each settled, content-changed write.
/// A write that fails to parse is logged and ignored — the store keeps
/// serving the last-known-good document rather than going dark.
///
/// # Errors
///
/// Returns an error if the underlying OS file watcher cannot be created.
pub async fn watch(store: Arc<ProfileStore>) -> Result<FileChangeWatcher> {
    watch_with(store, || {}).await
}

/// Like [`watch`], but also invokes `on_reload` after a successful,
/// settled reload — used by the HTTP server to broadcast a
/// `ProfilesChanged` event and re-bind active sessions to their
/// (possibly now different) profile.
///
/// # Errors
///
/// Returns an error if the underlying OS file watcher cannot be created.
pub async fn watch_with<F>(store: Arc<ProfileStore>, on_reload: F) -> Result<FileChangeWatcher>
where
    F: Fn() + Send + Sync + 'static,
{
    let path = store.path.clone();
    FileChangeWatcher::watch(path, aggmcp_config::watcher::DEBOUNCE, move |content| match parse_document(&content) {
        Ok(document) => {
            store.replace(document);
            on_reload();
        }
        Err(err) => tracing::warn!(error = %err, "ignoring unparseable profile document reload"),
    })
    .await
}

fn ensure_default_document(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_document(path, &shipped_default_document())
}

fn read_document(path: &Path) -> Result<ProfileDocument> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("failed to read profile document at {}: {e}", path.display()),
        source: Some(Box::new(e)),
    })?;
    parse_document(&content)
}

/// Parse profile document content directly (used by the watcher reload
/// path and by tests).
///
/// # Errors
///
/// Returns [`Error::Config`] on malformed JSON or an unresolvable
/// `defaultProfile` reference.
pub fn parse_document(content: &str) -> Result<ProfileDocument> {
    let document: ProfileDocument = serde_json::from_str(content).map_err(|e| Error::Config {
        message: format!("failed to parse profile document: {e}"),
        source: Some(Box::new(e)),
    })?;
    if document.default_profile().is_none() {
        return Err(Error::config(format!(
            "profile document's defaultProfile '{}' does not name a declared profile",
            document.default_profile
        )));
    }
    Ok(document)
}

fn write_document(path: &Path, document: &ProfileDocument) -> Result<()> {
    let content = serde_json::to_string_pretty(document)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gets_shipped_default_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let store = ProfileStore::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.document().default_profile, "Default (Minimal)");
    }

    #[test]
    fn existing_file_is_loaded_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(
            &path,
            r#"{"version":1,"profiles":[{"name":"Only","match":["**/*"],"servers":[]}],"defaultProfile":"Only"}"#,
        )
        .unwrap();
        let store = ProfileStore::load(&path).unwrap();
        assert_eq!(store.list_profiles().len(), 1);
    }

    #[test]
    fn unresolvable_default_profile_is_rejected() {
        let err = parse_document(
            r#"{"version":1,"profiles":[{"name":"Only","match":[],"servers":[]}],"defaultProfile":"Missing"}"#,
        )
        .unwrap_err();
        matches!(err, Error::Config { .. });
    }

    #[test]
    fn upsert_persists_and_updates_in_memory_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let store = ProfileStore::load(&path).unwrap();
        store
            .upsert_profile(Profile {
                name: "Custom".to_owned(),
                match_patterns: vec!["Cargo.toml".to_owned()],
                backend_ids: vec!["server-git".to_owned()],
                resources: vec![],
                prompts: vec![],
            })
            .unwrap();
        assert!(store.get_profile("Custom").is_some());
        let reloaded = read_document(&path).unwrap();
        assert!(reloaded.profiles.iter().any(|p| p.name == "Custom"));
    }
}
