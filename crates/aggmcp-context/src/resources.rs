//! The Context Injector itself: advertises and serves `workspace://…`
//! resources synthesized from the workspace directory (spec §4.3). It
//! implements [`CapabilityProvider`] so the Session Router composes it
//! with the Backend Pool rather than branching on URI prefix.

use std::path::Path;

use aggmcp_domain::error::{Error, Result};
use aggmcp_domain::ports::CapabilityProvider;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::analyzer::{ProjectType, WorkspaceAnalyzer};

/// Scheme every resource this component advertises uses. Bypasses
/// backend namespacing entirely (spec §3: "Context-injected resources
/// use the reserved scheme `workspace://…` and bypass this rule").
pub const SCHEME_PREFIX: &str = "workspace://";

const README_CANDIDATES: &[&str] = &["README.md", "README.rst", "README.txt", "README"];
const MANIFEST_CANDIDATES: &[&str] = &["package.json", "pubspec.yaml", "pyproject.toml"];

/// Per-session resource synthesizer bound to one workspace path.
pub struct ContextInjector {
    workspace_id: String,
    workspace_path: std::path::PathBuf,
    analyzer: WorkspaceAnalyzer,
}

impl ContextInjector {
    #[must_use]
    pub fn new(workspace_id: impl Into<String>, workspace_path: impl Into<std::path::PathBuf>) -> Self {
        let workspace_path = workspace_path.into();
        Self {
            workspace_id: workspace_id.into(),
            analyzer: WorkspaceAnalyzer::new(workspace_path.clone()),
            workspace_path,
        }
    }

    fn readme_path(&self) -> Option<std::path::PathBuf> {
        README_CANDIDATES
            .iter()
            .map(|name| self.workspace_path.join(name))
            .find(|p| p.is_file())
    }

    fn manifest_path(&self) -> Option<std::path::PathBuf> {
        MANIFEST_CANDIDATES
            .iter()
            .map(|name| self.workspace_path.join(name))
            .find(|p| p.is_file())
    }

    fn gitignore_path(&self) -> Option<std::path::PathBuf> {
        let path = self.workspace_path.join(".gitignore");
        path.is_file().then_some(path)
    }

    /// The detected project type for this workspace, used by the Prompt
    /// Library to scope its prompt set to the same session.
    pub async fn project_type(&self) -> ProjectType {
        self.analyzer.analysis().await.project_type
    }

    fn descriptor(uri: &str, name: &str, description: &str, mime_type: &str) -> Value {
        json!({
            "uri": uri,
            "name": name,
            "description": description,
            "mimeType": mime_type,
        })
    }
}

#[async_trait]
impl CapabilityProvider for ContextInjector {
    async fn list_resources(&self) -> Result<Vec<Value>> {
        // `system-context` is listed first: spec §4.3, "highest advertised
        // priority". `project-info` is always present too.
        let mut resources = vec![
            Self::descriptor(
                "workspace://system-context",
                "System Context",
                "Current time, timezone and platform information",
                "application/json",
            ),
            Self::descriptor(
                "workspace://project-info",
                "Project Info",
                "Detected project type, technologies and file layout",
                "application/json",
            ),
        ];

        if self.readme_path().is_some() {
            resources.push(Self::descriptor("workspace://readme", "README", "Workspace README contents", "text/plain"));
        }
        if self.manifest_path().is_some() {
            resources.push(Self::descriptor(
                "workspace://manifest",
                "Manifest",
                "Package/project manifest contents",
                "text/plain",
            ));
        }
        if self.gitignore_path().is_some() {
            resources.push(Self::descriptor(
                "workspace://gitignore",
                ".gitignore",
                "Workspace .gitignore contents",
                "text/plain",
            ));
        }

        Ok(resources)
    }

    async fn read_resource(&self, uri: &str) -> Result<Value> {
        match uri {
            "workspace://system-context" => Ok(self.system_context()),
            "workspace://project-info" => Ok(self.project_info().await),
            "workspace://readme" => self.read_text_resource(self.readme_path()),
            "workspace://manifest" => self.read_text_resource(self.manifest_path()),
            "workspace://gitignore" => self.read_text_resource(self.gitignore_path()),
            other => Err(Error::not_found(format!("unknown workspace resource '{other}'"))),
        }
    }
}

impl ContextInjector {
    fn system_context(&self) -> Value {
        let now = Utc::now();
        let timezone = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_owned());
        json!({
            "currentDate": now.to_rfc3339(),
            "localTime": now.to_rfc3339(),
            "timezone": timezone,
            "platform": std::env::consts::OS,
            "workspace": {
                "id": self.workspace_id,
                "path": self.workspace_path.display().to_string(),
            },
        })
    }

    async fn project_info(&self) -> Value {
        serde_json::to_value(self.analyzer.analysis().await).unwrap_or(Value::Null)
    }

    fn read_text_resource(&self, path: Option<std::path::PathBuf>) -> Result<Value> {
        let path = path.ok_or_else(|| Error::not_found("resource file not present in this workspace"))?;
        let content = std::fs::read_to_string(&path).map_err(|e| Error::Internal {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Ok(json!({ "content": content, "path": relative_display(&self.workspace_path, &path) }))
    }
}

fn relative_display(workspace_path: &Path, full: &Path) -> String {
    full.strip_prefix(workspace_path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| full.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn injector_for(dir: &tempfile::TempDir) -> ContextInjector {
        ContextInjector::new("ws-1", dir.path())
    }

    #[tokio::test]
    async fn always_advertises_project_info_and_system_context() {
        let dir = tempfile::tempdir().unwrap();
        let injector = injector_for(&dir);
        let resources = injector.list_resources().await.unwrap();
        let uris: Vec<_> = resources.iter().filter_map(|r| r["uri"].as_str()).collect();
        assert!(uris.contains(&"workspace://project-info"));
        assert!(uris.contains(&"workspace://system-context"));
        assert_eq!(uris[0], "workspace://system-context", "system-context must be listed first");
    }

    #[tokio::test]
    async fn readme_only_advertised_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let injector = injector_for(&dir);
        let resources = injector.list_resources().await.unwrap();
        assert!(!resources.iter().any(|r| r["uri"] == "workspace://readme"));

        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        let resources = injector.list_resources().await.unwrap();
        assert!(resources.iter().any(|r| r["uri"] == "workspace://readme"));
    }

    #[tokio::test]
    async fn system_context_embeds_workspace_path_and_parses_as_iso8601() {
        let dir = tempfile::tempdir().unwrap();
        let injector = injector_for(&dir);
        let content = injector.read_resource("workspace://system-context").await.unwrap();
        let current_date = content["currentDate"].as_str().unwrap();
        chrono::DateTime::parse_from_rfc3339(current_date).expect("currentDate must be ISO 8601");
        assert_eq!(content["workspace"]["path"], dir.path().display().to_string());
    }

    #[tokio::test]
    async fn reading_absent_readme_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let injector = injector_for(&dir);
        let err = injector.read_resource("workspace://readme").await.unwrap_err();
        matches!(err, Error::NotFound { .. });
    }

    #[tokio::test]
    async fn unknown_uri_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let injector = injector_for(&dir);
        let err = injector.read_resource("workspace://nope").await.unwrap_err();
        matches!(err, Error::NotFound { .. });
    }
}
