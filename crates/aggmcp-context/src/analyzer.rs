//! Workspace analysis: project type and technology detection, file
//! counts by extension, memoized with a 30-second TTL (spec §4.3).

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use aggmcp_profiles::scan_workspace_files;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::git::{read_git_info, GitInfo};

/// How long a computed analysis stays valid before the next read
/// recomputes it (spec §4.3: "30-second TTL").
pub const ANALYSIS_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Flutter,
    Nodejs,
    Python,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceAnalysis {
    pub path: String,
    pub base_name: String,
    pub project_type: ProjectType,
    pub technologies: Vec<String>,
    pub file_counts_by_extension: HashMap<String, usize>,
    pub git: GitInfo,
}

/// Technologies detected purely by file presence.
const FILE_PRESENCE_TECHNOLOGIES: &[(&str, &str)] = &[
    ("Dockerfile", "Docker"),
    ("docker-compose.yml", "Docker"),
    ("firebase.json", "Firebase"),
    (".firebaserc", "Firebase"),
];

/// Technologies detected by inspecting `package.json`'s dependency keys.
const PACKAGE_JSON_DEPENDENCY_TECHNOLOGIES: &[(&str, &str)] = &[
    ("next", "Next.js"),
    ("react", "React"),
    ("vue", "Vue"),
    ("@angular/core", "Angular"),
    ("express", "Express"),
    ("typescript", "TypeScript"),
    ("firebase", "Firebase"),
    ("firebase-admin", "Firebase"),
];

fn detect_project_type(files: &[String]) -> ProjectType {
    if files.iter().any(|f| f == "pubspec.yaml") {
        ProjectType::Flutter
    } else if files.iter().any(|f| f == "package.json") {
        ProjectType::Nodejs
    } else if files
        .iter()
        .any(|f| matches!(f.as_str(), "pyproject.toml" | "requirements.txt" | "setup.py"))
    {
        ProjectType::Python
    } else {
        ProjectType::Unknown
    }
}

fn detect_technologies(workspace_path: &Path, files: &[String]) -> Vec<String> {
    let mut technologies = Vec::new();

    for (marker, tech) in FILE_PRESENCE_TECHNOLOGIES {
        if files.iter().any(|f| f == marker) && !technologies.contains(&(*tech).to_owned()) {
            technologies.push((*tech).to_owned());
        }
    }

    if let Ok(content) = std::fs::read_to_string(workspace_path.join("package.json")) {
        if let Ok(parsed) = serde_json::from_str::<Value>(&content) {
            let mut all_deps = serde_json::Map::new();
            for section in ["dependencies", "devDependencies", "peerDependencies"] {
                if let Some(Value::Object(map)) = parsed.get(section) {
                    all_deps.extend(map.clone());
                }
            }
            for (dep_name, tech) in PACKAGE_JSON_DEPENDENCY_TECHNOLOGIES {
                if all_deps.contains_key(*dep_name) && !technologies.contains(&(*tech).to_owned()) {
                    technologies.push((*tech).to_owned());
                }
            }
        }
    }

    technologies
}

fn count_by_extension(files: &[String]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for file in files {
        let ext = Path::new(file)
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("")
            .to_lowercase();
        let key = if ext.is_empty() { "(none)".to_owned() } else { ext };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

fn analyze(workspace_path: &Path) -> WorkspaceAnalysis {
    let files = scan_workspace_files(workspace_path, aggmcp_profiles::DEFAULT_MAX_DEPTH);
    WorkspaceAnalysis {
        path: workspace_path.display().to_string(),
        base_name: workspace_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        project_type: detect_project_type(&files),
        technologies: detect_technologies(workspace_path, &files),
        file_counts_by_extension: count_by_extension(&files),
        git: read_git_info(workspace_path),
    }
}

/// Memoizes one workspace's analysis for [`ANALYSIS_TTL`]; concurrent
/// readers during the TTL window get the same cached value without
/// re-scanning the directory.
pub struct WorkspaceAnalyzer {
    workspace_path: std::path::PathBuf,
    cached: Mutex<Option<(Instant, WorkspaceAnalysis)>>,
}

impl WorkspaceAnalyzer {
    #[must_use]
    pub fn new(workspace_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            cached: Mutex::new(None),
        }
    }

    pub async fn analysis(&self) -> WorkspaceAnalysis {
        let mut guard = self.cached.lock().await;
        if let Some((computed_at, analysis)) = guard.as_ref() {
            if computed_at.elapsed() < ANALYSIS_TTL {
                return analysis.clone();
            }
        }
        let fresh = analyze(&self.workspace_path);
        *guard = Some((Instant::now(), fresh.clone()));
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flutter_workspace_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pubspec.yaml"), "").unwrap();
        let analysis = analyze(dir.path());
        assert_eq!(analysis.project_type, ProjectType::Flutter);
    }

    #[test]
    fn nodejs_dependencies_surface_as_technologies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies":{"react":"^18.0.0","express":"^4.0.0"},"devDependencies":{"typescript":"^5.0.0"}}"#,
        )
        .unwrap();
        let analysis = analyze(dir.path());
        assert_eq!(analysis.project_type, ProjectType::Nodejs);
        assert!(analysis.technologies.contains(&"React".to_owned()));
        assert!(analysis.technologies.contains(&"Express".to_owned()));
        assert!(analysis.technologies.contains(&"TypeScript".to_owned()));
    }

    #[test]
    fn unrecognized_workspace_is_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let analysis = analyze(dir.path());
        assert_eq!(analysis.project_type, ProjectType::Unknown);
        assert!(analysis.technologies.is_empty());
    }

    #[test]
    fn file_counts_group_by_lowercase_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.RS"), "").unwrap();
        std::fs::write(dir.path().join("b.rs"), "").unwrap();
        std::fs::write(dir.path().join("Makefile"), "").unwrap();
        let analysis = analyze(dir.path());
        assert_eq!(analysis.file_counts_by_extension.get("rs"), Some(&2));
        assert_eq!(analysis.file_counts_by_extension.get("(none)"), Some(&1));
    }

    #[tokio::test]
    async fn analyzer_caches_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = WorkspaceAnalyzer::new(dir.path());
        let first = analyzer.analysis().await;
        std::fs::write(dir.path().join("pubspec.yaml"), "").unwrap();
        let second = analyzer.analysis().await;
        assert_eq!(first.project_type, second.project_type);
        assert_eq!(second.project_type, ProjectType::Unknown);
    }
}
