//! Best-effort Git metadata parsed directly from `.git/HEAD`,
//! `.git/config` and `.git/index`'s mtime — no `git` subprocess spawned,
//! per spec §4.3's "no external process" invariant.

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GitInfo {
    pub is_repo: bool,
    pub branch: Option<String>,
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_modified_at: Option<DateTime<Utc>>,
}

/// Read whatever Git metadata is available under `workspace_path/.git`.
/// Returns `GitInfo { is_repo: false, .. }` (never an error) when there is
/// no `.git` directory — "not a Git repo" is a normal, common case.
#[must_use]
pub fn read_git_info(workspace_path: &Path) -> GitInfo {
    let git_dir = workspace_path.join(".git");
    if !git_dir.is_dir() {
        return GitInfo::default();
    }

    GitInfo {
        is_repo: true,
        branch: read_branch(&git_dir),
        remote_url: read_remote_url(&git_dir),
        index_modified_at: read_index_mtime(&git_dir),
    }
}

/// `.git/HEAD` is either `ref: refs/heads/<branch>\n` (on a branch) or a
/// raw 40-hex-char commit SHA (detached HEAD).
fn read_branch(git_dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(git_dir.join("HEAD")).ok()?;
    let content = content.trim();
    if let Some(rest) = content.strip_prefix("ref: refs/heads/") {
        return Some(rest.to_owned());
    }
    if content.len() >= 7 && content.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(format!("detached:{}", &content[..7]));
    }
    None
}

/// Extract `[remote "origin"] url = ...` from `.git/config` with a small
/// line-oriented parser — no need for a full INI parser for this one
/// value.
fn read_remote_url(git_dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(git_dir.join("config")).ok()?;
    let mut in_origin_section = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_origin_section = trimmed.eq_ignore_ascii_case(r#"[remote "origin"]"#);
            continue;
        }
        if in_origin_section {
            if let Some(value) = trimmed.strip_prefix("url") {
                if let Some(value) = value.trim_start().strip_prefix('=') {
                    return Some(value.trim().to_owned());
                }
            }
        }
    }
    None
}

fn read_index_mtime(git_dir: &Path) -> Option<DateTime<Utc>> {
    let metadata = std::fs::metadata(git_dir.join("index")).ok()?;
    let modified: SystemTime = metadata.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_repo_workspace_reports_not_a_repo() {
        let dir = tempfile::tempdir().unwrap();
        let info = read_git_info(dir.path());
        assert!(!info.is_repo);
        assert_eq!(info.branch, None);
    }

    #[test]
    fn branch_head_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        let info = read_git_info(dir.path());
        assert!(info.is_repo);
        assert_eq!(info.branch.as_deref(), Some("main"));
    }

    #[test]
    fn detached_head_is_reported_with_short_sha() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        std::fs::write(git_dir.join("HEAD"), "abcdef0123456789abcdef0123456789abcdef01\n").unwrap();
        let info = read_git_info(dir.path());
        assert_eq!(info.branch.as_deref(), Some("detached:abcdef0"));
    }

    #[test]
    fn remote_url_is_parsed_from_origin_section() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(
            git_dir.join("config"),
            "[core]\n\trepositoryformatversion = 0\n[remote \"origin\"]\n\turl = https://example.com/repo.git\n\tfetch = +refs/*:refs/*\n",
        )
        .unwrap();
        let info = read_git_info(dir.path());
        assert_eq!(info.remote_url.as_deref(), Some("https://example.com/repo.git"));
    }
}
