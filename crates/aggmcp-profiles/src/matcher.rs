//! Workspace file-tree scanning and glob matching (spec §4.2).
//!
//! Scans bounded-depth, skipping directories that would otherwise blow up
//! the walk (`node_modules`, `build`, `dist`) or that are hidden — except
//! `.firebaserc`, which projects conventionally keep at the workspace root
//! and which several profiles match on directly.

use std::path::Path;

use aggmcp_domain::profile::{Profile, ProfileDocument, CATCH_ALL_PATTERN};
use globset::{GlobBuilder, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

/// Default scan depth (spec §4.2: "bounded depth (default 3)").
pub const DEFAULT_MAX_DEPTH: usize = 3;

const SKIPPED_DIR_NAMES: &[&str] = &["node_modules", "build", "dist"];

/// Name of the one dotfile the hidden-directory skip explicitly keeps.
const KEPT_DOTFILE: &str = ".firebaserc";

fn should_descend(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return true;
    }
    // The root entry itself is never skipped regardless of its name.
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if SKIPPED_DIR_NAMES.contains(&name.as_ref()) {
        return false;
    }
    if name.starts_with('.') && name != KEPT_DOTFILE {
        return false;
    }
    true
}

/// List workspace-relative file paths up to `max_depth`, applying the
/// skip rules above. Directories themselves are not returned, only
/// files (including dotfiles — spec: "dot-files included").
#[must_use]
pub fn scan_workspace_files(workspace_path: &Path, max_depth: usize) -> Vec<String> {
    WalkDir::new(workspace_path)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(should_descend)
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(workspace_path)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}

/// Compile a profile's `match` patterns into a [`globset::GlobSet`],
/// excluding the catch-all pattern (only the designated default profile
/// may use it — spec §4.2: "`excluding` the catch-all `**/*` pattern").
///
/// Returns `None` if, after exclusion, the profile has no patterns left
/// to compile (it can then never win a match, which is correct for a
/// profile that only declared the catch-all).
fn compiled_patterns(profile: &Profile) -> Option<globset::GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut any = false;
    for pattern in &profile.match_patterns {
        if pattern == CATCH_ALL_PATTERN {
            continue;
        }
        let Ok(glob) = GlobBuilder::new(pattern).case_insensitive(true).literal_separator(false).build() else {
            tracing::warn!(profile = %profile.name, pattern, "skipping unparseable match pattern");
            continue;
        };
        builder.add(glob);
        any = true;
    }
    if !any {
        return None;
    }
    builder.build().ok()
}

/// Resolve the profile that should govern `workspace_path`, per spec
/// §4.2 / §8 ("Profile matching determinism"): the first non-default
/// profile (in declared order) with any compiled pattern matching any
/// scanned file; the default profile otherwise.
///
/// # Panics
///
/// Never panics on a well-formed [`ProfileDocument`]; a document with no
/// resolvable default profile is a configuration error the caller should
/// have already rejected at load time.
#[must_use]
pub fn resolve_profile<'a>(document: &'a ProfileDocument, workspace_path: &Path) -> &'a Profile {
    resolve_profile_for_files(document, &scan_workspace_files(workspace_path, DEFAULT_MAX_DEPTH))
}

/// [`resolve_profile`], but against an already-scanned file list — used
/// directly by tests and by callers that already hold the scan (e.g. the
/// Context Injector, which scans the same tree for its own purposes).
#[must_use]
pub fn resolve_profile_for_files<'a>(document: &'a ProfileDocument, files: &[String]) -> &'a Profile {
    for profile in document.non_default_profiles() {
        let Some(set) = compiled_patterns(profile) else { continue };
        if files.iter().any(|file| set.is_match(file)) {
            return profile;
        }
    }
    document
        .default_profile()
        .expect("profile document must declare a resolvable default profile")
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggmcp_domain::profile::shipped_default_document;

    #[test]
    fn flutter_workspace_matches_flutter_profile() {
        let doc = shipped_default_document();
        let files = vec!["pubspec.yaml".to_owned(), "lib/main.dart".to_owned()];
        let profile = resolve_profile_for_files(&doc, &files);
        assert_eq!(profile.name, "Flutter/Firebase Projects");
        assert_eq!(
            profile.backend_ids,
            vec!["firebase-mcp".to_owned(), "server-filesystem".to_owned(), "server-git".to_owned()]
        );
    }

    #[test]
    fn notes_only_workspace_falls_back_to_default() {
        let doc = shipped_default_document();
        let files = vec!["notes.txt".to_owned()];
        let profile = resolve_profile_for_files(&doc, &files);
        assert_eq!(profile.name, "Default (Minimal)");
        assert_eq!(profile.backend_ids, vec!["server-filesystem".to_owned()]);
    }

    #[test]
    fn node_project_matches_nodejs_profile() {
        let doc = shipped_default_document();
        let files = vec!["package.json".to_owned(), "src/index.ts".to_owned()];
        let profile = resolve_profile_for_files(&doc, &files);
        assert_eq!(profile.name, "Node.js Projects");
    }

    #[test]
    fn declared_order_wins_over_pattern_specificity() {
        // A workspace that matches both Flutter and Node patterns takes the
        // first declared profile (Flutter), not the "better" match.
        let doc = shipped_default_document();
        let files = vec!["pubspec.yaml".to_owned(), "package.json".to_owned()];
        let profile = resolve_profile_for_files(&doc, &files);
        assert_eq!(profile.name, "Flutter/Firebase Projects");
    }

    #[test]
    fn catch_all_pattern_is_excluded_from_non_default_matching() {
        let doc = ProfileDocument {
            version: 1,
            profiles: vec![
                Profile {
                    name: "Catch-all-abuser".to_owned(),
                    match_patterns: vec![CATCH_ALL_PATTERN.to_owned()],
                    backend_ids: vec!["should-never-win".to_owned()],
                    resources: vec![],
                    prompts: vec![],
                },
                Profile {
                    name: "Default".to_owned(),
                    match_patterns: vec![CATCH_ALL_PATTERN.to_owned()],
                    backend_ids: vec!["server-filesystem".to_owned()],
                    resources: vec![],
                    prompts: vec![],
                },
            ],
            default_profile: "Default".to_owned(),
        };
        let profile = resolve_profile_for_files(&doc, &["anything.txt".to_owned()]);
        assert_eq!(profile.name, "Default");
    }

    #[rstest::rstest]
    #[case::flutter(&["pubspec.yaml"], "Flutter/Firebase Projects")]
    #[case::flutter_by_dart_file(&["lib/main.dart"], "Flutter/Firebase Projects")]
    #[case::node(&["package.json"], "Node.js Projects")]
    #[case::python(&["pyproject.toml"], "Python Projects")]
    #[case::default_fallback(&["notes.txt"], "Default (Minimal)")]
    #[case::no_files(&[], "Default (Minimal)")]
    fn resolves_the_expected_profile_for_each_file_set(#[case] files: &[&str], #[case] expected_profile: &str) {
        let doc = shipped_default_document();
        let files: Vec<String> = files.iter().map(|f| (*f).to_owned()).collect();
        let profile = resolve_profile_for_files(&doc, &files);
        assert_eq!(profile.name, expected_profile);
    }

    #[test]
    fn scan_skips_node_modules_and_hidden_dirs_but_keeps_firebaserc() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join(".git/HEAD"), "").unwrap();
        std::fs::write(root.join(".firebaserc"), "{}").unwrap();
        std::fs::write(root.join("pubspec.yaml"), "").unwrap();

        let files = scan_workspace_files(root, DEFAULT_MAX_DEPTH);
        assert!(!files.iter().any(|f| f.contains("node_modules")));
        assert!(!files.iter().any(|f| f.contains(".git/HEAD")));
        assert!(files.contains(&".firebaserc".to_owned()));
        assert!(files.contains(&"pubspec.yaml".to_owned()));
    }
}
