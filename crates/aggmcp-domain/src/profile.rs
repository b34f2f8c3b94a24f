//! Profile document types, per the data model's "Profile" entity:
//! `name`, ordered `match` globs, ordered backend `ids`, and optional
//! default-exposed resources/prompts. Profiles have a total order; the
//! first profile whose any pattern matches any file in the workspace
//! wins, and a distinguished default profile is always last.

use serde::{Deserialize, Serialize};

/// The catch-all pattern that is excluded from profile matching (only the
/// designated default profile may "match everything").
pub const CATCH_ALL_PATTERN: &str = "**/*";

/// A single named profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    #[serde(rename = "match", default)]
    pub match_patterns: Vec<String>,
    #[serde(rename = "servers", default)]
    pub backend_ids: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// The top-level profile document loaded from the well-known profile
/// config location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub version: u32,
    pub profiles: Vec<Profile>,
    #[serde(rename = "defaultProfile")]
    pub default_profile: String,
}

impl ProfileDocument {
    /// The profile designated as default by `defaultProfile`, if present
    /// among `profiles`.
    #[must_use]
    pub fn default_profile(&self) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == self.default_profile)
    }

    /// All profiles other than the designated default, in declared order.
    pub fn non_default_profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter().filter(move |p| p.name != self.default_profile)
    }
}

/// The shipped default profile document, written to the well-known
/// location the first time the Profile Engine runs and none exists yet.
#[must_use]
pub fn shipped_default_document() -> ProfileDocument {
    ProfileDocument {
        version: 1,
        profiles: vec![
            Profile {
                name: "Flutter/Firebase Projects".to_owned(),
                match_patterns: vec!["pubspec.yaml".to_owned(), "**/*.dart".to_owned()],
                backend_ids: vec![
                    "firebase-mcp".to_owned(),
                    "server-filesystem".to_owned(),
                    "server-git".to_owned(),
                ],
                resources: vec![],
                prompts: vec![],
            },
            Profile {
                name: "Node.js Projects".to_owned(),
                match_patterns: vec!["package.json".to_owned()],
                backend_ids: vec!["server-filesystem".to_owned(), "server-git".to_owned()],
                resources: vec![],
                prompts: vec![],
            },
            Profile {
                name: "Python Projects".to_owned(),
                match_patterns: vec![
                    "pyproject.toml".to_owned(),
                    "requirements.txt".to_owned(),
                    "setup.py".to_owned(),
                ],
                backend_ids: vec!["server-filesystem".to_owned(), "server-git".to_owned()],
                resources: vec![],
                prompts: vec![],
            },
            Profile {
                name: "Default (Minimal)".to_owned(),
                match_patterns: vec![CATCH_ALL_PATTERN.to_owned()],
                backend_ids: vec!["server-filesystem".to_owned()],
                resources: vec![],
                prompts: vec![],
            },
        ],
        default_profile: "Default (Minimal)".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_default_has_named_default_profile() {
        let doc = shipped_default_document();
        let default = doc.default_profile().expect("default profile present");
        assert_eq!(default.name, "Default (Minimal)");
        assert_eq!(default.backend_ids, vec!["server-filesystem".to_owned()]);
    }

    #[test]
    fn non_default_excludes_the_default_entry() {
        let doc = shipped_default_document();
        let names: Vec<_> = doc.non_default_profiles().map(|p| p.name.as_str()).collect();
        assert!(!names.contains(&"Default (Minimal)"));
        assert_eq!(names.len(), 3);
    }
}
