//! Prompt Library (spec §4.8): a static set of general prompts, plus
//! prompts scoped to the workspace's detected project type, plus any
//! loaded from an on-disk prompts directory. Unknown prompt names fall
//! through to a generic message rather than erroring.

use std::path::{Path, PathBuf};

use aggmcp_context::ProjectType;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct StaticPrompt {
    name: &'static str,
    description: &'static str,
    content: &'static str,
}

const GENERAL_PROMPTS: &[StaticPrompt] = &[
    StaticPrompt {
        name: "explain-codebase",
        description: "Summarize the structure and purpose of this workspace",
        content: "Explain the overall structure, key modules, and purpose of this codebase.",
    },
    StaticPrompt {
        name: "review-changes",
        description: "Review the currently staged or recent changes",
        content: "Review the pending changes in this workspace for correctness and style.",
    },
];

const FLUTTER_PROMPTS: &[StaticPrompt] = &[StaticPrompt {
    name: "flutter-widget-review",
    description: "Review a Flutter widget for common pitfalls",
    content: "Review this Flutter widget tree for rebuild performance and state-management issues.",
}];

const NODEJS_PROMPTS: &[StaticPrompt] = &[StaticPrompt {
    name: "nodejs-dependency-audit",
    description: "Audit package.json dependencies for risk",
    content: "Audit this project's package.json dependencies for outdated or vulnerable packages.",
}];

const PYTHON_PROMPTS: &[StaticPrompt] = &[StaticPrompt {
    name: "python-type-check",
    description: "Suggest type annotations for untyped Python code",
    content: "Suggest type annotations for the untyped functions in this Python project.",
}];

fn scoped_prompts(project_type: ProjectType) -> &'static [StaticPrompt] {
    match project_type {
        ProjectType::Flutter => FLUTTER_PROMPTS,
        ProjectType::Nodejs => NODEJS_PROMPTS,
        ProjectType::Python => PYTHON_PROMPTS,
        ProjectType::Unknown => &[],
    }
}

/// A prompt loaded from the on-disk prompts directory: just a name and
/// raw text content, no generated structure.
#[derive(Debug, Clone)]
pub struct LoadedPrompt {
    pub name: String,
    pub content: String,
}

/// Read every `*.md`/`*.txt` file directly under `dir` as a loaded
/// prompt, named after its file stem. Returns an empty list (not an
/// error) if `dir` does not exist — a prompts directory is optional.
#[must_use]
pub fn load_prompts_from_dir(dir: &Path) -> Vec<LoadedPrompt> {
    let Ok(entries) = std::fs::read_dir(dir) else { return Vec::new() };
    let mut prompts = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_text = matches!(path.extension().and_then(std::ffi::OsStr::to_str), Some("md" | "txt"));
        if !path.is_file() || !is_text {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(std::ffi::OsStr::to_str) else { continue };
        if let Ok(content) = std::fs::read_to_string(&path) {
            prompts.push(LoadedPrompt { name: stem.to_owned(), content });
        }
    }
    prompts.sort_by(|a, b| a.name.cmp(&b.name));
    prompts
}

pub struct PromptLibrary {
    prompts_dir: Option<PathBuf>,
}

impl PromptLibrary {
    #[must_use]
    pub fn new(prompts_dir: Option<PathBuf>) -> Self {
        Self { prompts_dir }
    }

    /// List every prompt applicable to a workspace of the given project
    /// type: general prompts, then type-scoped prompts, then on-disk
    /// loaded prompts.
    #[must_use]
    pub fn list(&self, project_type: ProjectType) -> Vec<Value> {
        let mut out: Vec<Value> = GENERAL_PROMPTS
            .iter()
            .chain(scoped_prompts(project_type))
            .map(|p| json!({ "name": p.name, "description": p.description }))
            .collect();

        if let Some(dir) = &self.prompts_dir {
            for loaded in load_prompts_from_dir(dir) {
                out.push(json!({ "name": loaded.name, "description": "Loaded from the prompts directory" }));
            }
        }
        out
    }

    /// Whether this library (general, type-scoped, or loaded from disk)
    /// owns a prompt named `name` — used to decide whether `prompts/get`
    /// should be answered locally before falling back to the Pool.
    #[must_use]
    pub fn has(&self, name: &str, project_type: ProjectType) -> bool {
        if GENERAL_PROMPTS.iter().chain(scoped_prompts(project_type)).any(|p| p.name == name) {
            return true;
        }
        self.prompts_dir.as_deref().is_some_and(|dir| load_prompts_from_dir(dir).iter().any(|p| p.name == name))
    }

    /// Generate the content for a prompt by name. Unknown names fall
    /// through to a generic message rather than an error (spec §4.8).
    #[must_use]
    pub fn get(&self, name: &str, project_type: ProjectType) -> Value {
        if let Some(prompt) = GENERAL_PROMPTS.iter().chain(scoped_prompts(project_type)).find(|p| p.name == name) {
            return prompt_message(prompt.content);
        }
        if let Some(dir) = &self.prompts_dir {
            if let Some(loaded) = load_prompts_from_dir(dir).into_iter().find(|p| p.name == name) {
                return prompt_message(&loaded.content);
            }
        }
        prompt_message(&format!("No prompt named '{name}' is registered; showing a generic placeholder instead."))
    }
}

fn prompt_message(content: &str) -> Value {
    json!({
        "messages": [
            { "role": "user", "content": { "type": "text", "text": content } }
        ]
    })
}
