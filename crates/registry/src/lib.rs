//! Project discovery for a multi-project workspace.
//!
//! A project is any directory carrying a `.git` marker. The registry scans a
//! workspace two levels deep (group directory / project directory), classifies
//! each project by its build manifest, and resolves arbitrary paths back to
//! their owning project by climbing to the nearest `.git` ancestor.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

mod error;
mod fingerprint;

pub use error::{RegistryError, Result};
pub use fingerprint::fingerprint;

/// A discovered project in the workspace.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub language: Language,
    /// Name of the parent directory grouping this project; empty when the
    /// project is the workspace root itself.
    pub group: String,
    pub git_branch: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    Python,
    TypeScript,
    Rust,
    Java,
    Unknown,
}

/// Manifest filenames probed in priority order; the first match wins.
const LANGUAGE_MARKERS: &[(&str, Language)] = &[
    ("go.mod", Language::Go),
    ("pyproject.toml", Language::Python),
    ("setup.py", Language::Python),
    ("package.json", Language::TypeScript),
    ("Cargo.toml", Language::Rust),
    ("build.gradle", Language::Java),
    ("pom.xml", Language::Java),
];

/// Scans `root` for projects: depth-1 entries are group directories, depth-2
/// entries carrying a `.git` marker are projects. The root itself is
/// prepended when it carries `.git`. The result is sorted by (group, name)
/// so repeated scans of an unchanged tree are byte-identical.
pub fn scan(root: &Path) -> Result<Vec<Project>> {
    let abs_root = std::path::absolute(root)?;

    let mut projects = Vec::new();
    let entries = fs::read_dir(&abs_root).map_err(|source| RegistryError::ScanFailure {
        path: abs_root.clone(),
        source,
    })?;

    for group in entries.flatten() {
        let group_name = group.file_name().to_string_lossy().into_owned();
        if group_name.starts_with('.') || !group.path().is_dir() {
            continue;
        }
        let Ok(sub_entries) = fs::read_dir(group.path()) else {
            continue;
        };
        for sub in sub_entries.flatten() {
            let sub_name = sub.file_name().to_string_lossy().into_owned();
            if sub_name.starts_with('.') || !sub.path().is_dir() {
                continue;
            }
            let project_path = sub.path();
            let git_dir = project_path.join(".git");
            if !git_dir.exists() {
                continue;
            }
            projects.push(Project {
                name: sub_name,
                language: detect_language(&project_path),
                git_branch: read_git_branch(&git_dir),
                path: project_path,
                group: group_name.clone(),
            });
        }
    }

    // The workspace root can itself be a project (single-repo layouts).
    let root_git = abs_root.join(".git");
    if root_git.exists() {
        let name = abs_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        projects.insert(
            0,
            Project {
                name,
                language: detect_language(&abs_root),
                git_branch: read_git_branch(&root_git),
                path: abs_root,
                group: String::new(),
            },
        );
    }

    projects.sort_by(|a, b| a.group.cmp(&b.group).then_with(|| a.name.cmp(&b.name)));
    Ok(projects)
}

/// Walks up from `path` to the nearest directory containing `.git` and
/// returns the project rooted there.
pub fn resolve(path: &Path) -> Result<Project> {
    let abs_path = std::path::absolute(path)?;

    let mut current = abs_path.as_path();
    loop {
        let git_dir = current.join(".git");
        if git_dir.exists() {
            let name = current
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let group = current
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Ok(Project {
                name,
                language: detect_language(current),
                git_branch: read_git_branch(&git_dir),
                path: current.to_path_buf(),
                group,
            });
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return Err(RegistryError::PathNotInProject(abs_path)),
        }
    }
}

fn detect_language(project_path: &Path) -> Language {
    for (marker, language) in LANGUAGE_MARKERS {
        if project_path.join(marker).exists() {
            return *language;
        }
    }
    Language::Unknown
}

/// Reads the checked-out branch from `.git/HEAD`. Detached heads yield the
/// abbreviated hash; unreadable HEAD files yield an empty string (non-fatal).
fn read_git_branch(git_dir: &Path) -> String {
    let Ok(data) = fs::read_to_string(git_dir.join("HEAD")) else {
        return String::new();
    };
    let head = data.trim();
    if let Some(branch) = head.strip_prefix("ref: refs/heads/") {
        return branch.to_string();
    }
    if head.len() >= 8 {
        return head[..8].to_string();
    }
    head.to_string()
}
