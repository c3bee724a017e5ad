//! Tool input schemas.
//!
//! Required arguments are modeled as options so a missing or mistyped value
//! surfaces as a tool-error result rather than a transport-level failure;
//! handlers validate presence themselves.

use super::coerce;
use rmcp::schemars;
use serde::Deserialize;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ProjectRegistryRequest {
    #[schemars(description = "Workspace root directory to scan (defaults to CWD)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub root: Option<String>,

    #[schemars(description = "Force cache refresh")]
    #[serde(default, deserialize_with = "coerce::lenient_bool")]
    pub refresh: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ResolveProjectRequest {
    #[schemars(description = "File or directory path to resolve (required)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AgentMapRequest {
    #[schemars(description = "Workspace root directory to scan (defaults to CWD)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub root: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CodeStructureRequest {
    #[schemars(description = "Project path to analyze (required)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub project: Option<String>,

    #[schemars(description = "Programming language (python, typescript, go, rust)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub language: Option<String>,

    #[schemars(description = "Maximum number of files to analyze (default 100)")]
    #[serde(default, deserialize_with = "coerce::lenient_u64")]
    pub max_results: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ImpactAnalysisRequest {
    #[schemars(description = "Project path to analyze (required)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub project: Option<String>,

    #[schemars(description = "Function name to find callers of (required)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub target: Option<String>,

    #[schemars(description = "Programming language")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub language: Option<String>,

    #[schemars(description = "Maximum call graph traversal depth (default 3)")]
    #[serde(default, deserialize_with = "coerce::lenient_u64")]
    pub max_depth: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ChangeImpactRequest {
    #[schemars(description = "Project path to analyze (required)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub project: Option<String>,

    #[schemars(description = "Programming language")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub language: Option<String>,

    #[schemars(description = "Use git diff to detect changed files (default true)")]
    #[serde(default, deserialize_with = "coerce::lenient_bool")]
    pub use_git: Option<bool>,

    #[schemars(description = "Git ref to diff against (default HEAD~1)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub git_base: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CrossProjectDepsRequest {
    #[schemars(description = "Monorepo root directory to scan (required)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub root: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DetectPatternsRequest {
    #[schemars(description = "Project root directory to analyze (required)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub project: Option<String>,

    #[schemars(description = "Language (go, python, auto)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LiveChangesRequest {
    #[schemars(description = "Project root directory (must be in a git repo, required)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub project: Option<String>,

    #[schemars(description = "Git ref to diff against (default HEAD)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub baseline: Option<String>,

    #[schemars(description = "Language hint for extraction (auto-detects if not set)")]
    #[serde(default, deserialize_with = "coerce::lenient_string")]
    pub language: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mistyped_arguments_coerce_to_defaults() {
        let request: CodeStructureRequest = serde_json::from_value(json!({
            "project": 42,
            "language": ["python"],
            "max_results": "25",
        }))
        .unwrap();
        assert_eq!(request.project, None);
        assert_eq!(request.language, None);
        assert_eq!(request.max_results, None);

        let request: CodeStructureRequest = serde_json::from_value(json!({
            "project": "/w/proj",
            "max_results": 25,
        }))
        .unwrap();
        assert_eq!(request.project.as_deref(), Some("/w/proj"));
        assert_eq!(request.max_results, Some(25));
    }

    #[test]
    fn empty_object_deserializes() {
        let request: ChangeImpactRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.project.is_none());
        assert!(request.use_git.is_none());
    }
}
