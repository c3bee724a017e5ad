//! Tool inventory for `--print-tools`.

use serde_json::json;

/// (name, one-line summary) for every exposed tool.
pub const TOOLS: &[(&str, &str)] = &[
    (
        "project_registry",
        "Scan the workspace and list all projects with language, group, and git branch",
    ),
    (
        "resolve_project",
        "Find which project a file path belongs to",
    ),
    (
        "agent_map",
        "Projects joined with active agents and file reservations",
    ),
    (
        "code_structure",
        "List functions, classes, and imports of a project",
    ),
    (
        "impact_analysis",
        "Reverse call graph for a function",
    ),
    (
        "change_impact",
        "Tests to run based on changed files",
    ),
    (
        "cross_project_deps",
        "Cross-project dependencies in a monorepo",
    ),
    (
        "detect_patterns",
        "Detect architectural patterns in a project",
    ),
    (
        "live_changes",
        "Changes since a git baseline with affected symbols",
    ),
];

pub fn tool_inventory_json(version: &str) -> String {
    let tools: Vec<_> = TOOLS
        .iter()
        .map(|(name, summary)| json!({ "name": name, "summary": summary }))
        .collect();
    json!({
        "server": "codemap-mcp",
        "version": version,
        "tool_count": tools.len(),
        "tools": tools,
    })
    .to_string()
}
