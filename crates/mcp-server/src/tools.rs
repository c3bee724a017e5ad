//! MCP tools for codemap.
//!
//! Native tools (registry scan, path resolve, agent overlay) are served
//! directly; analysis tools are dispatched to the supervised analyzer.

use codemap_cache::Cache;
use codemap_overlay::OverlayClient;
use codemap_registry as registry;
use codemap_registry::Project;
use codemap_sidecar::Supervisor;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::tool::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod catalog;
mod coerce;
mod overlay_join;
mod schemas;

use overlay_join::{join_agents, AgentMapResult};
use schemas::{
    AgentMapRequest, ChangeImpactRequest, CodeStructureRequest, CrossProjectDepsRequest,
    DetectPatternsRequest, ImpactAnalysisRequest, LiveChangesRequest, ProjectRegistryRequest,
    ResolveProjectRequest,
};

/// Registry scans and structure results stay valid for a few minutes at most;
/// fingerprint validation catches edits sooner.
const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_SIZE: usize = 10;

/// Codemap MCP service.
#[derive(Clone)]
pub struct CodemapService {
    supervisor: Arc<Supervisor>,
    overlay: OverlayClient,
    /// Workspace scans keyed by root path; TTL-only (empty fingerprint).
    registry_cache: Arc<Cache<Vec<Project>>>,
    /// Structure results keyed by project + args, validated by the project's
    /// mtime fingerprint.
    structure_cache: Arc<Cache<Map<String, Value>>>,
    tool_router: ToolRouter<Self>,
}

impl CodemapService {
    pub fn new(supervisor: Arc<Supervisor>, overlay: OverlayClient) -> Self {
        Self {
            supervisor,
            overlay,
            registry_cache: Arc::new(Cache::new(CACHE_TTL, CACHE_SIZE)),
            structure_cache: Arc::new(Cache::new(CACHE_TTL, CACHE_SIZE)),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_handler]
impl ServerHandler for CodemapService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Codemap answers structural questions about a multi-project workspace. \
                 Use 'project_registry' to list projects, 'resolve_project' to map a path \
                 to its project, 'code_structure' and 'impact_analysis' for call-level \
                 analysis, and 'agent_map' to see which agents hold which files."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    match serde_json::to_string(value) {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
            "marshal: {e}"
        ))])),
    }
}

fn tool_error(message: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(message.into())]))
}

/// Resolves an optional root argument, defaulting to the current directory.
fn root_or_cwd(root: Option<String>) -> Result<PathBuf, String> {
    match root {
        Some(root) if !root.trim().is_empty() => Ok(PathBuf::from(root)),
        _ => std::env::current_dir().map_err(|e| format!("getwd: {e}")),
    }
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl CodemapService {
    /// List all projects in the workspace.
    #[tool(
        description = "Scan the workspace and list all projects with their language, group, and git branch."
    )]
    pub async fn project_registry(
        &self,
        Parameters(request): Parameters<ProjectRegistryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let root = match root_or_cwd(request.root) {
            Ok(root) => root,
            Err(e) => return tool_error(e),
        };
        let refresh = request.refresh.unwrap_or(false);

        let key = root.to_string_lossy().into_owned();
        if !refresh {
            if let Some(projects) = self.registry_cache.get(&key, "") {
                return json_result(&projects);
            }
        }

        let projects = match registry::scan(&root) {
            Ok(projects) => projects,
            Err(e) => return tool_error(format!("scan: {e}")),
        };
        self.registry_cache.put(&key, "", projects.clone());
        json_result(&projects)
    }

    /// Map a path to its owning project.
    #[tool(
        description = "Find which project a file path belongs to by walking up to the nearest .git directory."
    )]
    pub async fn resolve_project(
        &self,
        Parameters(request): Parameters<ResolveProjectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(path) = request.path.filter(|p| !p.trim().is_empty()) else {
            return tool_error("path is required");
        };

        match registry::resolve(Path::new(&path)) {
            Ok(project) => json_result(&project),
            Err(e) => tool_error(e.to_string()),
        }
    }

    /// Projects joined with active agents and their reservations.
    #[tool(
        description = "Show which agents are working on which projects and files. Combines the project registry, the agent list, and file reservations into one overlay."
    )]
    pub async fn agent_map(
        &self,
        Parameters(request): Parameters<AgentMapRequest>,
    ) -> Result<CallToolResult, McpError> {
        let root = match root_or_cwd(request.root) {
            Ok(root) => root,
            Err(e) => return tool_error(e),
        };

        let projects = match registry::scan(&root) {
            Ok(projects) => projects,
            Err(e) => return tool_error(format!("scan: {e}")),
        };

        let mut result = AgentMapResult {
            agents: Vec::new(),
            agents_available: self.overlay.available(),
            agents_error: None,
            project_count: projects.len(),
        };

        if !self.overlay.available() {
            result.agents_error = Some(format!(
                "agent overlay not configured ({} not set)",
                codemap_overlay::OVERLAY_URL_ENV
            ));
            return json_result(&result);
        }

        let agents = match self.overlay.list_agents().await {
            Ok(agents) => agents,
            Err(e) => {
                result.agents_error = Some(format!("agent overlay unreachable: {e}"));
                return json_result(&result);
            }
        };

        // A reservation failure still yields the agent list, just without
        // reservation data.
        let reservations = match self.overlay.list_reservations("").await {
            Ok(reservations) => reservations,
            Err(e) => {
                result.agents_error = Some(format!("reservations unavailable: {e}"));
                Vec::new()
            }
        };

        result.agents = join_agents(&projects, agents, &reservations);
        json_result(&result)
    }

    /// Per-file functions, classes, and imports.
    #[tool(
        description = "Analyze code structure of a project - list all functions, classes, and imports."
    )]
    pub async fn code_structure(
        &self,
        Parameters(request): Parameters<CodeStructureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(project) = request.project.filter(|p| !p.trim().is_empty()) else {
            return tool_error("project is required");
        };
        let language = request.language.unwrap_or_else(|| "python".to_string());
        let max_results = request.max_results.unwrap_or(100);

        let fingerprint = registry::fingerprint(Path::new(&project)).ok();
        let key = format!("{project}|{language}|{max_results}");
        if let Some(fp) = &fingerprint {
            if let Some(cached) = self.structure_cache.get(&key, fp) {
                return json_result(&cached);
            }
        }

        let mut args = Map::new();
        args.insert("language".to_string(), json!(language));
        args.insert("max_results".to_string(), json!(max_results));

        match self.supervisor.run("structure", &project, args).await {
            Ok(result) => {
                if let Some(fp) = &fingerprint {
                    self.structure_cache.put(&key, fp, result.clone());
                }
                json_result(&result)
            }
            Err(e) => tool_error(e.to_string()),
        }
    }

    /// Reverse call graph for a function.
    #[tool(
        description = "Find all callers of a function (reverse call graph) - useful for understanding what code is affected by changes."
    )]
    pub async fn impact_analysis(
        &self,
        Parameters(request): Parameters<ImpactAnalysisRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(project) = request.project.filter(|p| !p.trim().is_empty()) else {
            return tool_error("project is required");
        };
        let Some(target) = request.target.filter(|t| !t.trim().is_empty()) else {
            return tool_error("target is required");
        };

        let mut args = Map::new();
        args.insert("target".to_string(), json!(target));
        args.insert(
            "language".to_string(),
            json!(request.language.unwrap_or_else(|| "python".to_string())),
        );
        args.insert(
            "max_depth".to_string(),
            json!(request.max_depth.unwrap_or(3)),
        );

        match self.supervisor.run("impact", &project, args).await {
            Ok(result) => json_result(&result),
            Err(e) => tool_error(e.to_string()),
        }
    }

    /// Tests to run for changed files.
    #[tool(
        description = "Find which tests to run based on changed files - uses call graph analysis and import tracking."
    )]
    pub async fn change_impact(
        &self,
        Parameters(request): Parameters<ChangeImpactRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(project) = request.project.filter(|p| !p.trim().is_empty()) else {
            return tool_error("project is required");
        };

        let mut args = Map::new();
        args.insert(
            "language".to_string(),
            json!(request.language.unwrap_or_else(|| "python".to_string())),
        );
        args.insert("use_git".to_string(), json!(request.use_git.unwrap_or(true)));
        args.insert(
            "git_base".to_string(),
            json!(request.git_base.unwrap_or_else(|| "HEAD~1".to_string())),
        );

        match self.supervisor.run("change_impact", &project, args).await {
            Ok(result) => json_result(&result),
            Err(e) => tool_error(e.to_string()),
        }
    }

    /// Cross-project dependency map of a monorepo.
    #[tool(
        description = "Map cross-project dependencies in a monorepo - module deps, path deps, plugin references."
    )]
    pub async fn cross_project_deps(
        &self,
        Parameters(request): Parameters<CrossProjectDepsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(root) = request.root.filter(|r| !r.trim().is_empty()) else {
            return tool_error("root is required");
        };

        // The monorepo root rides the project slot of the analyzer protocol.
        match self
            .supervisor
            .run("cross_project_deps", &root, Map::new())
            .await
        {
            Ok(result) => json_result(&result),
            Err(e) => tool_error(e.to_string()),
        }
    }

    /// Architectural pattern detection.
    #[tool(
        description = "Detect architectural patterns: HTTP handlers, MCP tools, middleware, interfaces, CLI commands, plugin structures."
    )]
    pub async fn detect_patterns(
        &self,
        Parameters(request): Parameters<DetectPatternsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(project) = request.project.filter(|p| !p.trim().is_empty()) else {
            return tool_error("project is required");
        };

        let mut args = Map::new();
        args.insert(
            "language".to_string(),
            json!(request.language.unwrap_or_else(|| "auto".to_string())),
        );

        match self.supervisor.run("detect_patterns", &project, args).await {
            Ok(result) => json_result(&result),
            Err(e) => tool_error(e.to_string()),
        }
    }

    /// Changes since a git baseline, annotated with affected symbols.
    #[tool(
        description = "Detect changes since a git baseline and annotate them with affected symbols (functions, classes)."
    )]
    pub async fn live_changes(
        &self,
        Parameters(request): Parameters<LiveChangesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(project) = request.project.filter(|p| !p.trim().is_empty()) else {
            return tool_error("project is required");
        };

        let mut args = Map::new();
        args.insert(
            "baseline".to_string(),
            json!(request.baseline.unwrap_or_else(|| "HEAD".to_string())),
        );
        args.insert(
            "language".to_string(),
            json!(request.language.unwrap_or_else(|| "auto".to_string())),
        );

        match self.supervisor.run("live_changes", &project, args).await {
            Ok(result) => json_result(&result),
            Err(e) => tool_error(e.to_string()),
        }
    }
}
