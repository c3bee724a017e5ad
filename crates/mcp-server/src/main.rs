//! Codemap MCP Server
//!
//! Answers structural questions about a multi-project workspace via MCP:
//!
//! ## Tools
//!
//! - `project_registry` - Scan the workspace and list projects
//! - `resolve_project` - Map a path to its owning project
//! - `agent_map` - Projects joined with active agents and file reservations
//! - `code_structure` - Functions, classes, and imports of a project
//! - `impact_analysis` - Reverse call graph for a function
//! - `change_impact` - Tests to run for changed files
//! - `cross_project_deps` - Cross-project dependencies in a monorepo
//! - `detect_patterns` - Architectural pattern detection
//! - `live_changes` - Changes since a git baseline with affected symbols
//!
//! Analysis tools delegate to a supervised analyzer subprocess; registry
//! tools are served natively.

use anyhow::Result;
use codemap_overlay::OverlayClient;
use codemap_sidecar::{default_package_dir, Supervisor, SupervisorConfig, PYTHON_ENV};
use rmcp::{transport::stdio, ServiceExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod tools;

use tools::{catalog, CodemapService};

const LOG_ENV: &str = "CODEMAP_MCP_LOG";
const TIMEOUT_ENV: &str = "CODEMAP_SIDECAR_TIMEOUT_SECS";

fn print_help() {
    println!("Codemap MCP server");
    println!();
    println!("Usage: codemap-mcp [--print-tools|--version|--help]");
    println!();
    println!("Flags:");
    println!("  --print-tools  Print tool inventory as JSON and exit");
    println!("  --version      Print version and exit");
    println!("  --help         Print this help and exit");
    println!();
    println!("Env:");
    println!("  CODEMAP_OVERLAY_URL           Agent overlay service base URL (unset disables the overlay)");
    println!("  CODEMAP_PLUGIN_ROOT           Plugin root; the analyzer package lives in <root>/python");
    println!("  CODEMAP_PYTHON                Analyzer interpreter (default: python3)");
    println!("  CODEMAP_SIDECAR_TIMEOUT_SECS  Per-call analyzer deadline (default: 60)");
    println!("  CODEMAP_MCP_LOG=1             Enable stderr logging");
}

/// Returns an exit code when the invocation is a one-shot CLI action.
fn handle_cli_args() -> Option<i32> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        return None;
    }

    match args[0].as_str() {
        // Compatibility: some MCP clients unconditionally pass `--stdio`.
        "--stdio" | "stdio" => None,
        "--print-tools" => {
            println!("{}", catalog::tool_inventory_json(env!("CARGO_PKG_VERSION")));
            Some(0)
        }
        "--version" | "-V" => {
            println!("codemap-mcp {}", env!("CARGO_PKG_VERSION"));
            Some(0)
        }
        "--help" | "-h" => {
            print_help();
            Some(0)
        }
        _ => {
            // Launchers may append transport selectors or wrapper flags;
            // starting the server beats failing the whole toolchain.
            if logging_enabled() {
                log::warn!("Ignoring unknown arguments: {}", args.join(" "));
            }
            None
        }
    }
}

fn logging_enabled() -> bool {
    // Any non-MCP bytes on stdout break clients, and some clients merge
    // stderr into stdout. Stay silent unless explicitly enabled.
    std::env::var(LOG_ENV)
        .ok()
        .map(|v| {
            let v = v.trim();
            !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false"))
        })
        .unwrap_or(false)
}

fn supervisor_config_from_env() -> SupervisorConfig {
    let mut config = SupervisorConfig::new(default_package_dir());
    if let Ok(python) = std::env::var(PYTHON_ENV) {
        let python = python.trim();
        if !python.is_empty() {
            config.python = PathBuf::from(python);
        }
    }
    if let Some(secs) = std::env::var(TIMEOUT_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
    {
        config.timeout = Duration::from_secs(secs);
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Some(code) = handle_cli_args() {
        std::process::exit(code);
    }

    if logging_enabled() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .target(env_logger::Target::Stderr)
            .init();
        log::info!("Starting codemap MCP server");
    }

    let supervisor = Arc::new(Supervisor::new(supervisor_config_from_env()));
    let overlay = OverlayClient::from_env();
    let service = CodemapService::new(Arc::clone(&supervisor), overlay);

    let server = service.serve(stdio()).await?;
    server.waiting().await?;

    supervisor.close().await;
    if logging_enabled() {
        log::info!("Codemap MCP server stopped");
    }
    Ok(())
}
