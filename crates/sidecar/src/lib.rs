//! Supervisor for the out-of-process code analyzer.
//!
//! Analysis work (call graphs, pattern detection, diff annotation) runs in a
//! long-lived Python subprocess speaking newline-delimited JSON over stdio.
//! This crate owns that subprocess: it spawns and respawns it, serializes
//! concurrent callers onto its single request channel, correlates responses
//! by ID, and degrades to one-shot-per-call invocation when the sidecar keeps
//! crashing.

mod error;
mod supervisor;

pub use error::{Result, SidecarError};
pub use supervisor::{default_package_dir, Supervisor, SupervisorConfig};

/// Python module implementing the analyzer.
pub const ANALYZER_MODULE: &str = "codemap_analyzer";

/// Names the plugin root; the analyzer package lives in `{root}/python`.
pub const PLUGIN_ROOT_ENV: &str = "CODEMAP_PLUGIN_ROOT";

/// Overrides the Python interpreter used to run the analyzer.
pub const PYTHON_ENV: &str = "CODEMAP_PYTHON";
