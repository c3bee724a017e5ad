use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SidecarError>;

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("failed to spawn analyzer: {0}")]
    Spawn(#[source] std::io::Error),

    /// The analyzer started but never produced the ready line. Not counted
    /// against the crash budget.
    #[error("sidecar failed to send ready signal")]
    NotReady,

    /// No response within the per-call deadline. The sidecar stays up.
    #[error("analyzer {command}: timeout after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// The sidecar died mid-exchange (EOF or broken pipe).
    #[error("analyzer {command}: sidecar crashed ({detail})")]
    Crash { command: String, detail: String },

    /// The sidecar answered with something other than the outstanding
    /// request's response. The instance is in an indeterminate state and is
    /// torn down without retry.
    #[error("analyzer {command}: protocol violation: {detail}")]
    Protocol { command: String, detail: String },

    /// A structured error reported by the analyzer itself.
    #[error("analyzer {command}: {kind}: {message}")]
    Analyzer {
        command: String,
        kind: String,
        message: String,
    },

    /// One-shot fallback invocation failed without a structured error.
    #[error("analyzer {command}: {detail}")]
    OneShot { command: String, detail: String },

    #[error("analyzer request encoding: {0}")]
    Encode(#[from] serde_json::Error),
}
