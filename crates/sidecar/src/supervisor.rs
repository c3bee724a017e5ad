use crate::error::{Result, SidecarError};
use crate::{ANALYZER_MODULE, PLUGIN_ROOT_ENV};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// Responses can carry whole-project analyses; size the stdout reader for
/// multi-megabyte lines up front.
const STDOUT_BUFFER: usize = 4 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Python interpreter used to run the analyzer module.
    pub python: PathBuf,
    /// Directory containing the analyzer package; injected via `PYTHONPATH`.
    pub package_dir: PathBuf,
    /// Per-call deadline for both sidecar and one-shot invocations.
    pub timeout: Duration,
    /// Sliding window over which crashes are counted.
    pub crash_window: Duration,
    /// Crashes within the window that permanently disable the sidecar.
    pub crash_budget: usize,
    /// How long shutdown waits for a clean exit before killing.
    pub shutdown_grace: Duration,
}

impl SupervisorConfig {
    pub fn new(package_dir: PathBuf) -> Self {
        Self {
            python: PathBuf::from("python3"),
            package_dir,
            timeout: Duration::from_secs(60),
            crash_window: Duration::from_secs(10),
            crash_budget: 3,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Resolves the analyzer package directory: the plugin root env var when set,
/// otherwise `<grandparent of the binary>/python`.
pub fn default_package_dir() -> PathBuf {
    if let Ok(root) = std::env::var(PLUGIN_ROOT_ENV) {
        let root = root.trim();
        if !root.is_empty() {
            return PathBuf::from(root).join("python");
        }
    }
    match std::env::current_exe() {
        Ok(exe) => exe
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.join("python"))
            .unwrap_or_else(|| PathBuf::from("python")),
        Err(_) => PathBuf::from("python"),
    }
}

#[derive(Serialize)]
struct SidecarRequest<'a> {
    id: i64,
    command: &'a str,
    project: &'a str,
    args: &'a Map<String, Value>,
}

#[derive(Deserialize)]
struct SidecarResponse {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    result: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<AnalyzerFault>,
}

/// Error envelope shared by sidecar responses and one-shot stderr. The
/// one-shot path spells the type field `error`.
#[derive(Deserialize)]
struct AnalyzerFault {
    #[serde(rename = "type", alias = "error")]
    kind: String,
    message: String,
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

struct Inner {
    sidecar: Option<Sidecar>,
    crash_times: Vec<Instant>,
}

/// Owns the analyzer subprocess and serializes all requests onto it.
///
/// The inner mutex is held across the full write-then-read exchange, so at
/// most one request is ever in flight and responses pair with requests in
/// submission order. Callers that stop waiting (dropped futures, outer
/// timeouts) leave the analyzer working; the next exchange then either reads
/// the stale response and treats the ID mismatch as a crash, or finds the
/// analyzer free again.
pub struct Supervisor {
    config: SupervisorConfig,
    next_id: AtomicI64,
    /// Once set the sidecar is never revived for the life of this process.
    fallback: AtomicBool,
    inner: Mutex<Inner>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            next_id: AtomicI64::new(0),
            fallback: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                sidecar: None,
                crash_times: Vec::new(),
            }),
        }
    }

    /// True once the crash budget has been exhausted and every call runs as a
    /// one-shot subprocess.
    pub fn in_fallback(&self) -> bool {
        self.fallback.load(Ordering::Acquire)
    }

    /// Executes one analyzer command and returns its JSON result.
    pub async fn run(
        &self,
        command: &str,
        project: &str,
        args: Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        if self.in_fallback() {
            return self.run_oneshot(command, project, &args).await;
        }

        let mut inner = self.inner.lock().await;
        // A concurrent caller may have tripped the budget while we queued.
        if self.in_fallback() {
            drop(inner);
            return self.run_oneshot(command, project, &args).await;
        }
        self.run_sidecar(&mut inner, command, project, &args).await
    }

    async fn run_sidecar(
        &self,
        inner: &mut Inner,
        command: &str,
        project: &str,
        args: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let mut retried = false;
        loop {
            // Startup failures surface immediately and do not count as
            // crashes.
            let mut sidecar = match inner.sidecar.take() {
                Some(s) => s,
                None => self.spawn_sidecar().await?,
            };

            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            match self.exchange(&mut sidecar, id, command, project, args).await {
                Ok(result) => {
                    inner.sidecar = Some(sidecar);
                    return Ok(result);
                }
                Err(Exchange::Encode(e)) => {
                    // Local failure; the sidecar never saw the request.
                    inner.sidecar = Some(sidecar);
                    return Err(SidecarError::Encode(e));
                }
                Err(Exchange::Analyzer { kind, message }) => {
                    inner.sidecar = Some(sidecar);
                    return Err(SidecarError::Analyzer {
                        command: command.to_string(),
                        kind,
                        message,
                    });
                }
                Err(Exchange::Timeout) => {
                    // A slow analysis is a failure of this call, not of the
                    // analyzer; leave the sidecar running.
                    inner.sidecar = Some(sidecar);
                    return Err(SidecarError::Timeout {
                        command: command.to_string(),
                        timeout: self.config.timeout,
                    });
                }
                Err(Exchange::Eof(detail)) => {
                    teardown(sidecar).await;
                    self.record_crash(inner, &detail);
                    if !retried && !self.in_fallback() {
                        retried = true; // one transparent respawn-and-retry
                        continue;
                    }
                    return Err(SidecarError::Crash {
                        command: command.to_string(),
                        detail,
                    });
                }
                Err(Exchange::Protocol(detail)) => {
                    // Indeterminate stream state: no retry.
                    teardown(sidecar).await;
                    self.record_crash(inner, &detail);
                    return Err(SidecarError::Protocol {
                        command: command.to_string(),
                        detail,
                    });
                }
            }
        }
    }

    async fn exchange(
        &self,
        sidecar: &mut Sidecar,
        id: i64,
        command: &str,
        project: &str,
        args: &Map<String, Value>,
    ) -> std::result::Result<Map<String, Value>, Exchange> {
        let request = SidecarRequest {
            id,
            command,
            project,
            args,
        };
        let mut line = serde_json::to_string(&request).map_err(Exchange::Encode)?;
        line.push('\n');

        if let Err(e) = sidecar.stdin.write_all(line.as_bytes()).await {
            return Err(Exchange::Eof(format!("write request: {e}")));
        }
        if let Err(e) = sidecar.stdin.flush().await {
            return Err(Exchange::Eof(format!("flush request: {e}")));
        }

        let read = tokio::time::timeout(self.config.timeout, sidecar.stdout.next_line()).await;
        let line = match read {
            Err(_) => return Err(Exchange::Timeout),
            Ok(Err(e)) => return Err(Exchange::Eof(format!("read response: {e}"))),
            Ok(Ok(None)) => return Err(Exchange::Eof("EOF on stdout".to_string())),
            Ok(Ok(Some(line))) => line,
        };

        let response: SidecarResponse = serde_json::from_str(&line)
            .map_err(|e| Exchange::Protocol(format!("unparseable response: {e}")))?;
        if response.id != Some(id) {
            return Err(Exchange::Protocol(format!(
                "response id {:?} does not match request id {id}",
                response.id
            )));
        }
        if let Some(fault) = response.error {
            return Err(Exchange::Analyzer {
                kind: fault.kind,
                message: fault.message,
            });
        }
        Ok(response.result.unwrap_or_default())
    }

    async fn spawn_sidecar(&self) -> Result<Sidecar> {
        let mut child = Command::new(&self.config.python)
            .arg("-u")
            .arg("-m")
            .arg(ANALYZER_MODULE)
            .arg("--sidecar")
            .env("PYTHONPATH", &self.config.package_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SidecarError::Spawn)?;

        let stdin = child.stdin.take().ok_or(SidecarError::NotReady)?;
        let stdout = child.stdout.take().ok_or(SidecarError::NotReady)?;
        if let Some(stderr) = child.stderr.take() {
            // Analyzer diagnostics go to our log, never to MCP stdout.
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("analyzer stderr: {line}");
                }
            });
        }

        let mut lines = BufReader::with_capacity(STDOUT_BUFFER, stdout).lines();
        let ready = tokio::time::timeout(self.config.timeout, lines.next_line()).await;
        let ok = matches!(&ready, Ok(Ok(Some(line))) if is_ready_line(line));
        if !ok {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(SidecarError::NotReady);
        }

        log::debug!("analyzer sidecar ready (pid {:?})", child.id());
        Ok(Sidecar {
            child,
            stdin,
            stdout: lines,
        })
    }

    /// Records a crash in the sliding window. Exceeding the budget flips the
    /// process-lifetime fallback flag.
    fn record_crash(&self, inner: &mut Inner, detail: &str) {
        log::warn!("analyzer sidecar crashed: {detail}");

        let now = Instant::now();
        inner.crash_times.push(now);
        let window = self.config.crash_window;
        inner
            .crash_times
            .retain(|t| now.duration_since(*t) <= window);
        if inner.crash_times.len() >= self.config.crash_budget {
            self.fallback.store(true, Ordering::Release);
            log::warn!(
                "analyzer crashed {} times within {:?}; switching to one-shot fallback",
                inner.crash_times.len(),
                window
            );
        }
    }

    /// One-shot mode: a fresh subprocess per call carrying the request on its
    /// command line.
    async fn run_oneshot(
        &self,
        command: &str,
        project: &str,
        args: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let args_json = serde_json::to_string(args)?;

        let mut cmd = Command::new(&self.config.python);
        cmd.arg("-u")
            .arg("-m")
            .arg(ANALYZER_MODULE)
            .arg("--command")
            .arg(command)
            .arg("--project")
            .arg(project)
            .arg("--args")
            .arg(args_json)
            .env("PYTHONPATH", &self.config.package_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, async {
            cmd.output().await.map_err(SidecarError::Spawn)
        })
        .await
        .map_err(|_| SidecarError::Timeout {
            command: command.to_string(),
            timeout: self.config.timeout,
        })??;

        if !output.status.success() {
            if let Ok(fault) = serde_json::from_slice::<AnalyzerFault>(&output.stderr) {
                return Err(SidecarError::Analyzer {
                    command: command.to_string(),
                    kind: fault.kind,
                    message: fault.message,
                });
            }
            return Err(SidecarError::OneShot {
                command: command.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| SidecarError::OneShot {
            command: command.to_string(),
            detail: format!("parse analyzer output: {e}"),
        })
    }

    /// Shuts the sidecar down: close stdin, wait briefly for a clean exit,
    /// then kill. Safe to call repeatedly.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        let Some(mut sidecar) = inner.sidecar.take() else {
            return;
        };
        // Closing stdin lets the analyzer fall out of its read loop.
        drop(sidecar.stdin);
        if tokio::time::timeout(self.config.shutdown_grace, sidecar.child.wait())
            .await
            .is_err()
        {
            let _ = sidecar.child.start_kill();
            let _ = sidecar.child.wait().await;
        }
    }
}

enum Exchange {
    Encode(serde_json::Error),
    Timeout,
    Eof(String),
    Protocol(String),
    Analyzer { kind: String, message: String },
}

fn is_ready_line(line: &str) -> bool {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("status").and_then(Value::as_str).map(String::from))
        .is_some_and(|status| status == "ready")
}

async fn teardown(mut sidecar: Sidecar) {
    drop(sidecar.stdin);
    let _ = sidecar.child.start_kill();
    let _ = sidecar.child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_line_requires_status_ready() {
        assert!(is_ready_line(r#"{"status":"ready"}"#));
        assert!(is_ready_line(r#"{"status":"ready","version":"1.0"}"#));
        assert!(!is_ready_line(r#"{"status":"starting"}"#));
        assert!(!is_ready_line("ready"));
        assert!(!is_ready_line(""));
    }

    #[test]
    fn request_serializes_as_single_object() {
        let args = Map::new();
        let request = SidecarRequest {
            id: 7,
            command: "structure",
            project: "/w/proj",
            args: &args,
        };
        let line = serde_json::to_string(&request).unwrap();
        assert_eq!(
            line,
            r#"{"id":7,"command":"structure","project":"/w/proj","args":{}}"#
        );
    }

    #[test]
    fn fault_accepts_oneshot_spelling() {
        let fault: AnalyzerFault =
            serde_json::from_str(r#"{"error":"ImportError","message":"no module"}"#).unwrap();
        assert_eq!(fault.kind, "ImportError");
        let fault: AnalyzerFault =
            serde_json::from_str(r#"{"type":"ValueError","message":"bad"}"#).unwrap();
        assert_eq!(fault.kind, "ValueError");
    }
}
