//! Client for the agent overlay service.
//!
//! The overlay service is optional infrastructure: when no base URL is
//! configured the client is "unavailable" and every query returns an empty
//! result without error, so the rest of the server degrades gracefully.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const OVERLAY_URL_ENV: &str = "CODEMAP_OVERLAY_URL";

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// An agent registered with the overlay service.
#[derive(Debug, Clone, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
    pub project: String,
    pub status: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
}

/// A file reservation held by an agent.
#[derive(Debug, Clone, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub agent_id: String,
    pub pattern: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub project: String,
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context}: HTTP {status}")]
    Status { context: &'static str, status: u16 },
}

#[derive(Clone)]
pub struct OverlayClient {
    base_url: Option<String>,
    http: reqwest::Client,
}

impl OverlayClient {
    /// Creates a client for the given base URL. `None` yields an unavailable
    /// client whose queries return empty results.
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url.map(|u| u.trim_end_matches('/').to_string());
        Self {
            base_url: base_url.filter(|u| !u.is_empty()),
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Reads the base URL from `CODEMAP_OVERLAY_URL`.
    pub fn from_env() -> Self {
        Self::new(std::env::var(OVERLAY_URL_ENV).ok())
    }

    pub fn available(&self) -> bool {
        self.base_url.is_some()
    }

    /// Lists all active agents. An unavailable client returns an empty set
    /// rather than an error.
    pub async fn list_agents(&self) -> Result<Vec<Agent>, OverlayError> {
        let Some(base) = &self.base_url else {
            return Ok(Vec::new());
        };

        let response = self
            .http
            .get(format!("{base}/api/agents"))
            .send()
            .await
            .map_err(|source| OverlayError::Http {
                context: "list agents",
                source,
            })?;

        // Strictly 200: anything else, 2xx included, is an error.
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(OverlayError::Status {
                context: "list agents",
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|source| OverlayError::Http {
                context: "decode agents",
                source,
            })
    }

    /// Lists reservations, optionally filtered by project name.
    pub async fn list_reservations(
        &self,
        project: &str,
    ) -> Result<Vec<Reservation>, OverlayError> {
        let Some(base) = &self.base_url else {
            return Ok(Vec::new());
        };

        let mut request = self.http.get(format!("{base}/api/reservations"));
        if !project.is_empty() {
            request = request.query(&[("project", project)]);
        }

        let response = request.send().await.map_err(|source| OverlayError::Http {
            context: "list reservations",
            source,
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(OverlayError::Status {
                context: "list reservations",
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|source| OverlayError::Http {
                context: "decode reservations",
                source,
            })
    }
}
