//! Joining registry projects with the agent overlay.

use codemap_overlay::{Agent, Reservation};
use codemap_registry::Project;
use serde::Serialize;
use std::collections::HashMap;

/// One agent with its resolved project and active reservations.
#[derive(Debug, Serialize)]
pub struct AgentOverlay {
    pub agent_id: String,
    pub name: String,
    pub status: String,
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reservations: Vec<String>,
}

/// Top-level response of the `agent_map` tool. Overlay failures are reported
/// inline so the registry half of the result is always usable.
#[derive(Debug, Serialize)]
pub struct AgentMapResult {
    pub agents: Vec<AgentOverlay>,
    pub agents_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents_error: Option<String>,
    pub project_count: usize,
}

/// Associates each agent with a project: exact name match first, then
/// substring containment in either direction (agent project in path, or
/// project name in agent project). Active reservations attach by agent ID.
pub fn join_agents(
    projects: &[Project],
    agents: Vec<Agent>,
    reservations: &[Reservation],
) -> Vec<AgentOverlay> {
    let by_name: HashMap<&str, &Project> = projects.iter().map(|p| (p.name.as_str(), p)).collect();

    let mut patterns_by_agent: HashMap<&str, Vec<String>> = HashMap::new();
    for reservation in reservations {
        if reservation.is_active {
            patterns_by_agent
                .entry(reservation.agent_id.as_str())
                .or_default()
                .push(reservation.pattern.clone());
        }
    }

    agents
        .into_iter()
        .map(|agent| {
            let project_path = by_name
                .get(agent.project.as_str())
                .map(|p| p.path.to_string_lossy().into_owned())
                .or_else(|| {
                    projects
                        .iter()
                        .find(|p| {
                            let path = p.path.to_string_lossy();
                            path.contains(&agent.project) || agent.project.contains(&p.name)
                        })
                        .map(|p| p.path.to_string_lossy().into_owned())
                });
            let reservations = patterns_by_agent
                .remove(agent.agent_id.as_str())
                .unwrap_or_default();
            AgentOverlay {
                agent_id: agent.agent_id,
                name: agent.name,
                status: agent.status,
                project: agent.project,
                project_path,
                session_id: agent.session_id,
                last_seen: agent.last_seen,
                reservations,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemap_registry::Language;
    use std::path::PathBuf;

    fn project(name: &str, path: &str) -> Project {
        Project {
            name: name.to_string(),
            path: PathBuf::from(path),
            language: Language::Unknown,
            group: String::new(),
            git_branch: String::new(),
        }
    }

    fn agent(id: &str, project: &str) -> Agent {
        Agent {
            agent_id: id.to_string(),
            name: format!("agent-{id}"),
            project: project.to_string(),
            status: "active".to_string(),
            session_id: None,
            last_seen: None,
        }
    }

    fn reservation(agent_id: &str, pattern: &str, is_active: bool) -> Reservation {
        Reservation {
            id: format!("r-{agent_id}"),
            agent_id: agent_id.to_string(),
            pattern: pattern.to_string(),
            reason: String::new(),
            project: String::new(),
            is_active,
            created_at: None,
        }
    }

    #[test]
    fn exact_name_match_wins() {
        let projects = vec![project("proj-a", "/w/g1/proj-a")];
        let overlays = join_agents(&projects, vec![agent("a1", "proj-a")], &[]);
        assert_eq!(overlays[0].project_path.as_deref(), Some("/w/g1/proj-a"));
    }

    #[test]
    fn substring_fallback_matches_in_either_direction() {
        let projects = vec![project("proj-a", "/w/g1/proj-a")];

        // Agent project is a substring of the project path.
        let overlays = join_agents(&projects, vec![agent("a1", "g1/proj-a")], &[]);
        assert_eq!(overlays[0].project_path.as_deref(), Some("/w/g1/proj-a"));

        // Project name is a substring of the agent's project field.
        let overlays = join_agents(&projects, vec![agent("a2", "workspace proj-a clone")], &[]);
        assert_eq!(overlays[0].project_path.as_deref(), Some("/w/g1/proj-a"));
    }

    #[test]
    fn unmatched_agent_has_no_project_path() {
        let projects = vec![project("proj-a", "/w/g1/proj-a")];
        let overlays = join_agents(&projects, vec![agent("a1", "zzz")], &[]);
        assert!(overlays[0].project_path.is_none());
    }

    #[test]
    fn only_active_reservations_attach() {
        let projects = vec![project("proj-a", "/w/g1/proj-a")];
        let reservations = vec![
            reservation("a1", "src/**", true),
            reservation("a1", "docs/**", false),
            reservation("other", "all/**", true),
        ];
        let overlays = join_agents(&projects, vec![agent("a1", "proj-a")], &reservations);
        assert_eq!(overlays[0].reservations, vec!["src/**".to_string()]);
    }

    #[test]
    fn result_serializes_inline_error_fields() {
        let result = AgentMapResult {
            agents: Vec::new(),
            agents_available: false,
            agents_error: Some("not configured".to_string()),
            project_count: 2,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["agents_available"], false);
        assert_eq!(value["agents_error"], "not configured");
        assert_eq!(value["project_count"], 2);
    }
}
