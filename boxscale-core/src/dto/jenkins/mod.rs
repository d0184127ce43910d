//! CI master DTOs
//!
//! JSON shapes returned by the CI master's `api/json` endpoints. Every field
//! defaults when absent so that partial responses still decode.

use serde::{Deserialize, Serialize};

use crate::domain::node::NodeRegistration;

/// Monitor whose presence means the node's agent has reported in
pub const AGENT_MONITOR_FIELD: &str = "hudson.node_monitors.ArchitectureMonitor";

/// Build queue (`GET /queue/api/json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JenkinsQueue {
    pub items: Vec<QueueItem>,
}

/// A single pending queue entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueItem {
    /// Schedulable and not blocked
    pub buildable: bool,
    pub task: QueueTask,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueTask {
    pub name: String,
}

impl JenkinsQueue {
    /// Number of entries that count toward capacity demand
    pub fn buildable_count(&self) -> u32 {
        self.items.iter().filter(|item| item.buildable).count() as u32
    }

    /// Names of the buildable tasks, in queue order
    pub fn buildable_task_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|item| item.buildable)
            .map(|item| item.task.name.as_str())
            .collect()
    }
}

/// Node ("computer") status (`GET /computer/{name}/api/json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JenkinsNodeInfo {
    pub idle: bool,
    pub temporarily_offline: bool,
    pub offline: bool,
    pub monitor_data: MonitorData,
}

/// Monitor results reported by the node's agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorData {
    #[serde(rename = "hudson.node_monitors.ArchitectureMonitor")]
    pub architecture: Option<String>,
}

impl From<JenkinsNodeInfo> for NodeRegistration {
    fn from(info: JenkinsNodeInfo) -> Self {
        NodeRegistration {
            offline: info.offline,
            temporarily_offline: info.temporarily_offline,
            idle: info.idle,
            agent_connected: info.monitor_data.architecture.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_counts_only_buildable() {
        let queue: JenkinsQueue = serde_json::from_str(
            r#"{"items":[
                {"buildable":true,"task":{"name":"api-tests"}},
                {"buildable":false,"task":{"name":"blocked-deploy"}},
                {"buildable":true,"task":{"name":"lint"}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(queue.buildable_count(), 2);
        assert_eq!(queue.buildable_task_names(), vec!["api-tests", "lint"]);
    }

    #[test]
    fn test_empty_queue_document() {
        let queue: JenkinsQueue = serde_json::from_str("{}").unwrap();
        assert_eq!(queue.buildable_count(), 0);
    }

    #[test]
    fn test_node_info_with_agent_monitor() {
        let info: JenkinsNodeInfo = serde_json::from_value(serde_json::json!({
            "idle": true,
            "temporarilyOffline": false,
            "offline": false,
            "monitorData": { AGENT_MONITOR_FIELD: "Linux (amd64)" }
        }))
        .unwrap();

        let reg = NodeRegistration::from(info);
        assert!(reg.idle);
        assert!(reg.agent_connected);
        assert!(reg.is_fully_online());
    }

    #[test]
    fn test_null_monitor_means_agent_disconnected() {
        let info: JenkinsNodeInfo = serde_json::from_str(
            r#"{
                "idle": true,
                "temporarilyOffline": true,
                "offline": true,
                "monitorData": {"hudson.node_monitors.ArchitectureMonitor": null}
            }"#,
        )
        .unwrap();

        let reg = NodeRegistration::from(info);
        assert!(reg.offline);
        assert!(reg.temporarily_offline);
        assert!(!reg.agent_connected);
    }

    #[test]
    fn test_missing_fields_default_to_false() {
        let info: JenkinsNodeInfo = serde_json::from_str(r#"{"offline": true}"#).unwrap();
        let reg = NodeRegistration::from(info);
        assert!(reg.offline);
        assert!(!reg.idle);
        assert!(!reg.agent_connected);
    }
}
