//! Build node domain model
//!
//! A build node is never stored. Each poll cycle rebuilds its view from the
//! CI master (registration) and the compute plane (power state).

use serde::{Deserialize, Serialize};

/// Power state of a build box as reported by the compute plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    /// Instance is stopped, terminated or suspended
    Stopped,

    /// Instance is being provisioned or staged
    Starting,

    /// Instance is running
    Running,

    /// Instance is stopping or suspending
    Stopping,

    /// State could not be determined (query failure or unrecognised value)
    Unknown,
}

impl PowerState {
    /// Maps a compute plane status string onto a power state
    ///
    /// Unrecognised values (including `REPAIRING`) map to `Unknown`, which
    /// waiters treat as "not yet at target".
    pub fn from_status(status: &str) -> Self {
        match status {
            "PROVISIONING" | "STAGING" => PowerState::Starting,
            "RUNNING" => PowerState::Running,
            "STOPPING" | "SUSPENDING" => PowerState::Stopping,
            "TERMINATED" | "STOPPED" | "SUSPENDED" => PowerState::Stopped,
            _ => PowerState::Unknown,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PowerState::Running)
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::Stopped => write!(f, "STOPPED"),
            PowerState::Starting => write!(f, "STARTING"),
            PowerState::Running => write!(f, "RUNNING"),
            PowerState::Stopping => write!(f, "STOPPING"),
            PowerState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Registration state of a node on the CI master
///
/// The default value (everything false) is what a failed or undecodable
/// node query degrades to. Such a node is neither `offline` (so scale-up
/// skips it) nor `idle` (so scale-down skips it).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRegistration {
    /// CI master considers the node unavailable
    pub offline: bool,

    /// Maintenance flag, distinct from hard offline
    pub temporarily_offline: bool,

    /// No job currently assigned
    pub idle: bool,

    /// The node's agent process is registered with the CI master
    pub agent_connected: bool,
}

impl NodeRegistration {
    /// Node is registered and accepting work
    pub fn is_fully_online(&self) -> bool {
        !self.offline && !self.temporarily_offline && self.agent_connected
    }
}

/// Per-cycle snapshot of one pool member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildNode {
    pub identifier: String,
    pub power_state: PowerState,
    pub registration: NodeRegistration,
}

impl std::fmt::Display for BuildNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] offline={} maintenance={} idle={} agent={}",
            self.identifier,
            self.power_state,
            self.registration.offline,
            self.registration.temporarily_offline,
            self.registration.idle,
            self.registration.agent_connected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state_from_status() {
        assert_eq!(PowerState::from_status("RUNNING"), PowerState::Running);
        assert_eq!(PowerState::from_status("TERMINATED"), PowerState::Stopped);
        assert_eq!(PowerState::from_status("SUSPENDED"), PowerState::Stopped);
        assert_eq!(PowerState::from_status("STAGING"), PowerState::Starting);
        assert_eq!(PowerState::from_status("STOPPING"), PowerState::Stopping);
        assert_eq!(PowerState::from_status("REPAIRING"), PowerState::Unknown);
        assert_eq!(PowerState::from_status("running"), PowerState::Unknown);
    }

    #[test]
    fn test_default_registration_is_all_false() {
        let reg = NodeRegistration::default();
        assert!(!reg.offline);
        assert!(!reg.temporarily_offline);
        assert!(!reg.idle);
        assert!(!reg.agent_connected);
        assert!(!reg.is_fully_online());
    }

    #[test]
    fn test_fully_online_requires_agent_and_no_maintenance() {
        let mut reg = NodeRegistration {
            offline: false,
            temporarily_offline: false,
            idle: true,
            agent_connected: true,
        };
        assert!(reg.is_fully_online());

        reg.temporarily_offline = true;
        assert!(!reg.is_fully_online());

        reg.temporarily_offline = false;
        reg.agent_connected = false;
        assert!(!reg.is_fully_online());
    }

    #[test]
    fn test_build_node_display() {
        let node = BuildNode {
            identifier: "build1-api".to_string(),
            power_state: PowerState::Running,
            registration: NodeRegistration {
                idle: true,
                agent_connected: true,
                ..Default::default()
            },
        };
        assert_eq!(
            node.to_string(),
            "build1-api [RUNNING] offline=false maintenance=false idle=true agent=true"
        );
    }
}
