//! Node orchestrator
//!
//! Per-node "bring online" and "take offline" transitions. Each transition
//! is strictly sequential for its node and keyed only by the node's
//! identifier, so transitions of different nodes can interleave freely.
//!
//! The maintenance flag brackets every power change: it is set before a node
//! is started or stopped and only cleared once the node's agent is verified,
//! so the CI master never dispatches to a node mid-transition.
//!
//! Failures never escape a transition. Every early return is a named outcome;
//! the node is re-evaluated from live state on the next poll.

use boxscale_core::domain::node::{BuildNode, NodeRegistration, PowerState};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{info, warn};

use crate::config::Timings;
use crate::repository::{CommandOutcome, ComputeClient, NodeCommandClient, NodeInfoClient};
use crate::service::agent_launcher::{AgentLauncher, LaunchOutcome};
use crate::service::status_waiter::{StatusWaiter, WaitError};

/// How a bring-online transition ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BringOnlineOutcome {
    /// Running, agent connected, maintenance flag cleared
    Online,

    /// Registration could not be read before toggling; nothing was changed
    RegistrationUnavailable(String),

    /// Maintenance mode could not be enabled; nothing else was attempted
    MaintenanceFailed(String),

    /// Start request rejected; node left in maintenance
    StartFailed(String),

    /// Instance never reached RUNNING; node left in maintenance
    StartStuck(WaitError),

    /// Agent did not connect in time; node left in maintenance
    AgentTimedOut,

    /// Agent launch aborted unexpectedly; node left in maintenance
    AgentLaunchFailed(String),

    /// Maintenance flag could not be cleared; retried next cycle
    ReleaseFailed(String),
}

impl BringOnlineOutcome {
    pub fn is_online(&self) -> bool {
        matches!(self, BringOnlineOutcome::Online)
    }
}

impl std::fmt::Display for BringOnlineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BringOnlineOutcome::Online => write!(f, "online"),
            BringOnlineOutcome::RegistrationUnavailable(reason) => {
                write!(f, "registration unavailable: {}", reason)
            }
            BringOnlineOutcome::MaintenanceFailed(reason) => {
                write!(f, "maintenance toggle failed: {}", reason)
            }
            BringOnlineOutcome::StartFailed(reason) => write!(f, "start failed: {}", reason),
            BringOnlineOutcome::StartStuck(e) => write!(f, "start stuck: {}", e),
            BringOnlineOutcome::AgentTimedOut => write!(f, "agent did not connect"),
            BringOnlineOutcome::AgentLaunchFailed(reason) => {
                write!(f, "agent launch failed: {}", reason)
            }
            BringOnlineOutcome::ReleaseFailed(reason) => write!(f, "release failed: {}", reason),
        }
    }
}

/// How a take-offline transition ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakeOfflineOutcome {
    /// Node has a job (or could not be read); no stop issued
    Busy,

    /// Maintenance mode could not be enabled; no stop issued
    MaintenanceFailed(String),

    /// Node is in maintenance and its instance is not running
    AlreadyStopped,

    /// Stop request rejected; node left in maintenance
    StopFailed(String),

    /// Instance never reached a stopped state
    StopStuck(WaitError),

    /// Node is in maintenance and its instance has stopped
    Stopped,
}

impl std::fmt::Display for TakeOfflineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TakeOfflineOutcome::Busy => write!(f, "busy"),
            TakeOfflineOutcome::MaintenanceFailed(reason) => {
                write!(f, "maintenance toggle failed: {}", reason)
            }
            TakeOfflineOutcome::AlreadyStopped => write!(f, "already stopped"),
            TakeOfflineOutcome::StopFailed(reason) => write!(f, "stop failed: {}", reason),
            TakeOfflineOutcome::StopStuck(e) => write!(f, "stop stuck: {}", e),
            TakeOfflineOutcome::Stopped => write!(f, "stopped"),
        }
    }
}

/// Single-node state machine driver
pub struct NodeOrchestrator {
    info: Arc<dyn NodeInfoClient>,
    commands: Arc<dyn NodeCommandClient>,
    compute: Arc<dyn ComputeClient>,
    waiter: StatusWaiter,
    launcher: AgentLauncher,
    settle_delay: Duration,
}

impl NodeOrchestrator {
    /// Creates a new orchestrator
    ///
    /// The status waiter and agent launcher are built from `timings`.
    pub fn new(
        info: Arc<dyn NodeInfoClient>,
        commands: Arc<dyn NodeCommandClient>,
        compute: Arc<dyn ComputeClient>,
        timings: &Timings,
    ) -> Self {
        let waiter = StatusWaiter::new(
            Arc::clone(&compute),
            timings.status_poll_interval,
            timings.status_max_wait,
        );
        let launcher = AgentLauncher::new(
            Arc::clone(&info),
            Arc::clone(&commands),
            timings.agent_retry_interval,
            timings.agent_launch_timeout,
        );

        Self {
            info,
            commands,
            compute,
            waiter,
            launcher,
            settle_delay: timings.settle_delay,
        }
    }

    // =============================================================================
    // Bring online
    // =============================================================================

    /// Starts an offline node and registers it with the CI master
    ///
    /// The caller has already seen the node reported `offline`.
    pub async fn bring_online(&self, node_id: &str) -> BringOnlineOutcome {
        info!("{} is offline, trying to toggle it online", node_id);

        // 1. Hold the node in maintenance while it transitions
        let registration = match self.read_registration(node_id).await {
            Ok(registration) => registration,
            Err(reason) => return BringOnlineOutcome::RegistrationUnavailable(reason),
        };
        if !registration.temporarily_offline {
            if let CommandOutcome::Failed(reason) = self.toggle(node_id).await {
                return BringOnlineOutcome::MaintenanceFailed(reason);
            }
            info!("{} was toggled temporarily offline", node_id);
        }

        // 2. Power on
        if !self.compute.power_state_or_unknown(node_id).await.is_running() {
            if let Err(e) = self.compute.start(node_id).await {
                warn!("Failed to start {}: {:#}", node_id, e);
                return BringOnlineOutcome::StartFailed(format!("{:#}", e));
            }

            if let Err(e) = self.waiter.wait_for(node_id, PowerState::Running).await {
                warn!("{}", e);
                return BringOnlineOutcome::StartStuck(e);
            }

            info!("{} is running, waiting {:?} for it to boot", node_id, self.settle_delay);
            time::sleep(self.settle_delay).await;
        }

        // 3. Agent
        if !self.info.registration_or_default(node_id).await.agent_connected {
            match self.launcher.launch(node_id).await {
                LaunchOutcome::Connected { relaunches } => {
                    info!("{} agent connected after {} relaunch(es)", node_id, relaunches);
                }
                LaunchOutcome::TimedOut { waited } => {
                    warn!(
                        "{} stays in maintenance: agent not connected after {:?}",
                        node_id, waited
                    );
                    return BringOnlineOutcome::AgentTimedOut;
                }
                LaunchOutcome::Failed(reason) => {
                    warn!("{} stays in maintenance: {}", node_id, reason);
                    return BringOnlineOutcome::AgentLaunchFailed(reason);
                }
            }
        }

        // 4. Release for job dispatch
        let registration = match self.read_registration(node_id).await {
            Ok(registration) => registration,
            Err(reason) => return BringOnlineOutcome::ReleaseFailed(reason),
        };
        if registration.temporarily_offline {
            if let CommandOutcome::Failed(reason) = self.toggle(node_id).await {
                return BringOnlineOutcome::ReleaseFailed(reason);
            }
            info!("{} was toggled temporarily online", node_id);
        }

        BringOnlineOutcome::Online
    }

    // =============================================================================
    // Take offline
    // =============================================================================

    /// Drains and powers off an idle node
    ///
    /// Busy nodes are left alone. Idleness is checked again once maintenance
    /// is set, so a job dispatched in between keeps its node running. There is
    /// no undo: a node that picks up work
    /// again is seen as offline next cycle and brought back online.
    pub async fn take_offline(&self, node_id: &str) -> TakeOfflineOutcome {
        let registration = self.info.registration_or_default(node_id).await;
        if !registration.idle {
            return TakeOfflineOutcome::Busy;
        }

        if !registration.temporarily_offline {
            info!("{} is not offline, trying to toggle it offline", node_id);
            if let CommandOutcome::Failed(reason) = self.toggle(node_id).await {
                return TakeOfflineOutcome::MaintenanceFailed(reason);
            }
            info!("{} was toggled temporarily offline", node_id);

            // A job may have been dispatched before maintenance took effect
            if !self.info.registration_or_default(node_id).await.idle {
                info!("{} picked up work while draining, leaving it running", node_id);
                return TakeOfflineOutcome::Busy;
            }
        }

        if !self.compute.power_state_or_unknown(node_id).await.is_running() {
            return TakeOfflineOutcome::AlreadyStopped;
        }

        info!("{} is running... Stopping", node_id);
        if let Err(e) = self.compute.stop(node_id).await {
            warn!("Failed to stop {}: {:#}", node_id, e);
            return TakeOfflineOutcome::StopFailed(format!("{:#}", e));
        }

        match self.waiter.wait_for(node_id, PowerState::Stopped).await {
            Ok(()) => TakeOfflineOutcome::Stopped,
            Err(e) => {
                warn!("{}", e);
                TakeOfflineOutcome::StopStuck(e)
            }
        }
    }

    /// Reads the current state of a node for reporting
    pub async fn snapshot(&self, node_id: &str) -> BuildNode {
        BuildNode {
            identifier: node_id.to_string(),
            power_state: self.compute.power_state_or_unknown(node_id).await,
            registration: self.info.registration_or_default(node_id).await,
        }
    }

    // =============================================================================
    // Helpers
    // =============================================================================

    /// Strict registration read used before flipping the maintenance flag
    ///
    /// The CI master only offers a toggle, so flipping on a guessed state could
    /// release a node instead of holding it.
    async fn read_registration(&self, node_id: &str) -> Result<NodeRegistration, String> {
        self.info.node_registration(node_id).await.map_err(|e| {
            warn!("Failed to read node info for {}: {:#}", node_id, e);
            format!("{:#}", e)
        })
    }

    async fn toggle(&self, node_id: &str) -> CommandOutcome {
        CommandOutcome::record(
            node_id,
            "toggleOffline",
            self.commands.toggle_maintenance(node_id).await,
        )
    }
}
