//! Agent launcher
//!
//! Drives a node's CI agent into the connected state. A retry task checks
//! connectivity and asks for a relaunch every `retry_interval`; it races an
//! overall timeout. Whichever finishes first wins, and a timeout aborts the
//! retry task.

use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use crate::repository::{CommandOutcome, NodeCommandClient, NodeInfoClient};

/// Result of an agent launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Agent reported in after `relaunches` relaunch requests
    Connected { relaunches: u32 },

    /// Agent did not connect in time; the retry task was aborted
    TimedOut { waited: Duration },

    /// Retry task died before connecting
    Failed(String),
}

/// Retry-with-timeout driver for agent connections
pub struct AgentLauncher {
    info: Arc<dyn NodeInfoClient>,
    commands: Arc<dyn NodeCommandClient>,
    retry_interval: Duration,
    timeout: Duration,
}

impl AgentLauncher {
    /// Creates a new agent launcher
    ///
    /// # Arguments
    /// * `info` - CI master queries, used to check connectivity
    /// * `commands` - CI master commands, used to request relaunches
    /// * `retry_interval` - Pause between two checks
    /// * `timeout` - Overall limit for the launch
    pub fn new(
        info: Arc<dyn NodeInfoClient>,
        commands: Arc<dyn NodeCommandClient>,
        retry_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            info,
            commands,
            retry_interval,
            timeout,
        }
    }

    /// Launches the agent of `node_id` and waits for it to connect
    ///
    /// Returns within `timeout` even if the CI master stops responding.
    pub async fn launch(&self, node_id: &str) -> LaunchOutcome {
        info!("Relaunching agent for {}, waiting for it to come online", node_id);

        let mut retry = tokio::spawn(Self::retry_until_connected(
            Arc::clone(&self.info),
            Arc::clone(&self.commands),
            node_id.to_string(),
            self.retry_interval,
        ));

        tokio::select! {
            joined = &mut retry => match joined {
                Ok(relaunches) => {
                    info!("Agent of {} is connected", node_id);
                    LaunchOutcome::Connected { relaunches }
                }
                Err(e) => {
                    warn!("Agent launch task for {} failed: {}", node_id, e);
                    LaunchOutcome::Failed(e.to_string())
                }
            },
            _ = time::sleep(self.timeout) => {
                retry.abort();
                warn!(
                    "{} did not come online within {:?} of launching the agent",
                    node_id, self.timeout
                );
                LaunchOutcome::TimedOut { waited: self.timeout }
            }
        }
    }

    /// Checks connectivity and requests relaunches until the agent connects
    async fn retry_until_connected(
        info: Arc<dyn NodeInfoClient>,
        commands: Arc<dyn NodeCommandClient>,
        node_id: String,
        retry_interval: Duration,
    ) -> u32 {
        let mut relaunches = 0;

        loop {
            if info.registration_or_default(&node_id).await.agent_connected {
                return relaunches;
            }

            let outcome = CommandOutcome::record(
                &node_id,
                "launchSlaveAgent",
                commands.launch_agent(&node_id).await,
            );
            relaunches += 1;
            if outcome.is_accepted() {
                debug!(
                    "Relaunch #{} requested for {}, next check in {:?}",
                    relaunches, node_id, retry_interval
                );
            }

            time::sleep(retry_interval).await;
        }
    }
}
