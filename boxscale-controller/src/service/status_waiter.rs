//! Status waiter
//!
//! Polls the compute plane until an instance reaches a target power state.
//! Only state changes are logged, so a slow boot does not flood the log.

use boxscale_core::domain::node::PowerState;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use crate::repository::ComputeClient;

/// Instance did not reach the target state in time
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("{node} stuck at {last_seen} after {waited:?} waiting for {target}")]
    Stuck {
        node: String,
        target: PowerState,
        last_seen: PowerState,
        waited: Duration,
    },
}

/// Blocking poll on an instance's power state
pub struct StatusWaiter {
    compute: Arc<dyn ComputeClient>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl StatusWaiter {
    /// Creates a new status waiter
    ///
    /// # Arguments
    /// * `compute` - Compute plane repository
    /// * `poll_interval` - Pause between two status reads
    /// * `max_wait` - Give up (with `WaitError::Stuck`) after this long
    pub fn new(compute: Arc<dyn ComputeClient>, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            compute,
            poll_interval,
            max_wait,
        }
    }

    /// Waits until `node_id` reports `target`
    ///
    /// Read errors are logged and retried on the next tick; they never end
    /// the wait early. Returns after at most `max_wait` plus one poll
    /// interval.
    pub async fn wait_for(&self, node_id: &str, target: PowerState) -> Result<(), WaitError> {
        let started = Instant::now();
        let mut previous: Option<PowerState> = None;

        loop {
            match self.compute.power_state(node_id).await {
                Ok(state) => {
                    if previous != Some(state) {
                        info!("  {} -> {}", node_id, state);
                        previous = Some(state);
                    }

                    if state == target {
                        info!("==> {} is {}", node_id, target);
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!("Failed to get instance data for {}: {:#}", node_id, e);
                }
            }

            let waited = started.elapsed();
            if waited >= self.max_wait {
                return Err(WaitError::Stuck {
                    node: node_id.to_string(),
                    target,
                    last_seen: previous.unwrap_or(PowerState::Unknown),
                    waited,
                });
            }

            debug!("Waiting {:?} before polling {} again", self.poll_interval, node_id);
            time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fake::{FakeFleet, FakeNode};

    fn waiter(fleet: &Arc<FakeFleet>, max_wait: Duration) -> StatusWaiter {
        StatusWaiter::new(fleet.clone(), Duration::from_secs(3), max_wait)
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_target_reached() {
        let fleet = Arc::new(FakeFleet::new());
        fleet.add_node("a", FakeNode::offline_stopped());
        fleet.start("a").await.unwrap();

        let started = Instant::now();
        waiter(&fleet, Duration::from_secs(600))
            .wait_for("a", PowerState::Running)
            .await
            .unwrap();

        // STARTING on the first read, RUNNING on the second
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(fleet.node("a").power, PowerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_at_target_returns_immediately() {
        let fleet = Arc::new(FakeFleet::new());
        fleet.add_node("a", FakeNode::online_idle());

        let started = Instant::now();
        waiter(&fleet, Duration::from_secs(600))
            .wait_for("a", PowerState::Running)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_errors_are_retried() {
        let fleet = Arc::new(FakeFleet::new());
        fleet.add_node("a", FakeNode::online_idle());
        fleet.update("a", |n| n.failing_power_reads = 2);

        let started = Instant::now();
        waiter(&fleet, Duration::from_secs(600))
            .wait_for("a", PowerState::Running)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_instance_reports_last_state() {
        let fleet = Arc::new(FakeFleet::new());
        fleet.add_node("a", FakeNode::offline_stopped());
        fleet.update("a", |n| n.stuck = true);
        fleet.start("a").await.unwrap();

        let started = Instant::now();
        let err = waiter(&fleet, Duration::from_secs(10))
            .wait_for("a", PowerState::Running)
            .await
            .unwrap_err();

        let WaitError::Stuck {
            node,
            target,
            last_seen,
            waited,
        } = err;
        assert_eq!(node, "a");
        assert_eq!(target, PowerState::Running);
        assert_eq!(last_seen, PowerState::Starting);
        assert!(waited >= Duration::from_secs(10));
        assert!(started.elapsed() <= Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_instance_is_stuck_at_unknown() {
        let fleet = Arc::new(FakeFleet::new());
        fleet.add_node("a", FakeNode::offline_stopped());
        fleet.update("a", |n| n.failing_power_reads = u32::MAX);

        let err = waiter(&fleet, Duration::from_secs(9))
            .wait_for("a", PowerState::Stopped)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WaitError::Stuck {
                last_seen: PowerState::Unknown,
                ..
            }
        ));
    }
}
