//! Fleet controller
//!
//! Owns the poll loop. Each cycle reads the queue, then either brings
//! offline boxes online (queue not empty) or drains idle boxes (queue
//! empty). Per-node work runs in its own task; a cycle ends only when every
//! task it launched has finished, so cycles never overlap.

use boxscale_core::domain::capacity::{WorkersPerBox, boxes_needed};
use boxscale_core::domain::pool::Pool;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use crate::repository::NodeInfoClient;
use crate::service::{BringOnlineOutcome, NodeOrchestrator, TakeOfflineOutcome};

/// Result of one node task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult<T> {
    Finished(T),
    /// The task panicked; logged and otherwise ignored
    Panicked(String),
}

/// What a single poll cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    ScaleUp {
        queue_size: u32,
        boxes_needed: u32,
        /// Nodes a bring-online task was launched for, in launch order
        launched: Vec<(String, TaskResult<BringOnlineOutcome>)>,
        /// Boxes still wanted when the pool ran out of offline nodes
        shortfall: u32,
    },
    ScaleDown {
        outcomes: Vec<(String, TaskResult<TakeOfflineOutcome>)>,
    },
}

impl<T: std::fmt::Display> std::fmt::Display for TaskResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskResult::Finished(outcome) => write!(f, "{}", outcome),
            TaskResult::Panicked(reason) => write!(f, "task panicked: {}", reason),
        }
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleReport::ScaleUp {
                queue_size,
                boxes_needed,
                launched,
                shortfall,
            } => {
                write!(
                    f,
                    "scale-up: queue {}, {} boxes needed, {} started, {} short",
                    queue_size,
                    boxes_needed,
                    launched.len(),
                    shortfall
                )?;
                write_outcomes(f, launched)
            }
            CycleReport::ScaleDown { outcomes } => {
                write!(f, "scale-down: {} boxes checked", outcomes.len())?;
                write_outcomes(f, outcomes)
            }
        }
    }
}

fn write_outcomes<T: std::fmt::Display>(
    f: &mut std::fmt::Formatter<'_>,
    outcomes: &[(String, TaskResult<T>)],
) -> std::fmt::Result {
    for (node_id, result) in outcomes {
        write!(f, "; {} {}", node_id, result)?;
    }
    Ok(())
}

/// Poll loop over the whole pool
pub struct FleetController {
    info: Arc<dyn NodeInfoClient>,
    orchestrator: Arc<NodeOrchestrator>,
    pool: Pool,
    workers_per_box: WorkersPerBox,
    poll_interval: Duration,
    rng: StdRng,
}

impl FleetController {
    /// Creates a new fleet controller
    ///
    /// # Arguments
    /// * `info` - CI master queries (queue depth, node selection)
    /// * `orchestrator` - Per-node transitions
    /// * `pool` - Static set of build boxes
    /// * `workers_per_box` - Executors per build box, for the capacity rule
    /// * `poll_interval` - Pause between cycles
    pub fn new(
        info: Arc<dyn NodeInfoClient>,
        orchestrator: Arc<NodeOrchestrator>,
        pool: Pool,
        workers_per_box: WorkersPerBox,
        poll_interval: Duration,
    ) -> Self {
        Self {
            info,
            orchestrator,
            pool,
            workers_per_box,
            poll_interval,
            rng: StdRng::from_entropy(),
        }
    }

    /// Uses a seeded random source for the scale-up order
    #[cfg(test)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Runs cycles forever
    pub async fn run(&mut self) {
        info!(
            "Starting fleet controller (pool: {}, interval: {:?})",
            self.pool.members().join(", "),
            self.poll_interval
        );

        loop {
            let report = self.run_cycle().await;
            info!("Iteration finished: {}", report);
            time::sleep(self.poll_interval).await;
        }
    }

    /// Performs a single poll cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        let queue_size = self.info.queue_size_or_zero().await;
        info!("Queue size: {}", queue_size);

        if queue_size > 0 {
            self.scale_up(queue_size).await
        } else {
            self.scale_down().await
        }
    }

    /// Brings enough offline boxes online to serve `queue_size` entries
    ///
    /// The needed count drops when a task is launched, not when it succeeds.
    /// A box that fails to come online is not replaced within the cycle; the
    /// next cycle re-reads the queue and the pool and makes up the difference.
    async fn scale_up(&mut self, queue_size: u32) -> CycleReport {
        let wanted = boxes_needed(queue_size, self.workers_per_box);
        let mut needed = wanted;
        info!("Checking if any box is offline ({} needed)", needed);

        let order = self.pool.shuffled(&mut self.rng);
        let mut handles = Vec::new();

        for node_id in order {
            if needed == 0 {
                break;
            }

            let registration = self.info.registration_or_default(&node_id).await;
            if !registration.offline {
                debug!("{} is not offline, skipping", node_id);
                continue;
            }

            let orchestrator = Arc::clone(&self.orchestrator);
            let task_id = node_id.clone();
            let handle = tokio::spawn(async move { orchestrator.bring_online(&task_id).await });
            handles.push((node_id, handle));

            needed -= 1;
            info!("{} more boxes needed", needed);
        }

        if needed > 0 {
            info!("No more build boxes available to start");
        }

        let launched = join_all(handles).await;
        let online = launched
            .iter()
            .filter(|(_, result)| matches!(result, TaskResult::Finished(o) if o.is_online()))
            .count();
        info!("{} of {} started boxes came online", online, launched.len());

        CycleReport::ScaleUp {
            queue_size,
            boxes_needed: wanted,
            launched,
            shortfall: needed,
        }
    }

    /// Offers every box for draining; each task checks idleness itself
    async fn scale_down(&mut self) -> CycleReport {
        info!("Checking if any box is enabled and idle");

        let handles = self
            .pool
            .members()
            .iter()
            .map(|node_id| {
                let orchestrator = Arc::clone(&self.orchestrator);
                let task_id = node_id.clone();
                let handle =
                    tokio::spawn(async move { orchestrator.take_offline(&task_id).await });
                (node_id.clone(), handle)
            })
            .collect();

        CycleReport::ScaleDown {
            outcomes: join_all(handles).await,
        }
    }
}

/// Waits for every node task, turning panics into results
async fn join_all<T>(handles: Vec<(String, JoinHandle<T>)>) -> Vec<(String, TaskResult<T>)>
where
    T: std::fmt::Display + Send + 'static,
{
    let mut results = Vec::with_capacity(handles.len());

    for (node_id, handle) in handles {
        let result = match handle.await {
            Ok(outcome) => {
                debug!("{}: {}", node_id, outcome);
                TaskResult::Finished(outcome)
            }
            Err(e) => {
                warn!("Task for {} panicked: {}", node_id, e);
                TaskResult::Panicked(e.to_string())
            }
        };
        results.push((node_id, result));
    }

    results
}
