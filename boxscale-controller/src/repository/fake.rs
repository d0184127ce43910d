//! In-memory collaborators for tests
//!
//! `FakeFleet` plays both the CI master and the compute plane so that a
//! node's registration and power state live in one place. Every command is
//! recorded so tests can assert on what the controller sent.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use boxscale_core::domain::node::{NodeRegistration, PowerState};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{ComputeClient, NodeCommandClient, NodeInfoClient};

/// Command recorded by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Toggle(String),
    Launch(String),
    Start(String),
    Stop(String),
}

/// Scripted state of one build box
#[derive(Debug, Clone)]
pub struct FakeNode {
    pub temporarily_offline: bool,
    pub idle: bool,
    pub agent_connected: bool,
    pub power: PowerState,
    /// Node info reads fail as if the JSON were undecodable
    pub malformed: bool,
    pub toggle_fails: bool,
    pub launch_fails: bool,
    pub start_fails: bool,
    pub stop_fails: bool,
    /// The CI master dispatches a job to the node as it is toggled
    pub job_arrives_on_toggle: bool,
    /// Instance never leaves its transitional state after start/stop
    pub stuck: bool,
    /// Relaunches needed before the agent connects; `None` means never
    pub agent_connects_after: Option<u32>,
    /// Number of upcoming power state reads that fail
    pub failing_power_reads: u32,
    pub launches: u32,
    pending: VecDeque<PowerState>,
}

impl FakeNode {
    fn base(power: PowerState) -> Self {
        Self {
            temporarily_offline: false,
            idle: true,
            agent_connected: false,
            power,
            malformed: false,
            toggle_fails: false,
            launch_fails: false,
            start_fails: false,
            stop_fails: false,
            job_arrives_on_toggle: false,
            stuck: false,
            agent_connects_after: Some(1),
            failing_power_reads: 0,
            launches: 0,
            pending: VecDeque::new(),
        }
    }

    /// Powered off, agent disconnected, so the CI master reports it offline
    pub fn offline_stopped() -> Self {
        Self::base(PowerState::Stopped)
    }

    /// Running, registered, no job assigned
    pub fn online_idle() -> Self {
        Self {
            agent_connected: true,
            ..Self::base(PowerState::Running)
        }
    }

    /// Running, registered, executing a job
    pub fn online_busy() -> Self {
        Self {
            idle: false,
            ..Self::online_idle()
        }
    }

    pub fn registration(&self) -> NodeRegistration {
        NodeRegistration {
            offline: self.temporarily_offline || !self.agent_connected,
            temporarily_offline: self.temporarily_offline,
            idle: self.idle,
            agent_connected: self.agent_connected,
        }
    }
}

/// Fake CI master plus compute plane
#[derive(Default)]
pub struct FakeFleet {
    nodes: Mutex<HashMap<String, FakeNode>>,
    queue: Mutex<Option<u32>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeFleet {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Some(0)),
            ..Default::default()
        }
    }

    pub fn add_node(&self, node_id: &str, node: FakeNode) {
        self.nodes
            .lock()
            .unwrap()
            .insert(node_id.to_string(), node);
    }

    /// Applies `f` to a node's scripted state
    pub fn update(&self, node_id: &str, f: impl FnOnce(&mut FakeNode)) {
        let mut nodes = self.nodes.lock().unwrap();
        f(nodes.get_mut(node_id).expect("unknown fake node"));
    }

    pub fn node(&self, node_id: &str) -> FakeNode {
        self.nodes.lock().unwrap()[node_id].clone()
    }

    pub fn make_malformed(&self, node_id: &str) {
        self.update(node_id, |n| n.malformed = true);
    }

    pub fn set_queue_size(&self, size: u32) {
        *self.queue.lock().unwrap() = Some(size);
    }

    pub fn fail_queue(&self) {
        *self.queue.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn with_node<T>(&self, node_id: &str, f: impl FnOnce(&mut FakeNode) -> Result<T>) -> Result<T> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .get_mut(node_id)
            .ok_or_else(|| anyhow!("API error (status 404): {} not found", node_id))?;
        f(node)
    }
}

#[async_trait]
impl NodeInfoClient for FakeFleet {
    async fn queue_size(&self) -> Result<u32> {
        (*self.queue.lock().unwrap()).ok_or_else(|| anyhow!("queue endpoint unreachable"))
    }

    async fn node_registration(&self, node_id: &str) -> Result<NodeRegistration> {
        self.with_node(node_id, |node| {
            if node.malformed {
                bail!("Failed to parse JSON response: expected value at line 1 column 1");
            }
            Ok(node.registration())
        })
    }
}

#[async_trait]
impl NodeCommandClient for FakeFleet {
    async fn toggle_maintenance(&self, node_id: &str) -> Result<()> {
        self.record(Call::Toggle(node_id.to_string()));
        self.with_node(node_id, |node| {
            if node.toggle_fails {
                bail!("API error (status 503): unavailable");
            }
            node.temporarily_offline = !node.temporarily_offline;
            if node.job_arrives_on_toggle {
                node.idle = false;
            }
            Ok(())
        })
    }

    async fn launch_agent(&self, node_id: &str) -> Result<()> {
        self.record(Call::Launch(node_id.to_string()));
        self.with_node(node_id, |node| {
            if node.launch_fails {
                bail!("API error (status 500): launch failed");
            }
            node.launches += 1;
            if let Some(after) = node.agent_connects_after {
                if node.launches >= after {
                    node.agent_connected = true;
                }
            }
            Ok(())
        })
    }
}

#[async_trait]
impl ComputeClient for FakeFleet {
    async fn start(&self, node_id: &str) -> Result<()> {
        self.record(Call::Start(node_id.to_string()));
        self.with_node(node_id, |node| {
            if node.start_fails {
                bail!("API error (status 403): quota exceeded");
            }
            node.pending = if node.stuck {
                VecDeque::from([PowerState::Starting])
            } else {
                VecDeque::from([PowerState::Starting, PowerState::Running])
            };
            Ok(())
        })
    }

    async fn stop(&self, node_id: &str) -> Result<()> {
        self.record(Call::Stop(node_id.to_string()));
        self.with_node(node_id, |node| {
            if node.stop_fails {
                bail!("API error (status 403): permission denied");
            }
            node.pending = if node.stuck {
                VecDeque::from([PowerState::Stopping])
            } else {
                VecDeque::from([PowerState::Stopping, PowerState::Stopped])
            };
            Ok(())
        })
    }

    async fn power_state(&self, node_id: &str) -> Result<PowerState> {
        self.with_node(node_id, |node| {
            if node.failing_power_reads > 0 {
                node.failing_power_reads -= 1;
                bail!("HTTP request failed: connection reset");
            }
            if let Some(next) = node.pending.pop_front() {
                node.power = next;
            }
            Ok(node.power)
        })
    }
}
