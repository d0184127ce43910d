//! Node info repository
//!
//! Read-only queries against the CI master:
//! - Number of buildable queue entries
//! - Registration state of a single node

use anyhow::{Context, Result};
use async_trait::async_trait;
use boxscale_client::JenkinsClient;
use boxscale_core::domain::node::NodeRegistration;
use std::sync::Arc;
use tracing::{debug, warn};

/// Repository trait for CI master queries
#[async_trait]
pub trait NodeInfoClient: Send + Sync {
    /// Counts buildable (schedulable, not blocked) queue entries
    async fn queue_size(&self) -> Result<u32>;

    /// Fetches the registration state of one node
    ///
    /// # Arguments
    /// * `node_id` - Pool identifier of the build box
    async fn node_registration(&self, node_id: &str) -> Result<NodeRegistration>;

    /// Queue size, or zero if the CI master could not be read
    ///
    /// Zero makes the cycle scale down, the safe direction.
    async fn queue_size_or_zero(&self) -> u32 {
        match self.queue_size().await {
            Ok(size) => size,
            Err(e) => {
                warn!("Failed to read queue size, assuming empty queue: {:#}", e);
                0
            }
        }
    }

    /// Registration state, or all-false if the node could not be read
    async fn registration_or_default(&self, node_id: &str) -> NodeRegistration {
        match self.node_registration(node_id).await {
            Ok(registration) => registration,
            Err(e) => {
                warn!("Failed to read node info for {}: {:#}", node_id, e);
                NodeRegistration::default()
            }
        }
    }
}

/// HTTP implementation of NodeInfoClient
pub struct HttpNodeInfoClient {
    client: Arc<JenkinsClient>,
}

impl HttpNodeInfoClient {
    pub fn new(client: Arc<JenkinsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeInfoClient for HttpNodeInfoClient {
    async fn queue_size(&self) -> Result<u32> {
        let queue = self
            .client
            .get_queue()
            .await
            .context("Failed to fetch build queue")?;

        let names = queue.buildable_task_names();
        if !names.is_empty() {
            debug!("Buildable queue entries: {}", names.join(", "));
        }

        Ok(queue.buildable_count())
    }

    async fn node_registration(&self, node_id: &str) -> Result<NodeRegistration> {
        let info = self
            .client
            .get_node(node_id)
            .await
            .with_context(|| format!("Failed to fetch node {}", node_id))?;

        Ok(info.into())
    }
}
