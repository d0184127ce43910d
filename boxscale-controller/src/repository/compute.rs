//! Compute repository
//!
//! Instance lifecycle operations on the compute plane. Start and stop return
//! once the request is accepted; use `StatusWaiter` to wait for the result.

use anyhow::{Context, Result};
use async_trait::async_trait;
use boxscale_client::ComputeEngineClient;
use boxscale_core::domain::node::PowerState;
use std::sync::Arc;
use tracing::{debug, warn};

/// Repository trait for instance lifecycle operations
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Requests that the instance be started
    async fn start(&self, node_id: &str) -> Result<()>;

    /// Requests that the instance be stopped
    async fn stop(&self, node_id: &str) -> Result<()>;

    /// Current power state of the instance
    async fn power_state(&self, node_id: &str) -> Result<PowerState>;

    /// Power state, or `Unknown` if the instance could not be read
    async fn power_state_or_unknown(&self, node_id: &str) -> PowerState {
        match self.power_state(node_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to get instance data for {}: {:#}", node_id, e);
                PowerState::Unknown
            }
        }
    }
}

/// HTTP implementation of ComputeClient
pub struct HttpComputeClient {
    client: Arc<ComputeEngineClient>,
}

impl HttpComputeClient {
    pub fn new(client: Arc<ComputeEngineClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    async fn start(&self, node_id: &str) -> Result<()> {
        let op = self
            .client
            .start_instance(node_id)
            .await
            .with_context(|| format!("Failed to start instance {}", node_id))?;

        debug!("Start of {} accepted (operation {})", node_id, op.name);
        Ok(())
    }

    async fn stop(&self, node_id: &str) -> Result<()> {
        let op = self
            .client
            .stop_instance(node_id)
            .await
            .with_context(|| format!("Failed to stop instance {}", node_id))?;

        debug!("Stop of {} accepted (operation {})", node_id, op.name);
        Ok(())
    }

    async fn power_state(&self, node_id: &str) -> Result<PowerState> {
        let instance = self
            .client
            .get_instance(node_id)
            .await
            .with_context(|| format!("Failed to get instance {}", node_id))?;

        Ok(instance.power_state())
    }
}
