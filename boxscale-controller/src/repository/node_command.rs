//! Node command repository
//!
//! Commands sent to the CI master for a single node:
//! - Toggling maintenance ("temporarily offline") mode
//! - Relaunching the node's agent process

use anyhow::{Context, Result};
use async_trait::async_trait;
use boxscale_client::JenkinsClient;
use std::sync::Arc;
use tracing::{debug, warn};

/// Repository trait for CI master commands
#[async_trait]
pub trait NodeCommandClient: Send + Sync {
    /// Flips the node's maintenance flag
    async fn toggle_maintenance(&self, node_id: &str) -> Result<()>;

    /// Requests an agent (re)launch
    async fn launch_agent(&self, node_id: &str) -> Result<()>;
}

/// Result of a best-effort command
///
/// Commands are never retried within a cycle. A failure is logged and
/// reported here; the next poll re-reads the node and tries again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Accepted,
    Failed(String),
}

impl CommandOutcome {
    /// Converts a command result, logging the failure
    pub fn record<T>(node_id: &str, command: &str, result: Result<T>) -> Self {
        match result {
            Ok(_) => {
                debug!("{} accepted for {}", command, node_id);
                CommandOutcome::Accepted
            }
            Err(e) => {
                warn!("{} failed for {}: {:#}", command, node_id, e);
                CommandOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, CommandOutcome::Accepted)
    }
}

/// HTTP implementation of NodeCommandClient
pub struct HttpNodeCommandClient {
    client: Arc<JenkinsClient>,
}

impl HttpNodeCommandClient {
    pub fn new(client: Arc<JenkinsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeCommandClient for HttpNodeCommandClient {
    async fn toggle_maintenance(&self, node_id: &str) -> Result<()> {
        self.client
            .toggle_offline(node_id)
            .await
            .context("toggleOffline rejected")
    }

    async fn launch_agent(&self, node_id: &str) -> Result<()> {
        self.client
            .launch_agent(node_id)
            .await
            .context("launchSlaveAgent rejected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_success() {
        let outcome = CommandOutcome::record("a", "toggleOffline", Ok::<_, anyhow::Error>(()));
        assert!(outcome.is_accepted());
    }

    #[test]
    fn test_record_failure_keeps_message() {
        let outcome = CommandOutcome::record::<()>(
            "a",
            "toggleOffline",
            Err(anyhow::anyhow!("connection refused")),
        );
        assert_eq!(
            outcome,
            CommandOutcome::Failed("connection refused".to_string())
        );
    }
}
