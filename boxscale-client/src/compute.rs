//! Compute plane API endpoints

use boxscale_core::dto::compute::{ComputeInstance, ComputeOperation};
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use std::sync::Arc;

use crate::auth::TokenSource;
use crate::error::Result;
use crate::{handle_response, normalize_base_url};

/// Default compute plane API root
pub const COMPUTE_API_URL: &str = "https://compute.googleapis.com/compute/v1";

/// HTTP client for the compute control plane
///
/// All instances live in a single project and zone. Start and stop are
/// asynchronous: a successful call only means the operation was accepted.
#[derive(Clone)]
pub struct ComputeEngineClient {
    base_url: String,
    project: String,
    zone: String,
    tokens: Arc<dyn TokenSource>,
    client: Client,
}

impl ComputeEngineClient {
    /// Create a new compute client against the public API
    ///
    /// # Arguments
    /// * `project` - Project owning the build boxes
    /// * `zone` - Zone the build boxes run in
    /// * `tokens` - Credential strategy used for every request
    pub fn new(
        project: impl Into<String>,
        zone: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self::with_client(COMPUTE_API_URL, project, zone, tokens, Client::new())
    }

    /// Create a new compute client with a custom API root and HTTP client
    pub fn with_client(
        base_url: impl Into<String>,
        project: impl Into<String>,
        zone: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        client: Client,
    ) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            project: project.into(),
            zone: zone.into(),
            tokens,
            client,
        }
    }

    /// URL of an instance resource
    pub fn instance_url(&self, instance: &str) -> String {
        format!(
            "{}/projects/{}/zones/{}/instances/{}",
            self.base_url, self.project, self.zone, instance
        )
    }

    /// Request that an instance be started
    pub async fn start_instance(&self, instance: &str) -> Result<ComputeOperation> {
        self.post_operation(instance, "start").await
    }

    /// Request that an instance be stopped
    pub async fn stop_instance(&self, instance: &str) -> Result<ComputeOperation> {
        self.post_operation(instance, "stop").await
    }

    /// Fetch an instance resource
    pub async fn get_instance(&self, instance: &str) -> Result<ComputeInstance> {
        let url = self.instance_url(instance);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.tokens.authorization().await?)
            .send()
            .await?;

        handle_response(response).await
    }

    async fn post_operation(&self, instance: &str, verb: &str) -> Result<ComputeOperation> {
        let url = format!("{}/{}", self.instance_url(instance), verb);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.tokens.authorization().await?)
            .send()
            .await?;

        handle_response(response).await
    }
}

impl std::fmt::Debug for ComputeEngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeEngineClient")
            .field("base_url", &self.base_url)
            .field("project", &self.project)
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}
