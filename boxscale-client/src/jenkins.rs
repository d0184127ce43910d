//! CI master API endpoints

use boxscale_core::dto::jenkins::{JenkinsNodeInfo, JenkinsQueue};
use reqwest::Client;
use reqwest::header::AUTHORIZATION;

use crate::error::Result;
use crate::{handle_empty_response, handle_response, normalize_base_url};

/// HTTP client for the Jenkins-style CI master
///
/// Build boxes are addressed by their pool identifier. The CI master knows
/// them under a longer computer name, formed by appending
/// `node_name_suffix` (for example `.c.my-project.internal`).
#[derive(Debug, Clone)]
pub struct JenkinsClient {
    /// Base URL of the CI master (e.g., "http://jenkins.local")
    base_url: String,
    /// Opaque `Authorization` header value sent with every call
    auth_header: String,
    /// Appended to a node identifier to form the CI computer name
    node_name_suffix: String,
    /// HTTP client instance
    client: Client,
}

impl JenkinsClient {
    /// Create a new CI master client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the CI master
    /// * `auth_header` - Value of the `Authorization` header
    ///
    /// # Example
    /// ```
    /// use boxscale_client::JenkinsClient;
    ///
    /// let client = JenkinsClient::new("http://jenkins.local/", "Basic abc=");
    /// assert_eq!(client.base_url(), "http://jenkins.local");
    /// ```
    pub fn new(base_url: impl Into<String>, auth_header: impl Into<String>) -> Self {
        Self::with_client(base_url, auth_header, Client::new())
    }

    /// Create a new CI master client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        base_url: impl Into<String>,
        auth_header: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            auth_header: auth_header.into(),
            node_name_suffix: String::new(),
            client,
        }
    }

    /// Set the suffix appended to node identifiers
    pub fn with_node_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.node_name_suffix = suffix.into();
        self
    }

    /// Get the base URL of the CI master
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a node's computer resource
    pub fn computer_url(&self, node_id: &str) -> String {
        format!(
            "{}/computer/{}{}",
            self.base_url, node_id, self.node_name_suffix
        )
    }

    // =============================================================================
    // Queries
    // =============================================================================

    /// Fetch the build queue
    pub async fn get_queue(&self) -> Result<JenkinsQueue> {
        let url = format!("{}/queue/api/json", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Fetch a node's registration status
    ///
    /// # Arguments
    /// * `node_id` - The pool identifier of the build box
    pub async fn get_node(&self, node_id: &str) -> Result<JenkinsNodeInfo> {
        let url = format!("{}/api/json", self.computer_url(node_id));
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .await?;

        handle_response(response).await
    }

    // =============================================================================
    // Commands
    // =============================================================================

    /// Flip a node's maintenance ("temporarily offline") flag
    ///
    /// The CI master toggles rather than sets, so callers read the current
    /// flag first.
    pub async fn toggle_offline(&self, node_id: &str) -> Result<()> {
        let url = format!("{}/toggleOffline", self.computer_url(node_id));
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .await?;

        handle_empty_response(response).await
    }

    /// Ask the CI master to (re)launch a node's agent process
    pub async fn launch_agent(&self, node_id: &str) -> Result<()> {
        let url = format!("{}/launchSlaveAgent", self.computer_url(node_id));
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .await?;

        handle_empty_response(response).await
    }
}
