//! Boxscale HTTP Clients
//!
//! Type-safe HTTP clients for the two services the autoscaler drives:
//!
//! - [`JenkinsClient`]: the CI master (queue depth, node status, maintenance
//!   toggles, agent relaunches)
//! - [`ComputeEngineClient`]: the compute control plane (start, stop and
//!   inspect build box instances)
//!
//! Compute plane requests are authorised with a bearer token obtained from a
//! [`TokenSource`], normally a [`CachedTokenSource`] over the metadata server
//! or a service-account key.
//!
//! # Example
//!
//! ```no_run
//! use boxscale_client::JenkinsClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), boxscale_client::ClientError> {
//!     let client = JenkinsClient::new("http://jenkins.local", "Basic dXNlcjp0b2tlbg==");
//!
//!     let queue = client.get_queue().await?;
//!     println!("{} buildable entries", queue.buildable_count());
//!     Ok(())
//! }
//! ```

pub mod auth;
mod compute;
pub mod error;
mod jenkins;

// Re-export commonly used types
pub use auth::{CachedTokenSource, MetadataServer, ServiceAccount, TokenEndpoint, TokenSource};
pub use compute::{COMPUTE_API_URL, ComputeEngineClient};
pub use error::{ClientError, Result};
pub use jenkins::JenkinsClient;

use serde::de::DeserializeOwned;

// =============================================================================
// Response Handlers
// =============================================================================

/// Handle an API response and deserialize JSON
///
/// Checks the status code and returns an appropriate error if the request
/// failed, or deserializes the response body if successful.
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response whose body is not needed
///
/// Only the status code is checked.
pub(crate) async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(())
}

/// Strip trailing slashes so paths can be appended with `/`
pub(crate) fn normalize_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}
