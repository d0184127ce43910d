//! Controller configuration
//!
//! Defines all configurable parameters for the controller: collaborator
//! endpoints, the build box pool, the capacity rule and every interval used
//! by the poll loop and the per-node transitions.

use boxscale_core::domain::capacity::WorkersPerBox;
use boxscale_core::domain::pool::Pool;
use std::path::PathBuf;
use std::time::Duration;

/// Pool used when none is given on the command line
pub const DEFAULT_POOL: [&str; 7] = [
    "build1-api",
    "build2-api",
    "build3-api",
    "build4-api",
    "build5-api",
    "build6-api",
    "build7-api",
];

/// How the compute plane bearer token is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStrategy {
    /// Default credentials from the instance metadata server
    Metadata,
    /// Service-account key file; tokens are minted from it
    File(PathBuf),
}

/// Intervals and limits of the control loop
///
/// Defaults follow the production cadence; tests shrink or pause them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Pause between two poll cycles
    pub poll_interval: Duration,

    /// Wait after an instance reports RUNNING, for the OS and agent to boot
    pub settle_delay: Duration,

    /// Pause between agent connectivity checks / relaunches
    pub agent_retry_interval: Duration,

    /// Give up on an agent launch after this long
    pub agent_launch_timeout: Duration,

    /// Pause between instance status polls
    pub status_poll_interval: Duration,

    /// Give up waiting for an instance power state after this long
    pub status_max_wait: Duration,

    /// Per-request HTTP timeout for both collaborators
    pub http_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(8),
            settle_delay: Duration::from_secs(20),
            agent_retry_interval: Duration::from_secs(10),
            agent_launch_timeout: Duration::from_secs(120),
            status_poll_interval: Duration::from_secs(3),
            status_max_wait: Duration::from_secs(600),
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// CI master base URL (e.g., "http://jenkins.local")
    pub jenkins_url: String,

    /// Opaque `Authorization` header value for the CI master
    pub jenkins_auth: String,

    /// Appended to pool identifiers to form CI computer names
    pub node_name_suffix: String,

    /// Compute plane API root
    pub compute_api_url: String,

    /// Project owning the build boxes
    pub project: String,

    /// Zone the build boxes run in
    pub zone: String,

    pub credentials: CredentialStrategy,

    pub workers_per_box: WorkersPerBox,

    pub pool: Pool,

    pub timings: Timings,

    /// Run a single cycle and exit
    pub once: bool,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [
            ("jenkins_url", &self.jenkins_url),
            ("compute_api_url", &self.compute_api_url),
        ] {
            if url.is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.project.trim().is_empty() {
            anyhow::bail!("project cannot be empty");
        }

        if self.zone.trim().is_empty() {
            anyhow::bail!("zone cannot be empty");
        }

        if let CredentialStrategy::File(path) = &self.credentials {
            if path.as_os_str().is_empty() {
                anyhow::bail!("credentials file path cannot be empty");
            }
        }

        let t = &self.timings;
        for (name, value) in [
            ("poll_interval", t.poll_interval),
            ("agent_retry_interval", t.agent_retry_interval),
            ("agent_launch_timeout", t.agent_launch_timeout),
            ("status_poll_interval", t.status_poll_interval),
            ("status_max_wait", t.status_max_wait),
            ("http_timeout", t.http_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            jenkins_url: "http://localhost:8080".to_string(),
            jenkins_auth: String::new(),
            node_name_suffix: String::new(),
            compute_api_url: boxscale_client::COMPUTE_API_URL.to_string(),
            project: "build-boxes".to_string(),
            zone: "europe-west1-b".to_string(),
            credentials: CredentialStrategy::Metadata,
            workers_per_box: WorkersPerBox::default(),
            pool: Pool::new(DEFAULT_POOL).expect("default pool is valid"),
            timings: Timings::default(),
            once: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timings.poll_interval, Duration::from_secs(8));
        assert_eq!(config.timings.settle_delay, Duration::from_secs(20));
        assert_eq!(config.timings.agent_launch_timeout, Duration::from_secs(120));
        assert_eq!(config.workers_per_box.get(), 2);
        assert_eq!(config.pool.len(), 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Invalid URL should fail
        config.jenkins_url = "jenkins.local".to_string();
        assert!(config.validate().is_err());

        config.jenkins_url = "https://jenkins.local".to_string();
        assert!(config.validate().is_ok());

        config.zone = " ".to_string();
        assert!(config.validate().is_err());
        config.zone = "us-central1-a".to_string();

        config.credentials = CredentialStrategy::File(PathBuf::new());
        assert!(config.validate().is_err());
        config.credentials = CredentialStrategy::File(PathBuf::from("creds.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.timings.status_max_wait = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_settle_delay_allowed() {
        let mut config = Config::default();
        config.timings.settle_delay = Duration::ZERO;
        assert!(config.validate().is_ok());
    }
}
