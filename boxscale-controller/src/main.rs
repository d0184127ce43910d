//! Boxscale Controller
//!
//! Elastic capacity for a fixed pool of CI build boxes.
//!
//! Architecture:
//! - Configuration: Command line flags with environment fallbacks
//! - Repositories: CI master and compute plane access (queries, commands)
//! - Services: Per-node transitions (status waits, agent launches,
//!   bring-online / take-offline)
//! - Scheduler: The poll loop and the scale-up / scale-down policies
//!
//! Every cycle the controller counts buildable queue entries. A non-empty
//! queue starts enough offline boxes to serve it; an empty queue drains and
//! stops every idle box. All state is re-read from the live services each
//! cycle.

mod config;
mod repository;
mod scheduler;
mod service;

use anyhow::{Context, Result};
use boxscale_client::{
    CachedTokenSource, ComputeEngineClient, JenkinsClient, MetadataServer, ServiceAccount,
    TokenSource,
};
use boxscale_core::domain::capacity::WorkersPerBox;
use boxscale_core::domain::pool::Pool;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, CredentialStrategy, DEFAULT_POOL, Timings};
use crate::repository::{HttpComputeClient, HttpNodeCommandClient, HttpNodeInfoClient};
use crate::scheduler::FleetController;
use crate::service::NodeOrchestrator;

#[derive(Parser)]
#[command(name = "boxscale")]
#[command(about = "Starts and stops CI build boxes to follow the build queue", long_about = None)]
struct Cli {
    /// CI master base URL
    #[arg(long, env = "BOXSCALE_JENKINS_URL")]
    jenkins_url: String,

    /// Value of the Authorization header sent to the CI master
    #[arg(long, env = "BOXSCALE_JENKINS_AUTH", hide_env_values = true)]
    jenkins_auth: String,

    /// Suffix appended to a box identifier to form its CI computer name
    #[arg(long, env = "BOXSCALE_NODE_NAME_SUFFIX", default_value = "")]
    node_name_suffix: String,

    /// Number of workers per build box
    #[arg(long, env = "BOXSCALE_WORKERS_PER_BUILD_BOX", default_value_t = 2)]
    workers_per_build_box: u32,

    /// Use a local service-account key instead of the metadata server
    #[arg(long)]
    use_local_creds: bool,

    /// Service-account key file used with --use-local-creds
    #[arg(long, env = "BOXSCALE_CREDS_FILE", default_value = "creds.json")]
    creds_file: PathBuf,

    /// Project owning the build boxes
    #[arg(long, env = "BOXSCALE_GCE_PROJECT")]
    gce_project: String,

    /// Zone the build boxes run in
    #[arg(long, env = "BOXSCALE_GCE_ZONE", default_value = "europe-west1-b")]
    gce_zone: String,

    /// Compute API root
    #[arg(long, env = "BOXSCALE_COMPUTE_API_URL", default_value = boxscale_client::COMPUTE_API_URL)]
    compute_api_url: String,

    /// Seconds between poll cycles
    #[arg(long, env = "BOXSCALE_POLL_INTERVAL", default_value_t = 8)]
    poll_interval: u64,

    /// Seconds to wait after a box reports RUNNING
    #[arg(long, env = "BOXSCALE_SETTLE_DELAY", default_value_t = 20)]
    settle_delay: u64,

    /// Seconds to wait for an agent to connect
    #[arg(long, env = "BOXSCALE_AGENT_TIMEOUT", default_value_t = 120)]
    agent_timeout: u64,

    /// Seconds to wait for a box to reach a power state
    #[arg(long, env = "BOXSCALE_STATUS_MAX_WAIT", default_value_t = 600)]
    status_max_wait: u64,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Build box identifiers (defaults to build1-api .. build7-api)
    pool: Vec<String>,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let pool = if self.pool.is_empty() {
            Pool::new(DEFAULT_POOL)
        } else {
            Pool::new(self.pool)
        }
        .context("Invalid build box pool")?;

        let credentials = if self.use_local_creds {
            CredentialStrategy::File(self.creds_file)
        } else {
            CredentialStrategy::Metadata
        };

        let timings = Timings {
            poll_interval: Duration::from_secs(self.poll_interval),
            settle_delay: Duration::from_secs(self.settle_delay),
            agent_launch_timeout: Duration::from_secs(self.agent_timeout),
            status_max_wait: Duration::from_secs(self.status_max_wait),
            ..Timings::default()
        };

        let config = Config {
            jenkins_url: self.jenkins_url,
            jenkins_auth: self.jenkins_auth,
            node_name_suffix: self.node_name_suffix,
            compute_api_url: self.compute_api_url,
            project: self.gce_project,
            zone: self.gce_zone,
            credentials,
            workers_per_box: WorkersPerBox::new(self.workers_per_build_box)?,
            pool,
            timings,
            once: self.once,
        };

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxscale=info,boxscale_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Boxscale controller");

    let config = Cli::parse().into_config().inspect_err(|e| {
        error!("Invalid configuration: {:#}", e);
    })?;
    info!(
        "Loaded configuration: jenkins_url={}, project={}, zone={}, workers_per_box={}, pool={}",
        config.jenkins_url,
        config.project,
        config.zone,
        config.workers_per_box.get(),
        config.pool.members().join(",")
    );

    let http = reqwest::Client::builder()
        .timeout(config.timings.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    // Credential acquisition is the only fatal step
    let tokens = acquire_credentials(&config.credentials, http.clone())
        .await
        .inspect_err(|e| error!("Error getting creds: {:#}", e))?;
    info!("Compute credentials acquired");

    let jenkins = Arc::new(
        JenkinsClient::with_client(&config.jenkins_url, &config.jenkins_auth, http.clone())
            .with_node_name_suffix(&config.node_name_suffix),
    );
    let compute = Arc::new(ComputeEngineClient::with_client(
        &config.compute_api_url,
        &config.project,
        &config.zone,
        tokens,
        http,
    ));

    // Initialize repositories
    let info_client = Arc::new(HttpNodeInfoClient::new(Arc::clone(&jenkins)));
    let command_client = Arc::new(HttpNodeCommandClient::new(jenkins));
    let compute_client = Arc::new(HttpComputeClient::new(compute));

    let orchestrator = Arc::new(NodeOrchestrator::new(
        info_client.clone(),
        command_client,
        compute_client,
        &config.timings,
    ));

    let mut controller = FleetController::new(
        info_client,
        Arc::clone(&orchestrator),
        config.pool.clone(),
        config.workers_per_box,
        config.timings.poll_interval,
    );

    if config.once {
        let report = controller.run_cycle().await;
        info!("Cycle finished: {}", report);
        for node_id in config.pool.members() {
            info!("{}", orchestrator.snapshot(node_id).await);
        }
        return Ok(());
    }

    controller.run().await;
    Ok(())
}

/// Builds the configured token source and checks that it yields a token
async fn acquire_credentials(
    strategy: &CredentialStrategy,
    http: reqwest::Client,
) -> Result<Arc<dyn TokenSource>> {
    let tokens: Arc<dyn TokenSource> = match strategy {
        CredentialStrategy::File(path) => {
            let account = ServiceAccount::load(path, http)
                .await
                .context("Failed to load service account key")?;
            info!("Using service account {}", account.client_email());
            Arc::new(CachedTokenSource::new(account))
        }
        CredentialStrategy::Metadata => Arc::new(CachedTokenSource::new(MetadataServer::new(http))),
    };

    tokens
        .authorization()
        .await
        .context("Failed to acquire compute credentials")?;

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config> {
        let mut argv = vec!["boxscale"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv)?.into_config()
    }

    const REQUIRED: [&str; 6] = [
        "--jenkins-url",
        "http://jenkins.local",
        "--jenkins-auth",
        "Basic abc=",
        "--gce-project",
        "ci-project",
    ];

    #[test]
    fn test_defaults_use_default_pool_and_metadata() {
        let config = parse(&REQUIRED).unwrap();
        assert_eq!(config.pool.len(), DEFAULT_POOL.len());
        assert_eq!(config.credentials, CredentialStrategy::Metadata);
        assert_eq!(config.workers_per_box.get(), 2);
        assert_eq!(config.timings, Timings::default());
        assert!(!config.once);
    }

    #[test]
    fn test_positional_pool_and_local_creds() {
        let mut args = REQUIRED.to_vec();
        args.extend([
            "--use-local-creds",
            "--workers-per-build-box",
            "4",
            "build1-api",
            "build9-api",
        ]);
        let config = parse(&args).unwrap();

        assert_eq!(config.pool.members(), &["build1-api", "build9-api"]);
        assert_eq!(
            config.credentials,
            CredentialStrategy::File(PathBuf::from("creds.json"))
        );
        assert_eq!(config.workers_per_box.get(), 4);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--workers-per-build-box", "0"]);
        assert!(parse(&args).is_err());
    }

    #[test]
    fn test_invalid_jenkins_url_rejected() {
        let args = [
            "--jenkins-url",
            "jenkins.local",
            "--jenkins-auth",
            "x",
            "--gce-project",
            "p",
        ];
        assert!(parse(&args).is_err());
    }

    #[tokio::test]
    async fn test_missing_credentials_file_is_fatal() {
        let strategy = CredentialStrategy::File(PathBuf::from("/nonexistent/creds.json"));
        let result = acquire_credentials(&strategy, reqwest::Client::new()).await;
        assert!(result.is_err());
    }
}
