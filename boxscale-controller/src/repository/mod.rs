//! Repository layer
//!
//! Repositories are the controller's view of its two collaborators: the CI
//! master and the compute plane. Each trait has an HTTP implementation that
//! delegates to `boxscale-client`, plus an in-memory fake used by tests.
//!
//! Reads come with "or default" helpers that log a failed query and fall back
//! to the safe value, so callers never branch on transient query errors.

mod compute;
#[cfg(test)]
pub mod fake;
mod node_command;
mod node_info;

// Re-export traits
pub use compute::ComputeClient;
pub use node_command::{CommandOutcome, NodeCommandClient};
pub use node_info::NodeInfoClient;

// Re-export implementations
pub use compute::HttpComputeClient;
pub use node_command::HttpNodeCommandClient;
pub use node_info::HttpNodeInfoClient;
