//! Service layer
//!
//! Services hold the per-node logic of the controller. They combine the
//! repositories into the transitions of a single build box:
//! - `StatusWaiter`: wait for an instance power state
//! - `AgentLauncher`: get a node's CI agent connected, with a timeout
//! - `NodeOrchestrator`: the bring-online and take-offline transitions

mod agent_launcher;
mod orchestrator;
mod status_waiter;

pub use orchestrator::{BringOnlineOutcome, NodeOrchestrator, TakeOfflineOutcome};
