//! Scheduler layer
//!
//! This layer owns the poll loop: it reads the queue every cycle, applies
//! the scale-up or scale-down policy over the pool and fans per-node work
//! out to the orchestrator.

mod controller;

pub use controller::FleetController;
