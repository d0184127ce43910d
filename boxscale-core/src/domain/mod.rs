//! Core domain types
//!
//! These types describe the controller's view of the fleet. None of them
//! outlive a poll cycle; they are rebuilt from live queries every time.

pub mod capacity;
pub mod node;
pub mod pool;
