//! Boxscale Core
//!
//! Core types for the Boxscale build box autoscaler.
//!
//! This crate contains:
//! - Domain types: Build nodes, power states, the pool and the capacity rule
//! - DTOs: Wire shapes of the CI master and compute plane APIs

pub mod domain;
pub mod dto;
