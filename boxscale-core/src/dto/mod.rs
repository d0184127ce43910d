//! Data Transfer Objects for the collaborator APIs
//!
//! DTOs mirror the JSON documents of the CI master and the compute plane.
//! They are converted into domain types at the client boundary.

pub mod compute;
pub mod jenkins;
