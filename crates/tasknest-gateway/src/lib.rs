//! # TaskNest Gateway
//!
//! The HTTP surface over the scheduling core: authenticated task routes
//! (the trigger source for reminder and recurrence hooks), a live
//! per-owner notification stream with heartbeats, the health/status
//! surface, and the internal callback endpoint the external job service
//! fires into.

pub mod routes;
pub mod server;
pub mod stream;

pub use server::{AppState, OwnerId, build_router, start};
pub use stream::StreamHub;
