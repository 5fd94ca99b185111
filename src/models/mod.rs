//! Request and Response models for the operational API
//!
//! DTOs (Data Transfer Objects) serialized to and from HTTP bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::EntriesQuery;
pub use responses::{
    CleanupResponse, ClearResponse, DeleteResponse, EntriesResponse, HealthResponse,
    StatsResponse,
};
