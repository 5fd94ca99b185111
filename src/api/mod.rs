//! API Module
//!
//! Operational HTTP API over a cache engine.
//!
//! # Endpoints
//! - `GET /entries?prefix=` - List entries, expired ones included
//! - `DELETE /entries?prefix=` - Delete every key under a prefix
//! - `GET /entries/:key` - Describe one entry
//! - `DELETE /entries/:key` - Delete one key
//! - `POST /cleanup` - Delete expired entries now
//! - `GET /stats` - Engine counters
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
