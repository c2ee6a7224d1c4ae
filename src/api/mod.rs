//! API Module
//!
//! Admin HTTP surface over the cache service.
//!
//! # Endpoints
//! - `GET /health` - Fresh remote health check
//! - `GET /stats` - Service, local and remote statistics
//! - `POST /stats/reset` - Zero service and remote counters
//! - `GET /cache/:key` - Cache-first read
//! - `PUT /cache` - Write through both layers, optionally tagged
//! - `DELETE /cache/:key` - Remove a key from both layers
//! - `POST /invalidate/tags` - Invalidate every key carrying the given tags
//! - `POST /invalidate/pattern` - Invalidate every key matching a glob

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
