//! API Module
//!
//! HTTP surface over the default registered cache.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `POST /mget` - Retrieve several keys
//! - `PUT /mset` - Store several key-value pairs
//! - `DELETE /clear` - Clear the default cache
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
