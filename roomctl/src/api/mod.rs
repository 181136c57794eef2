//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Response data structures
//!
//! # Routes
//!
//! - `GET /api/demo-info`: current wiring and defaults
//! - `POST /api/remove-bg`: background removal through the segment API
//! - `POST /api/advanced-edit`: ghost mannequin or lifestyle staging through the image editing API
//!
//! Everything else falls through to the embedded upload page.

pub mod handlers;
pub mod models;
