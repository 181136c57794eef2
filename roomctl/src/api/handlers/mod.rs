//! HTTP request handlers.
//!
//! - [`demo_info`]: wiring description for the UI
//! - [`images`]: the two upload endpoints
//! - [`static_assets`]: the embedded upload page
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which renders as an
//! [`crate::errors::ErrorEnvelope`] with the matching status code.

pub mod demo_info;
pub mod images;
pub mod static_assets;
