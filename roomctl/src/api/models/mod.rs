//! API response data models.
//!
//! Image endpoints answer with raw image bytes or an [`crate::errors::ErrorEnvelope`], so the only
//! structured success body is the wiring description in [`demo_info`].

pub mod demo_info;
