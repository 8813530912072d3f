//! Shared types and utilities for dataset rehydration.
//!
//! This crate provides common functionality used across all rehydration crates:
//! - Dataset version identity and request types
//! - Destination key layout and rehydration location parsing
//! - Copy-source key escaping
//! - Shared constants and error types

pub mod constants;
pub mod dataset;
pub mod error;
pub mod layout;
pub mod path_utils;

// Re-export commonly used items at crate root
pub use constants::*;
pub use dataset::{DatasetVersion, RehydrationRequest, User};
pub use error::{LocationError, ValidationError};
pub use layout::{DestinationLayout, RehydrationLocation};
pub use path_utils::{ensure_trailing_slash, escape_copy_source_key, join_key};
