//! Idempotency records for dataset rehydration.
//!
//! One record per dataset version serializes concurrent requests. Every
//! state transition is a single-key conditional write:
//!
//! ```text
//! absent ──save_in_progress──► IN_PROGRESS ──update_record──► COMPLETED
//!                                   │                            │
//!                              delete_record              expire_by_index
//!                                   ▼                            ▼
//!                                absent ◄────delete_record──── EXPIRED
//! ```
//!
//! This crate provides:
//! - `IdempotencyStore` trait with in-memory and DynamoDB backends
//! - `TrackingStore` for the optional per-attempt audit table
//! - Fixed-precision timestamp encoding shared by both tables

mod backend;
mod conditions;
pub mod dynamodb;
mod error;
mod memory;
mod record;
pub mod timestamp;
mod tracking;

pub use backend::IdempotencyStore;
pub use dynamodb::{DynamoDbConfig, DynamoDbIdempotencyStore, DynamoDbTrackingStore};
pub use error::{FieldMismatch, IdempotencyError};
pub use memory::MemoryIdempotencyStore;
pub use record::{ExpirationProjection, IdempotencyRecord, RecordStatus};
pub use timestamp::{format_timestamp, parse_timestamp};
pub use tracking::{MemoryTrackingStore, TrackingRecord, TrackingStatus, TrackingStore};
