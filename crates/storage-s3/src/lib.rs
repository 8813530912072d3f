//! AWS SDK S3 backend for the rehydration object store adapter.
//!
//! This crate provides a `StorageClient` implementation using the AWS SDK for Rust.
//! Every copy is server-side (`CopyObject` / `UploadPartCopy`), so object data
//! never passes through the worker.
//!
//! # Example
//!
//! ```ignore
//! use rehydration_storage::{CopyEngine, ObjectCopier, StorageSettings};
//! use rehydration_storage_s3::S3StorageClient;
//!
//! let client = S3StorageClient::new(StorageSettings::default()).await?;
//! let copier = ObjectCopier::new(&client);
//! let results = CopyEngine::new(&copier).run(units, &cancel).await;
//! ```

mod client;
mod error;

pub use client::S3StorageClient;
pub use error::S3Error;
