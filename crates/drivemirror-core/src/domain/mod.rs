//! Domain entities
//!
//! This module contains the core domain types for DriveMirror:
//! - Newtypes for validated remote paths
//! - Remote items (files and folders) as listed by a provider
//! - Upload jobs handed from the orchestrator to the worker pool
//! - Domain-specific error types

pub mod errors;
pub mod item;
pub mod job;
pub mod newtypes;

// Re-export commonly used types
pub use errors::DomainError;
pub use item::{FileHashes, HashComparison, RemoteFile, RemoteFolder, RemoteItem};
pub use job::SyncJob;
pub use newtypes::RemotePath;
