//! DriveMirror Core - Domain types, ports and configuration
//!
//! This crate contains the provider-agnostic core with:
//! - **Domain entities** - `RemoteItem`, `SyncJob`, `RemotePath`
//! - **Port definitions** - Traits for adapters: `ICloudDrive`, `IFileTransfer`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//! - **Formatting** - `format_bytes` for status lines
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module has no I/O. Ports define trait interfaces that the
//! Graph adapter crate implements and the sync crate consumes.

pub mod config;
pub mod domain;
pub mod format;
pub mod ports;
