//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces that the sync engine depends on, but whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ICloudDrive`] - Folder listings and destination folder setup
//! - [`IFileTransfer`] - Copying a single file between accounts

pub mod cloud_drive;
pub mod file_transfer;

pub use cloud_drive::ICloudDrive;
pub use file_transfer::{IFileTransfer, UploadOutcome};
