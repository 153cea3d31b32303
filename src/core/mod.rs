//! Core functionality module
//!
//! Shared building blocks used by every other module: configuration,
//! the error taxonomy, and checksum normalization.
//!
//! # Submodules
//!
//! - `checksum` - Checksum normalization and validation
//! - `config` - Configuration loading, saving, and management
//! - `error` - Error types and result aliases

pub mod checksum;
pub mod config;
pub mod error;
