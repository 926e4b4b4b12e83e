//! Ordo Common - shared building blocks
//!
//! This crate provides:
//! - Path validation and manipulation for hierarchical node names
//! - Lock configuration loading
//! - Logging initialisation

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::LockConfig;
pub use error::PathError;
pub use logging::{LoggingConfig, init_logging};
