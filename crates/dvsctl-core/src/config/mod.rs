//! Configuration and profile management for dvsctl
//!
// Allow nested config module - this is intentional for the config subsystem

#![allow(clippy::module_inception)]
//!
//! - Multiple named vCenter profiles
//! - Passwords in plaintext, environment references, or the OS keyring
//!   (`secure-storage` feature)
//! - Environment variable expansion in config files
//! - Platform-specific config file locations

pub mod config;
pub mod credential;
pub mod error;

pub use config::{Config, Profile};
pub use credential::{CredentialStorage, CredentialStore};
pub use error::{ConfigError, Result};
