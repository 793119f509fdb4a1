//! # LlamaLink Core
//!
//! Shared foundation for the LlamaLink workspace: the error type and the
//! TOML configuration system.

pub mod config;
pub mod error;

pub use config::{EngineConfig, LlamaLinkConfig};
pub use error::{LlamaLinkError, Result};
