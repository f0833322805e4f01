//! redbridge-core: Core traits and types for the redbridge library
//!
//! This crate provides the identities, configuration, error type and
//! coder traits shared by the storage drivers and the facades.

mod config;
mod error;
mod identity;
mod traits;
mod types;

pub use config::{PoolOptions, RedisConfiguration, DEFAULT_PORT, URL_SCHEME};
pub use error::{Error, Result};
pub use identity::BackendId;
pub use traits::*;
pub use types::*;
