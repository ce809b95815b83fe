// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`] declares the raw (as-deserialised) and checked config types.
//! - [`loader`] reads TOML from disk.
//! - [`validate`] turns a `RawConfigFile` into a checked [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_or_default};
pub use model::{
    AuthSection, ConfigFile, DirsSection, LimitsSection, RawConfigFile, StoreSection,
};
