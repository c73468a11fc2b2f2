//! Prompter core library — domain types, configuration, validation, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and domain structs
//! - [`config`] — [`EngineConfig`] load / save
//! - [`validate`] — [`ValueLimits`] pre-store validation
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;
pub mod validate;

pub use config::EngineConfig;
pub use error::ConfigError;
pub use types::{
    ContentRecord, ContentSnapshot, Field, FieldChange, FieldName, FieldSource, SnapshotOrigin,
    RECORD_VERSION,
};
pub use validate::{ValidationError, ValueLimits};
