//! Sightline common types, IDs, and errors.
//!
//! This crate provides foundational types shared across sl-core modules:
//! - Identifier type with normalization
//! - Sightings, movement samples, and time windows
//! - Common error types
//! - Output format specifications

pub mod error;
pub mod id;
pub mod output;
pub mod types;

pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use id::Identifier;
pub use output::OutputFormat;
pub use types::{MovementSample, Sighting, TimeWindow};

/// Schema version for emitted analytics payloads.
pub const SCHEMA_VERSION: &str = "1.0.0";
