//! Registry Compiler - catalog headers in, static firmware configuration out
//!
//! The firmware describes its sensors, applications and units as C arrays of
//! PROGMEM structs (or `X_SENSOR(...)` macro lists) and looks entries up at
//! runtime by a 16-bit DJB2 hash of their name. This crate compiles those
//! headers into typed registries, checks them, and generates what a
//! `USE_STATIC_CONFIG` build needs.
//!
//! # Features
//!
//! - **Header compiler**: struct-literal arrays and macro invocations share one resolver
//! - **Hash verification**: stored `nameHash` literals are recomputed bit-exactly
//! - **Validation passes**: collisions, cross-references, measurement types, pins
//! - **Static config generation**: config block patching, calibration tables, thin libraries
//! - **Config documents**: versioned JSON of the finalized input assignments
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use registry_compiler::compiler::RegistryCompiler;
//! use registry_compiler::config::RegistryConfig;
//! use registry_compiler::validate::validate_registries;
//!
//! let registries = RegistryCompiler::new(RegistryConfig::default())
//!     .load(Path::new("."))
//!     .unwrap();
//! let report = validate_registries(&registries);
//! println!("{}", report);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Registry headers │  sensor_library.h, application_presets.h, units_registry.h
//! └────────┬─────────┘
//!          │ compiler (extract → index → resolve)
//!          ▼
//! ┌──────────────────┐      ┌───────────────────┐
//! │    Registries     │◄─────│  Config document  │  JSON, schema v1
//! └────────┬─────────┘      └───────────────────┘
//!     ┌────┴─────┐
//!     ▼          ▼
//! ┌────────┐ ┌──────────┐
//! │Validate│ │ Codegen  │  config.h block, static_calibrations.h, thin libs
//! └────────┘ └──────────┘
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod codegen;
pub mod compiler;
pub mod config;
pub mod document;
pub mod hash;
pub mod logging;
pub mod registry;
pub mod validate;

/// Version stamped into generated artifacts and documents.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use codegen::{GenerationContext, GenerationReport, Generator, GeneratorError};
pub use compiler::{parse_registry, CompilerError, RegistryCompiler, RegistryLayout};
pub use config::{ConfigError, RegcConfig};
pub use document::{ConfigDocument, DocumentError, InputAssignment, Metadata};
pub use hash::{djb2_16, format_hash};
pub use registry::{
    Application, FieldValue, PinType, Registries, Registry, RegistryEntry, RegistryKind, Sensor,
    Unit,
};
pub use validate::{
    validate_assignments, validate_registries, PassReport, ValidationError, ValidationReport,
    ValidationStatus, ValidationWarning,
};
