//! Affect Shared Library
//!
//! Types exchanged between the upstream feature provider and the
//! cross-domain training pipeline.
//!
//! This library provides:
//! - Validated, immutable labeled feature matrices
//! - Class distribution bookkeeping
//! - The `FeatureSource` provider trait and `DomainPair`
//! - Column mapping and median binarisation for raw feature tables

pub mod dimension;
pub mod mapping;
pub mod matrix;
pub mod source;

// Re-export commonly used types
pub use dimension::TargetDimension;
pub use mapping::{binarize_by_median, build_domain_pair, FeatureMapping, RawTable};
pub use matrix::{ClassDistribution, FeatureMatrix, MatrixError};
pub use source::{DomainPair, FeatureSource, SourceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
