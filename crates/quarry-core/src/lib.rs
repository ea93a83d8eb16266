//! # quarry-core
//!
//! Core types shared by every Quarry crate:
//! - [`Project`]: the persisted record pairing a name with one data file
//! - Error hierarchy ([`QuarryError`], [`UpstreamError`], [`ErrorKind`])
//! - Runtime configuration ([`QuarryConfig`], [`BoundaryPolicy`])
//! - The analysis prompt contract and answer parsing ([`insight`])

pub mod config;
pub mod error;
pub mod insight;
pub mod project;

pub use config::{AnalysisConfig, BoundaryPolicy, QuarryConfig};
pub use error::{ErrorKind, QuarryError, Result, UpstreamError};
pub use insight::{AnalysisType, CsvTable, Insight};
pub use project::Project;
