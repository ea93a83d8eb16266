//! # quarry-vault
//!
//! Durable state for Quarry: the record document and the directory of
//! stored data files.
//!
//! The record document is the single source of truth for projects. Every
//! mutation reads the whole document, edits it in memory and writes it back;
//! there is no partial-update API and no cache in front of it. The file vault
//! owns copying data files in and removing them, and never fails a caller
//! because a file it meant to delete is already gone.

pub mod files;
pub mod store;

pub use files::{FileSource, FileVault, RemovalOutcome, ResolvedSource, SourceOrigin};
pub use store::RecordStore;
