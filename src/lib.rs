//! Voiceprint Catalog Library
//!
//! An audio-track catalog with acoustic-signature-based artist
//! identification. This library exposes the internal modules for testing
//! and potential reuse.

pub mod catalog;
pub mod config;
pub mod media;
pub mod profiles;
pub mod service;
pub mod signature;
pub mod store;
pub mod training;

// Re-export commonly used types for convenience
pub use catalog::{Track, TrackMeta, NO_ALBUM, PLACEHOLDER_COVER, UNKNOWN_ARTIST};
pub use config::{AppConfig, CliConfig, EngineSettings, FileConfig};
pub use service::{CatalogError, CatalogService};
pub use signature::{Signature, SignatureProvider, SignatureScheme};
pub use store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
