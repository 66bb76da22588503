//! Service implementations
//!
//! This module contains real implementations of the seam traits: the HTTP
//! collaborators the pipeline calls out to and the stores it persists into.

pub mod credentials;
pub mod file_store;
pub mod memory_store;
pub mod ncbi_registry;
pub mod openai_filter;
pub mod vision_server;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use credentials::{CredentialProbe, EnvCredentialSource};
pub use file_store::{FileDurableStore, FileRecordStore};
pub use memory_store::{InMemoryDurableStore, InMemoryFastStore, InMemoryRecordStore};
pub use ncbi_registry::NcbiGeneRegistry;
pub use openai_filter::OpenAiRelevanceFilter;
pub use vision_server::HttpVisionBackend;
