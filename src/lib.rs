// src/lib.rs
//! Byte buffers for request-processing pipelines.
//!
//! Request bodies, cached form submissions and response payloads all travel
//! as [`DataBuffer`] handles, whether the bytes sit in memory or in a file.
//! The [`cache`], [`body`] and [`response`] modules are the consumers that
//! produce and drain those buffers.

use anyhow::Result;

pub mod body;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod error;
pub mod response;

/// Ties together the cache and the body reader built from one configuration.
pub struct BufferStore {
    config: config::Config,
    cache: cache::FileCache,
    body_reader: body::BodyReader,
}

impl BufferStore {
    /// Create a new store with the provided configuration
    pub fn new(config: config::Config) -> Result<Self> {
        config.validate()?;
        let cache = cache::FileCache::new(&config.cache)?;
        let body_reader = body::BodyReader::new(&config.body);
        Ok(BufferStore {
            config,
            cache,
            body_reader,
        })
    }

    /// Create a new store by loading configuration from a file
    pub fn from_file(config_path: &str) -> Result<Self> {
        let config = config::load_config(config_path)?;
        BufferStore::new(config)
    }

    pub fn config(&self) -> &config::Config {
        &self.config
    }

    pub fn cache(&self) -> &cache::FileCache {
        &self.cache
    }

    pub fn body_reader(&self) -> &body::BodyReader {
        &self.body_reader
    }
}

// Re-export types for easier usage
pub use buffer::{BufferImpl, BufferView, Chunk, DataBuffer, FileBackedBuffer, InMemoryBuffer};
pub use config::{BodyConfig, CacheConfig, Config, LoggingConfig};
pub use error::{BufferError, ErrorCategory};
