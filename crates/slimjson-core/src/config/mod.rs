//! Configuration for documents, arenas and string pools

pub mod limits;

use crate::error::{Error, Result};
use limits::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LOAD_FACTOR, MAX_CHUNK_SIZE};

/// Arena (pool allocator) behavior
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArenaConfig {
    /// Bytes per chunk; requests above this become fallback blocks.
    /// Zero disables chunking entirely.
    pub chunk_size: u32,
    /// Coalesce adjacent dead cells before creating a new chunk
    pub pack_dead_cells: bool,
    /// Run the free-list sanity pass after every deallocation
    pub verify: bool,
}

/// String pool behavior
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InternConfig {
    /// Chunk size of the pool's own arena
    pub chunk_size: u32,
    /// Maximum average chain length before the table grows
    pub max_load_factor: f32,
    /// Buckets allocated up front; zero defers allocation to the first insert
    pub initial_bucket_count: u32,
}

/// Document-level configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Object storage arena
    pub arena: ArenaConfig,
    /// String pool, used when the document creates its own pool
    pub strings: InternConfig,
    /// Int arrays promote to double arrays instead of demoting to generic
    pub int_to_double: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pack_dead_cells: false,
            verify: false,
        }
    }
}

impl Default for InternConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            initial_bucket_count: 0,
        }
    }
}

impl ArenaConfig {
    /// Create configuration with a specific chunk size
    pub fn with_chunk_size(chunk_size: u32) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::config(format!(
                "chunk size {} exceeds maximum {}",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        Ok(())
    }
}

impl InternConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::config(format!(
                "string chunk size {} exceeds maximum {}",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if self.max_load_factor.is_nan() || self.max_load_factor <= 0.0 {
            return Err(Error::config(format!(
                "max load factor must be positive, got {}",
                self.max_load_factor
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Create configuration for low-memory environments
    pub fn low_memory() -> Self {
        Self {
            arena: ArenaConfig {
                chunk_size: 4096,
                pack_dead_cells: true,
                verify: false,
            },
            strings: InternConfig {
                chunk_size: 4096,
                max_load_factor: 3.0,
                initial_bucket_count: 0,
            },
            int_to_double: true,
        }
    }

    /// Create configuration for large documents built in bulk
    pub fn high_throughput() -> Self {
        Self {
            arena: ArenaConfig::with_chunk_size(65_536),
            strings: InternConfig {
                chunk_size: 65_536,
                max_load_factor: 1.0,
                initial_bucket_count: 1024,
            },
            int_to_double: true,
        }
    }

    /// Create configuration for development/testing
    pub fn development() -> Self {
        Self {
            arena: ArenaConfig {
                chunk_size: 512,
                pack_dead_cells: true,
                verify: true,
            },
            strings: InternConfig {
                chunk_size: 512,
                ..InternConfig::default()
            },
            int_to_double: true,
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.arena.validate()?;
        self.strings.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arena: ArenaConfig::default(),
            strings: InternConfig::default(),
            int_to_double: true,
        }
    }
}
