//! Simulated allocator backends.
//!
//! Four backend kinds, each over its own [`region::Region`]:
//! - [`heap::GeneralHeap`]: first-fit, in-band headers, void free
//! - [`pool::FixedBlockPool`]: fixed blocks, out-of-band flags, error-code free
//! - [`segfit::SegregatedFit`]: size classes, LIFO bins, error-code free
//! - [`arena::StaticArena`]: bump pointer, free is a no-op

pub mod arena;
pub mod heap;
pub mod pool;
pub mod region;
pub mod segfit;
pub mod size_class;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::probe::AllocatorProbe;

pub use arena::StaticArena;
pub use heap::GeneralHeap;
pub use pool::FixedBlockPool;
pub use segfit::SegregatedFit;

/// Which backend a probe is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "heap")]
    GeneralHeap,
    #[serde(rename = "pool")]
    FixedBlockPool,
    #[serde(rename = "segfit")]
    SegregatedFit,
    #[serde(rename = "arena")]
    StaticArena,
}

impl BackendKind {
    /// Every backend, in catalog order.
    pub const ALL: [Self; 4] = [
        Self::GeneralHeap,
        Self::FixedBlockPool,
        Self::SegregatedFit,
        Self::StaticArena,
    ];

    /// Short name used on the command line and in banners.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GeneralHeap => "heap",
            Self::FixedBlockPool => "pool",
            Self::SegregatedFit => "segfit",
            Self::StaticArena => "arena",
        }
    }

    /// Parse from string (case-insensitive, with aliases).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "heap" | "general" | "general-heap" | "firstfit" | "first-fit" => Some(Self::GeneralHeap),
            "pool" | "block" | "fixed-block" | "memb" => Some(Self::FixedBlockPool),
            "segfit" | "segregated" | "segregated-fit" | "tlsf" => Some(Self::SegregatedFit),
            "arena" | "static" | "bump" | "static-arena" => Some(Self::StaticArena),
            _ => None,
        }
    }

    /// Whether `free` can report an error code.
    #[must_use]
    pub const fn reports_free_errors(self) -> bool {
        matches!(self, Self::FixedBlockPool | Self::SegregatedFit)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizing for every backend kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Fake address the region is mapped at.
    pub base_address: usize,
    pub heap_bytes: usize,
    pub pool_block_size: usize,
    pub pool_block_count: usize,
    pub segfit_bytes: usize,
    pub arena_bytes: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_address: 0x2000_0000,
            heap_bytes: 64 * 1024,
            pool_block_size: 128,
            pool_block_count: 256,
            segfit_bytes: 64 * 1024,
            arena_bytes: 64 * 1024,
        }
    }
}

impl BackendConfig {
    /// Total region size the given kind would manage.
    #[must_use]
    pub fn region_bytes(&self, kind: BackendKind) -> usize {
        match kind {
            BackendKind::GeneralHeap => self.heap_bytes,
            BackendKind::FixedBlockPool => self.pool_block_size.saturating_mul(self.pool_block_count),
            BackendKind::SegregatedFit => self.segfit_bytes,
            BackendKind::StaticArena => self.arena_bytes,
        }
    }
}

/// Build a fresh backend of `kind`, named `name`.
#[must_use]
pub fn build_probe(kind: BackendKind, name: &str, config: &BackendConfig) -> Box<dyn AllocatorProbe> {
    let base = config.base_address;
    match kind {
        BackendKind::GeneralHeap => Box::new(GeneralHeap::new(name, base, config.heap_bytes)),
        BackendKind::FixedBlockPool => Box::new(FixedBlockPool::new(
            name,
            base,
            config.pool_block_size,
            config.pool_block_count,
        )),
        BackendKind::SegregatedFit => Box::new(SegregatedFit::new(name, base, config.segfit_bytes)),
        BackendKind::StaticArena => Box::new(StaticArena::new(name, base, config.arena_bytes)),
    }
}
