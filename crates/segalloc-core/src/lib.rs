//! # segalloc-core
//!
//! A segregated free-list space allocator over an abstract address range.
//!
//! The allocator hands out and reclaims logical `(address, length)` extents
//! and never touches memory itself; callers map the offsets onto their own
//! backing store. No `unsafe` code is permitted at the crate level.

#![deny(unsafe_code)]

pub mod config;
pub mod log;
pub mod shared;
pub mod snapshot;
pub mod space;

pub use config::{AllocatorConfig, ConfigError};
pub use log::{AllocatorLogLevel, AllocatorLogRecord};
pub use shared::SharedAllocator;
pub use snapshot::{AllocatorSnapshot, RegionSnapshot, SnapshotCounters, SnapshotError};
pub use space::{Allocator, Chain, Chunk, DefragSummary, FreePool, Region};
