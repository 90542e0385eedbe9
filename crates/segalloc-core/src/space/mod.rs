//! Extent allocation.
//!
//! Segregated free lists over a logical address range:
//! - Requests covered by a stride are served from size-class regions
//! - Regions refill one page at a time from the global free pool
//! - Larger requests are carved from the pool directly, best fit

pub mod allocator;
pub mod chunk;
pub mod ordered;
pub mod pool;
pub mod region;

pub use allocator::{Allocator, DefragSummary};
pub use chunk::{Chain, Chunk};
pub use pool::FreePool;
pub use region::Region;
