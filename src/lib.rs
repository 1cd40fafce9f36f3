//! # heapsim
//!
//! A malloc/free/realloc style heap simulated inside one fixed-size arena.
//!
//! Block headers live in the arena right in front of their payloads and
//! form an address-ordered doubly linked chain that partitions the whole
//! arena. Allocation searches the chain first-fit or best-fit, splits
//! oversized blocks, and release coalesces free neighbours. Every header
//! carries an integrity tag that is checked before a reference is trusted.
//!
//! ```rust
//! use heapsim::{Heap, Strategy};
//!
//! let heap: Heap<4096> = Heap::with_strategy(Strategy::BestFit);
//!
//! let p = heap.allocate(100).unwrap();
//! heap.write(p, b"hello").unwrap();
//! assert_eq!(heap.read(p, 5).unwrap(), b"hello");
//!
//! heap.release(p).unwrap();
//! assert!(heap.release(p).is_err()); // double free is reported, not fatal
//! ```

mod arena;
mod block;
mod chain;
mod diagnostics;
mod error;
mod heap;
mod spin_lock;
mod strategy;
mod utils;

pub use block::HEADER_SIZE;
pub use diagnostics::{BlockInfo, BlockState, HeapStats, MemoryMap};
pub use error::{HeapError, ParseStrategyError};
pub use heap::{Heap, Ptr};
pub use spin_lock::SpinLock;
pub use strategy::Strategy;

/// Capacity of the default arena.
pub const HEAP_SIZE: usize = 64 * 1024;

/// Every payload size is a multiple of this.
pub const ALIGNMENT: usize = 8;
