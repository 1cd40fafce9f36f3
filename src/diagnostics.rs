//! Read-only views of the block chain.
//!
//! Both snapshots are taken under the heap lock and own their data, so they
//! can be inspected or printed after the lock is released.

use super::chain::Chain;
use super::error::HeapError;
use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockState {
    Free,
    Used,
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockState::Free => f.write_str("FREE"),
            BlockState::Used => f.write_str("USED"),
        }
    }
}

/// One row of a [`MemoryMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Position in address order, starting at 0.
    pub index: usize,
    /// Offset of the block header in the arena.
    pub offset: usize,
    /// Payload capacity in bytes.
    pub size: usize,
    pub state: BlockState,
}

/// Every block of the chain in address order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryMap {
    pub blocks: Vec<BlockInfo>,
}

impl MemoryMap {
    pub(crate) fn capture<const N: usize>(chain: &Chain<N>) -> Result<Self, HeapError> {
        if !chain.is_initialized() {
            return Err(HeapError::NotInitialized);
        }

        let blocks = chain
            .blocks()
            .enumerate()
            .map(|(index, (offset, header))| BlockInfo {
                index,
                offset,
                size: header.size,
                state: if header.free {
                    BlockState::Free
                } else {
                    BlockState::Used
                },
            })
            .collect();

        Ok(Self { blocks })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockInfo> {
        self.blocks.iter()
    }
}

impl fmt::Display for MemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---------- Memory Map ----------")?;
        for block in &self.blocks {
            writeln!(
                f,
                "Block {:2} | offset={:#07x} | size={:6} | {}",
                block.index, block.offset, block.size, block.state
            )?;
        }
        write!(f, "--------------------------------")
    }
}

/// Aggregate usage of the arena. Byte counts cover payloads only; headers
/// make up the difference to `total_bytes`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub used_blocks: usize,
    pub free_bytes: usize,
    pub free_blocks: usize,
    pub largest_free_block: usize,
}

impl HeapStats {
    pub(crate) fn capture<const N: usize>(chain: &Chain<N>) -> Result<Self, HeapError> {
        if !chain.is_initialized() {
            return Err(HeapError::NotInitialized);
        }

        let mut stats = HeapStats {
            total_bytes: N,
            ..HeapStats::default()
        };

        for (_, header) in chain.blocks() {
            if header.free {
                stats.free_bytes += header.size;
                stats.free_blocks += 1;
                stats.largest_free_block = stats.largest_free_block.max(header.size);
            } else {
                stats.used_bytes += header.size;
                stats.used_blocks += 1;
            }
        }

        Ok(stats)
    }

    pub fn blocks(&self) -> usize {
        self.used_blocks + self.free_blocks
    }

    /// External fragmentation estimate: every free byte, wherever it sits.
    pub fn fragmentation(&self) -> usize {
        self.free_bytes
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Allocator Stats:")?;
        writeln!(f, "Total heap: {} bytes", self.total_bytes)?;
        writeln!(
            f,
            "Used     : {} bytes in {} block(s)",
            self.used_bytes, self.used_blocks
        )?;
        writeln!(
            f,
            "Free     : {} bytes in {} block(s), largest {} bytes",
            self.free_bytes, self.free_blocks, self.largest_free_block
        )?;
        write!(
            f,
            "External fragmentation estimate: {} bytes",
            self.fragmentation()
        )
    }
}
