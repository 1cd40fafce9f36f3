use super::block::payload_of;
use super::chain::Chain;
use super::diagnostics::{HeapStats, MemoryMap};
use super::error::HeapError;
use super::strategy::Strategy;
use super::utils::align_request;
use super::{SpinLock, HEAP_SIZE};
use core::fmt;

/// Reference to a payload handed out by a [`Heap`]: the byte offset of the
/// payload inside the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ptr(usize);

impl Ptr {
    /// Offset 0 always holds a header, so it never names a payload.
    pub const NULL: Ptr = Ptr(0);

    pub const fn from_offset(offset: usize) -> Self {
        Ptr(offset)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#07x}", self.0)
    }
}

/// A heap simulated on top of one fixed `N`-byte arena.
///
/// Every operation takes the heap's single lock for its whole duration,
/// so operations from concurrent threads appear in one total order.
pub struct Heap<const N: usize = HEAP_SIZE> {
    inner: SpinLock<Chain<N>>,
}

impl<const N: usize> Heap<N> {
    pub const fn new() -> Self {
        Self::with_strategy(Strategy::FirstFit)
    }

    pub const fn with_strategy(strategy: Strategy) -> Self {
        Self {
            inner: SpinLock::new(Chain::new(strategy)),
        }
    }

    /// Sets up the arena as a single free block. Later calls do nothing.
    pub fn init(&self) {
        if self.inner.lock().init() {
            log::debug!("heap: initialized {} byte arena", N);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_initialized()
    }

    /// Changes the strategy used by subsequent allocations.
    pub fn set_strategy(&self, strategy: Strategy) {
        self.inner.lock().set_strategy(strategy);
    }

    pub fn strategy(&self) -> Strategy {
        self.inner.lock().strategy()
    }

    /// Allocates at least `size` bytes, rounded up to the alignment unit.
    ///
    /// A zero-sized request returns [`Ptr::NULL`]. The arena is initialized
    /// on first use.
    pub fn allocate(&self, size: usize) -> Result<Ptr, HeapError> {
        if size == 0 {
            return Ok(Ptr::NULL);
        }

        let mut chain = self.inner.lock();
        if chain.init() {
            log::debug!("heap: initialized {} byte arena", N);
        }

        let block = if size <= N {
            chain.allocate(align_request(size))
        } else {
            None
        };

        match block {
            Some(block) => {
                let ptr = Ptr(payload_of(block));
                log::trace!("allocate({}) -> {}", size, ptr);
                Ok(ptr)
            }
            None => {
                log::debug!("allocate({}) -> out of memory", size);
                Err(HeapError::OutOfMemory { requested: size })
            }
        }
    }

    /// Returns a block to the heap. Releasing [`Ptr::NULL`] does nothing.
    ///
    /// Invalid references and double releases are reported and leave the
    /// heap untouched.
    pub fn release(&self, ptr: Ptr) -> Result<(), HeapError> {
        if ptr.is_null() {
            return Ok(());
        }

        let mut chain = self.inner.lock();

        let block = chain.locate(ptr.offset()).map_err(|err| report("release", err))?;
        if chain.header(block).free {
            return Err(report(
                "release",
                HeapError::DoubleRelease {
                    offset: ptr.offset(),
                },
            ));
        }

        let merged = chain.release(block);
        log::trace!(
            "release({}) -> free block at {:#x} holds {} bytes",
            ptr,
            merged,
            chain.header(merged).size
        );

        Ok(())
    }

    /// Changes the size of an allocation.
    ///
    /// A null `ptr` allocates, a zero `size` releases and returns
    /// [`Ptr::NULL`]. Shrinking, or growing into a free successor, keeps the
    /// reference; otherwise the contents move to a new block. On failure the
    /// original allocation is left as it was.
    pub fn resize(&self, ptr: Ptr, size: usize) -> Result<Ptr, HeapError> {
        if ptr.is_null() {
            return self.allocate(size);
        }
        if size == 0 {
            return self.release(ptr).map(|()| Ptr::NULL);
        }

        let mut chain = self.inner.lock();
        let block = locate_used(&chain, ptr).map_err(|err| report("resize", err))?;

        let resized = if size <= N {
            chain.resize(block, align_request(size))
        } else {
            None
        };

        match resized {
            Some(moved) => {
                let new_ptr = Ptr(payload_of(moved));
                log::trace!("resize({}, {}) -> {}", ptr, size, new_ptr);
                Ok(new_ptr)
            }
            None => {
                log::debug!("resize({}, {}) -> out of memory", ptr, size);
                Err(HeapError::OutOfMemory { requested: size })
            }
        }
    }

    /// Payload capacity of an allocation, which may exceed what was asked for.
    pub fn usable_size(&self, ptr: Ptr) -> Result<usize, HeapError> {
        let chain = self.inner.lock();
        let block = locate_used(&chain, ptr).map_err(|err| report("usable_size", err))?;

        Ok(chain.header(block).size)
    }

    /// Copies `data` to the start of an allocation.
    pub fn write(&self, ptr: Ptr, data: &[u8]) -> Result<(), HeapError> {
        let mut chain = self.inner.lock();
        let block = locate_used(&chain, ptr).map_err(|err| report("write", err))?;

        chain.payload_mut(block, data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Copies the first `len` bytes of an allocation out of the arena.
    pub fn read(&self, ptr: Ptr, len: usize) -> Result<Vec<u8>, HeapError> {
        let chain = self.inner.lock();
        let block = locate_used(&chain, ptr).map_err(|err| report("read", err))?;

        Ok(chain.payload(block, len)?.to_vec())
    }

    /// Snapshot of every block in address order.
    pub fn dump_map(&self) -> Result<MemoryMap, HeapError> {
        MemoryMap::capture(&self.inner.lock())
    }

    /// Snapshot of aggregate usage.
    pub fn dump_stats(&self) -> Result<HeapStats, HeapError> {
        HeapStats::capture(&self.inner.lock())
    }

    /// Verifies every chain invariant, see [`HeapError::Corrupted`].
    pub fn check_integrity(&self) -> Result<(), HeapError> {
        self.inner.lock().check()
    }

    #[cfg(test)]
    fn chain(&self) -> crate::spin_lock::Guard<'_, Chain<N>> {
        self.inner.lock()
    }
}

impl<const N: usize> Default for Heap<N> {
    fn default() -> Self {
        Self::new()
    }
}

// resize and payload access only make sense on live allocations
fn locate_used<const N: usize>(chain: &Chain<N>, ptr: Ptr) -> Result<usize, HeapError> {
    let not_allocated = HeapError::InvalidReference {
        offset: ptr.offset(),
        cause: "block is not allocated",
    };

    match chain.locate(ptr.offset()) {
        Ok(block) if chain.header(block).free => Err(not_allocated),
        Ok(block) => Ok(block),
        Err(HeapError::DoubleRelease { .. }) => Err(not_allocated),
        Err(err) => Err(err),
    }
}

fn report(op: &str, err: HeapError) -> HeapError {
    log::warn!("{}: {}", op, err);
    err
}
