use super::arena::Arena;
use super::block::{block_of, payload_of, Header, HEADER_SIZE};
use super::error::HeapError;
use super::strategy::Strategy;
use super::utils::is_aligned;
use super::ALIGNMENT;

/// The block chain: an address-ordered, doubly linked list of headers
/// stored inside the arena it partitions. Blocks are named by the offset
/// of their header.
///
/// ```text
///   +--------+---------+--------+-------------+--------+-----------+
///   | header | payload | header |   payload   | header |  payload  |
///   +--------+---------+--------+-------------+--------+-----------+
///   ^ head             ^ next                 ^ next               ^ N
/// ```
pub struct Chain<const N: usize> {
    arena: Arena<N>,
    head: Option<usize>,
    strategy: Strategy,
}

impl<const N: usize> Chain<N> {
    const FITS_ONE_BLOCK: () = assert!(
        N >= HEADER_SIZE + ALIGNMENT && N % ALIGNMENT == 0,
        "arena must be aligned and hold at least one header and one alignment unit"
    );

    pub const fn new(strategy: Strategy) -> Self {
        let () = Self::FITS_ONE_BLOCK;

        Self {
            arena: Arena::new(),
            head: None,
            strategy,
        }
    }

    /// Installs a single free block spanning the arena. Returns `false` if
    /// the chain already existed.
    pub fn init(&mut self) -> bool {
        if self.head.is_some() {
            return false;
        }

        let size = self.arena.size() - HEADER_SIZE;
        Header::new(size, true, None, None).write(&mut self.arena, 0);
        self.head = Some(0);

        true
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.head.is_some()
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[inline]
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    #[inline]
    pub fn header(&self, block: usize) -> Header {
        Header::read(&self.arena, block)
    }

    #[inline]
    fn set_header(&mut self, block: usize, header: Header) {
        header.write(&mut self.arena, block);
    }

    pub fn blocks(&self) -> Blocks<'_, N> {
        Blocks {
            arena: &self.arena,
            cursor: self.head,
        }
    }

    /// Finds a free block for an already aligned `size`, splits off any
    /// usable surplus and marks the block used.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        self.init();

        let block = match self.strategy.select(self, size) {
            Some(block) => block,
            None => self.coalescing_search(size)?,
        };

        self.split(block, size);

        let mut header = self.header(block);
        header.free = false;
        self.set_header(block, header);

        Some(block)
    }

    /// Marks a used block free and merges it with free neighbours, the
    /// successor first so the predecessor absorbs the enlarged block.
    /// Returns the block that now holds the freed bytes.
    pub fn release(&mut self, block: usize) -> usize {
        let mut header = self.header(block);
        header.free = true;
        self.set_header(block, header);

        self.coalesce_with_next(block);

        match self.header(block).prev {
            Some(prev) if self.header(prev).free => {
                self.coalesce_with_next(prev);
                prev
            }
            _ => block,
        }
    }

    /// Resizes a used block to an aligned `size`. Shrinks and in-place
    /// growth keep the block; otherwise the payload moves to a new block and
    /// the old one is released. `None` leaves the old block untouched.
    pub fn resize(&mut self, block: usize, size: usize) -> Option<usize> {
        let header = self.header(block);

        if header.size >= size {
            self.split(block, size);
            return Some(block);
        }

        if let Some(next) = header.next {
            let successor = self.header(next);

            if successor.free && header.size + HEADER_SIZE + successor.size >= size {
                self.coalesce_with_next(block);
                self.split(block, size);
                return Some(block);
            }
        }

        let moved = self.allocate(size)?;
        self.arena
            .copy(payload_of(block), payload_of(moved), header.size.min(size));
        self.release(block);

        Some(moved)
    }

    // Second pass for when no single block fits: grow every free block from
    // its free successors and take the first one that becomes large enough.
    fn coalescing_search(&mut self, size: usize) -> Option<usize> {
        let mut cursor = self.head;

        while let Some(block) = cursor {
            if self.header(block).free {
                if let Some(merged) = self.expand_by_coalescing(block, size) {
                    return Some(merged);
                }
            }
            cursor = self.header(block).next;
        }

        None
    }

    fn expand_by_coalescing(&mut self, block: usize, size: usize) -> Option<usize> {
        loop {
            let header = self.header(block);

            if !header.free {
                return None;
            }
            if header.size >= size {
                return Some(block);
            }
            if !self.coalesce_with_next(block) {
                return None;
            }
        }
    }

    /// Cuts `block` down to `size` bytes when the surplus can hold another
    /// header plus one alignment unit. Returns the free remainder.
    fn split(&mut self, block: usize, size: usize) -> Option<usize> {
        let mut header = self.header(block);

        if header.size < size + HEADER_SIZE + ALIGNMENT {
            // not enough space to split meaningfully
            return None;
        }

        let remainder = payload_of(block) + size;
        let rest = Header::new(
            header.size - size - HEADER_SIZE,
            true,
            header.next,
            Some(block),
        );
        self.set_header(remainder, rest);

        if let Some(next) = header.next {
            let mut successor = self.header(next);
            successor.prev = Some(remainder);
            self.set_header(next, successor);
        }

        header.next = Some(remainder);
        header.size = size;
        self.set_header(block, header);

        // a remainder cut from a used block may border a free successor
        self.coalesce_with_next(remainder);

        Some(remainder)
    }

    /// Absorbs the successor of `block` if it is free. The absorbed header
    /// is left in place, still tagged and marked free.
    fn coalesce_with_next(&mut self, block: usize) -> bool {
        let mut header = self.header(block);

        let Some(next) = header.next else {
            return false;
        };

        let absorbed = self.header(next);
        if !absorbed.free {
            return false;
        }

        header.size += HEADER_SIZE + absorbed.size;
        header.next = absorbed.next;

        if let Some(after) = absorbed.next {
            let mut successor = self.header(after);
            successor.prev = Some(block);
            self.set_header(after, successor);
        }

        self.set_header(block, header);

        true
    }

    fn contains(&self, block: usize) -> bool {
        self.blocks()
            .take_while(|(offset, _)| *offset <= block)
            .any(|(offset, _)| offset == block)
    }

    /// Maps a payload offset handed out by the heap back to its block.
    ///
    /// Rejects offsets outside the arena, misaligned offsets and headers
    /// without the integrity tag. A tagged header that is no longer part of
    /// the chain was absorbed into a free neighbour, so presenting it again
    /// is a double release.
    pub fn locate(&self, offset: usize) -> Result<usize, HeapError> {
        let invalid = |cause| HeapError::InvalidReference { offset, cause };

        if !self.is_initialized() {
            return Err(invalid("heap not initialized"));
        }
        if offset < HEADER_SIZE || offset >= N {
            return Err(invalid("pointer out of heap range"));
        }
        if !is_aligned(offset) {
            return Err(invalid("misaligned pointer"));
        }

        let block = block_of(offset);
        let header = self.header(block);

        if !header.is_intact() {
            return Err(invalid("corruption or invalid pointer (integrity tag mismatch)"));
        }

        if !self.contains(block) {
            if header.free {
                return Err(HeapError::DoubleRelease { offset });
            }
            return Err(invalid("header is not part of the block chain"));
        }

        Ok(block)
    }

    pub fn payload(&self, block: usize, len: usize) -> Result<&[u8], HeapError> {
        let start = self.checked_payload(block, len)?;
        Ok(self.arena.bytes(start, len))
    }

    pub fn payload_mut(&mut self, block: usize, len: usize) -> Result<&mut [u8], HeapError> {
        let start = self.checked_payload(block, len)?;
        Ok(self.arena.bytes_mut(start, len))
    }

    fn checked_payload(&self, block: usize, len: usize) -> Result<usize, HeapError> {
        let capacity = self.header(block).size;

        if len > capacity {
            return Err(HeapError::Overflow { len, capacity });
        }
        if !self.arena.contains(payload_of(block), len) {
            return Err(HeapError::Corrupted {
                offset: block,
                cause: "payload runs past the arena",
            });
        }

        Ok(payload_of(block))
    }

    /// Walks the whole chain and verifies that it partitions the arena:
    /// address order without gaps or overlaps, matching back links, intact
    /// tags, aligned sizes and no two free blocks side by side.
    pub fn check(&self) -> Result<(), HeapError> {
        let Some(head) = self.head else {
            return Err(HeapError::NotInitialized);
        };

        let mut expected = 0;
        let mut prev: Option<usize> = None;
        let mut prev_free = false;
        let mut cursor = Some(head);

        while let Some(block) = cursor {
            let corrupted = |cause| HeapError::Corrupted {
                offset: block,
                cause,
            };

            if block != expected {
                return Err(corrupted("gap or overlap between blocks"));
            }
            if !self.arena.contains(block, HEADER_SIZE) {
                return Err(corrupted("header runs past the arena"));
            }

            let header = self.header(block);

            if !header.is_intact() {
                return Err(corrupted("integrity tag mismatch"));
            }
            if header.prev != prev {
                return Err(corrupted("broken back link"));
            }
            if !is_aligned(header.size) {
                return Err(corrupted("unaligned block size"));
            }
            if prev_free && header.free {
                return Err(corrupted("adjacent free blocks"));
            }

            let end = payload_of(block)
                .checked_add(header.size)
                .filter(|end| *end <= N)
                .ok_or(corrupted("payload runs past the arena"))?;

            match header.next {
                Some(next) if next != end => {
                    return Err(corrupted("next block does not start where the payload ends"))
                }
                None if end != N => return Err(corrupted("chain does not cover the arena")),
                _ => {}
            }

            expected = end;
            prev = Some(block);
            prev_free = header.free;
            cursor = header.next;
        }

        Ok(())
    }

    /// Builds a chain from `(size, free)` pairs laid out back to back.
    #[cfg(test)]
    pub(crate) fn with_blocks(layout: &[(usize, bool)]) -> Self {
        let mut chain = Self::new(Strategy::FirstFit);
        let mut block = 0;
        let mut prev = None;

        for (i, &(size, free)) in layout.iter().enumerate() {
            let end = payload_of(block) + size;
            let next = if i + 1 < layout.len() { Some(end) } else { None };

            Header::new(size, free, next, prev).write(&mut chain.arena, block);

            prev = Some(block);
            block = end;
        }

        assert_eq!(block, N, "layout must cover the whole arena");
        chain.head = Some(0);

        chain
    }

    #[cfg(test)]
    pub(crate) fn arena_mut(&mut self) -> &mut Arena<N> {
        &mut self.arena
    }
}

/// Address-ordered walk over the chain. Stops early on a link that does not
/// move forward inside the arena, so a damaged chain cannot loop forever.
pub struct Blocks<'a, const N: usize> {
    arena: &'a Arena<N>,
    cursor: Option<usize>,
}

impl<const N: usize> Iterator for Blocks<'_, N> {
    type Item = (usize, Header);

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.cursor?;
        let header = Header::read(self.arena, block);

        self.cursor = header
            .next
            .filter(|next| *next > block && self.arena.contains(*next, HEADER_SIZE));

        Some((block, header))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn layout<const N: usize>(chain: &Chain<N>) -> Vec<(usize, usize, bool)> {
        chain
            .blocks()
            .map(|(block, header)| (block, header.size, header.free))
            .collect()
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);
        assert!(!chain.is_initialized());

        assert!(chain.init());
        assert!(!chain.init());

        assert_eq!(layout(&chain), vec![(0, 1024 - HEADER_SIZE, true)]);
        assert_eq!(chain.check(), Ok(()));
    }

    #[test]
    fn test_allocate_splits_large_block() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);

        let block = chain.allocate(104).unwrap();

        assert_eq!(block, 0);
        assert_eq!(
            layout(&chain),
            vec![(0, 104, false), (144, 1024 - 144 - HEADER_SIZE, true)]
        );
        assert_eq!(chain.check(), Ok(()));
    }

    #[test]
    fn test_allocate_keeps_small_surplus() {
        // 40 bytes of surplus cannot hold a header plus an alignment unit
        let mut chain: Chain<256> = Chain::with_blocks(&[(96, true), (80, false)]);

        let block = chain.allocate(56).unwrap();

        assert_eq!(block, 0);
        assert_eq!(layout(&chain), vec![(0, 96, false), (136, 80, false)]);
    }

    #[test]
    fn test_allocate_splits_at_exact_threshold() {
        let mut chain: Chain<256> = Chain::with_blocks(&[(96, true), (80, false)]);

        chain.allocate(48).unwrap();

        assert_eq!(
            layout(&chain),
            vec![(0, 48, false), (88, 8, true), (136, 80, false)]
        );
        assert_eq!(chain.check(), Ok(()));
    }

    //
    //   Three free fragments nobody merged yet, none large enough alone.
    //
    //   +----+----+----+--------+
    //   | 16 | 16 | 16 |xxxxxxxx|
    //   +----+----+----+--------+
    //
    #[test]
    fn test_allocate_coalesces_fragments_when_nothing_fits() {
        let mut chain: Chain<256> =
            Chain::with_blocks(&[(16, true), (16, true), (16, true), (48, false)]);

        let block = chain.allocate(80).unwrap();

        assert_eq!(block, 0);
        assert_eq!(
            layout(&chain),
            vec![(0, 80, false), (120, 8, true), (168, 48, false)]
        );
        assert_eq!(chain.check(), Ok(()));
    }

    #[test]
    fn test_allocate_out_of_memory() {
        let mut chain: Chain<256> = Chain::with_blocks(&[(16, true), (8, false), (112, true)]);

        assert_eq!(chain.allocate(120), None);
        // failed searches never touch used blocks
        assert_eq!(
            layout(&chain),
            vec![(0, 16, true), (56, 8, false), (104, 112, true)]
        );
    }

    #[test]
    fn test_release_merges_next_then_prev() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);
        let a = chain.allocate(64).unwrap();
        let b = chain.allocate(64).unwrap();
        let c = chain.allocate(64).unwrap();

        assert_eq!(chain.release(a), a);
        assert_eq!(chain.release(c), c);
        assert_eq!(chain.check(), Ok(()));
        assert_eq!(layout(&chain).len(), 3);

        // b absorbs c's run, then a absorbs b
        assert_eq!(chain.release(b), a);
        assert_eq!(layout(&chain), vec![(0, 1024 - HEADER_SIZE, true)]);
        assert_eq!(chain.check(), Ok(()));
    }

    #[test]
    fn test_resize_shrink_splits_and_merges_remainder() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);
        let a = chain.allocate(256).unwrap();

        assert_eq!(chain.resize(a, 64), Some(a));

        // the cut-off tail joins the free block behind it
        assert_eq!(
            layout(&chain),
            vec![(0, 64, false), (104, 1024 - 104 - HEADER_SIZE, true)]
        );
        assert_eq!(chain.check(), Ok(()));
    }

    #[test]
    fn test_resize_grows_into_free_successor() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);
        let a = chain.allocate(64).unwrap();

        assert_eq!(chain.resize(a, 200), Some(a));
        assert_eq!(chain.header(a).size, 200);
        assert!(!chain.header(a).free);
        assert_eq!(chain.check(), Ok(()));
    }

    #[test]
    fn test_resize_moves_and_copies() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);
        let a = chain.allocate(16).unwrap();
        let b = chain.allocate(16).unwrap();
        chain.payload_mut(a, 16).unwrap().copy_from_slice(&[7; 16]);

        let moved = chain.resize(a, 64).unwrap();

        assert!(moved > b);
        assert_eq!(chain.payload(moved, 16).unwrap(), &[7; 16]);
        assert!(chain.header(a).free);
        assert_eq!(chain.check(), Ok(()));
    }

    #[test]
    fn test_resize_failure_keeps_block() {
        let mut chain: Chain<256> = Chain::with_blocks(&[(16, false), (8, false), (112, true)]);
        chain.payload_mut(0, 16).unwrap().copy_from_slice(&[3; 16]);

        assert_eq!(chain.resize(0, 128), None);

        assert_eq!(chain.header(0).size, 16);
        assert!(!chain.header(0).free);
        assert_eq!(chain.payload(0, 16).unwrap(), &[3; 16]);
    }

    #[test]
    fn test_locate() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);
        assert!(matches!(
            chain.locate(40),
            Err(HeapError::InvalidReference { .. })
        ));

        let a = chain.allocate(64).unwrap();
        assert_eq!(chain.locate(payload_of(a)), Ok(a));

        for bogus in [0, 8, 41, 1024, usize::MAX] {
            assert!(matches!(
                chain.locate(bogus),
                Err(HeapError::InvalidReference { .. })
            ));
        }
        // aligned, in range, but nothing but zeroes behind it
        assert!(matches!(
            chain.locate(payload_of(a) + 16),
            Err(HeapError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_locate_absorbed_block_is_double_release() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);
        let a = chain.allocate(64).unwrap();
        let b = chain.allocate(64).unwrap();
        chain.allocate(64).unwrap();

        chain.release(a);
        chain.release(b);

        assert_eq!(chain.locate(payload_of(a)), Ok(a));
        assert_eq!(
            chain.locate(payload_of(b)),
            Err(HeapError::DoubleRelease {
                offset: payload_of(b)
            })
        );
    }

    #[test]
    fn test_locate_forged_used_header() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);
        let a = chain.allocate(128).unwrap();

        // a tagged, used-looking header written inside a's payload
        let forged = payload_of(a) + 16;
        Header::new(32, false, None, None).write(chain.arena_mut(), forged);

        assert!(matches!(
            chain.locate(payload_of(forged)),
            Err(HeapError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_payload_bounds() {
        let mut chain = Chain::<1024>::new(Strategy::FirstFit);
        let a = chain.allocate(16).unwrap();

        assert_eq!(chain.payload(a, 16).map(<[u8]>::len), Ok(16));
        assert_eq!(
            chain.payload(a, 17),
            Err(HeapError::Overflow {
                len: 17,
                capacity: 16
            })
        );
    }

    #[test]
    fn test_check_detects_damage() {
        let chain = Chain::<256>::new(Strategy::FirstFit);
        assert_eq!(chain.check(), Err(HeapError::NotInitialized));

        let chain: Chain<256> = Chain::with_blocks(&[(16, true), (160, true)]);
        assert!(matches!(
            chain.check(),
            Err(HeapError::Corrupted {
                offset: 56,
                cause: "adjacent free blocks"
            })
        ));

        let mut chain: Chain<256> = Chain::with_blocks(&[(16, false), (160, true)]);
        chain.arena_mut().write_word(56 + 32, 0);
        assert!(matches!(
            chain.check(),
            Err(HeapError::Corrupted { offset: 56, .. })
        ));

        let mut chain: Chain<256> = Chain::with_blocks(&[(16, false), (160, true)]);
        chain.arena_mut().write_word(0, 24);
        assert!(matches!(chain.check(), Err(HeapError::Corrupted { offset: 0, .. })));
    }

    #[test]
    fn test_blocks_stops_on_backward_link() {
        let mut chain: Chain<256> = Chain::with_blocks(&[(16, false), (160, true)]);
        // point the second block back at the head
        chain.arena_mut().write_word(56 + 16, 0);

        assert_eq!(chain.blocks().count(), 2);
    }
}
