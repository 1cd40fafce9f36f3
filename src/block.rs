use super::arena::{Arena, WORD_SIZE};

/// Integrity tag written into every header when the block is created.
pub const BLOCK_MAGIC: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// Bytes taken by a header in front of every payload.
///
/// ```text
///   offset  0        8        16       24       32       40
///           +--------+--------+--------+--------+--------+----------------
///           |  size  |  free  |  next  |  prev  | magic  |  payload ...
///           +--------+--------+--------+--------+--------+----------------
/// ```
pub const HEADER_SIZE: usize = 5 * WORD_SIZE;

const SIZE: usize = 0;
const FREE: usize = WORD_SIZE;
const NEXT: usize = 2 * WORD_SIZE;
const PREV: usize = 3 * WORD_SIZE;
const MAGIC: usize = 4 * WORD_SIZE;

// encodes a missing neighbour
const NIL: u64 = u64::MAX;

/// Decoded copy of an in-arena block header. Neighbours are header offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub size: usize,
    pub free: bool,
    pub next: Option<usize>,
    pub prev: Option<usize>,
    pub magic: u64,
}

impl Header {
    pub const fn new(size: usize, free: bool, next: Option<usize>, prev: Option<usize>) -> Self {
        Self {
            size,
            free,
            next,
            prev,
            magic: BLOCK_MAGIC,
        }
    }

    pub fn read<const N: usize>(arena: &Arena<N>, block: usize) -> Self {
        Self {
            size: arena.read_word(block + SIZE) as usize,
            free: arena.read_word(block + FREE) != 0,
            next: decode_link(arena.read_word(block + NEXT)),
            prev: decode_link(arena.read_word(block + PREV)),
            magic: arena.read_word(block + MAGIC),
        }
    }

    pub fn write<const N: usize>(&self, arena: &mut Arena<N>, block: usize) {
        arena.write_word(block + SIZE, self.size as u64);
        arena.write_word(block + FREE, self.free as u64);
        arena.write_word(block + NEXT, encode_link(self.next));
        arena.write_word(block + PREV, encode_link(self.prev));
        arena.write_word(block + MAGIC, self.magic);
    }

    #[inline]
    pub fn is_intact(&self) -> bool {
        self.magic == BLOCK_MAGIC
    }
}

#[inline]
pub const fn payload_of(block: usize) -> usize {
    block + HEADER_SIZE
}

#[inline]
pub const fn block_of(payload: usize) -> usize {
    payload - HEADER_SIZE
}

fn encode_link(link: Option<usize>) -> u64 {
    link.map_or(NIL, |offset| offset as u64)
}

fn decode_link(word: u64) -> Option<usize> {
    if word == NIL {
        None
    } else {
        usize::try_from(word).ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_round_trip_in_place() {
        let mut arena = Arena::<128>::new();
        let header = Header::new(48, false, Some(88), None);

        header.write(&mut arena, 0);

        let read = Header::read(&arena, 0);
        assert_eq!(read, header);
        assert!(read.is_intact());
    }

    #[test]
    fn test_header_layout_matches_word_offsets() {
        let mut arena = Arena::<64>::new();
        Header::new(16, true, None, Some(8)).write(&mut arena, 0);

        assert_eq!(arena.read_word(0), 16);
        assert_eq!(arena.read_word(8), 1);
        assert_eq!(arena.read_word(16), u64::MAX);
        assert_eq!(arena.read_word(24), 8);
        assert_eq!(arena.read_word(32), BLOCK_MAGIC);
    }

    #[test]
    fn test_zeroed_memory_is_not_a_header() {
        let arena = Arena::<64>::new();

        assert!(!Header::read(&arena, 0).is_intact());
    }

    #[test]
    fn test_payload_conversions() {
        assert_eq!(HEADER_SIZE, 40);
        assert_eq!(payload_of(0), 40);
        assert_eq!(block_of(payload_of(144)), 144);
    }
}
