/// Fixed-capacity backing storage for a heap. Block headers and payloads
/// both live in here; nothing ever points outside of it.
pub struct Arena<const N: usize> {
    arena: [u8; N],
}

pub(crate) const WORD_SIZE: usize = core::mem::size_of::<u64>();

impl<const N: usize> Arena<N> {
    pub const fn new() -> Self {
        Self { arena: [0x00; N] }
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        N
    }

    #[inline]
    pub fn contains(&self, offset: usize, len: usize) -> bool {
        offset.checked_add(len).map_or(false, |end| end <= N)
    }

    /// Reads the little-endian word stored at `offset`. Callers check bounds.
    pub fn read_word(&self, offset: usize) -> u64 {
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(&self.arena[offset..offset + WORD_SIZE]);
        u64::from_le_bytes(word)
    }

    pub fn write_word(&mut self, offset: usize, value: u64) {
        self.arena[offset..offset + WORD_SIZE].copy_from_slice(&value.to_le_bytes());
    }

    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.arena[offset..offset + len]
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.arena[offset..offset + len]
    }

    /// Moves `len` bytes from `src` to `dst`. The ranges may overlap.
    pub fn copy(&mut self, src: usize, dst: usize, len: usize) {
        self.arena.copy_within(src..src + len, dst);
    }
}
