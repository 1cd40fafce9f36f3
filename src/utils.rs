use super::ALIGNMENT;

pub fn is_power_of_two(x: usize) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

pub fn align_forward(mut size: usize, alignment: usize) -> usize {
    assert!(is_power_of_two(alignment));

    // Same as (size % alignment) but faster as 'alignment' is a power of two
    let modulo = size & (alignment - 1);

    if modulo != 0 {
        size += alignment - modulo;
    }

    size
}

/// Rounds a request up to the heap's alignment unit.
#[inline]
pub fn align_request(size: usize) -> usize {
    align_forward(size, ALIGNMENT)
}

#[inline]
pub fn is_aligned(value: usize) -> bool {
    value & (ALIGNMENT - 1) == 0
}
