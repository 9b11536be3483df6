use super::HEADER_SIZE;

pub fn is_power_of_two(x: usize) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

pub fn align_forward(addr: usize, alignment: usize) -> Option<usize> {
    assert!(is_power_of_two(alignment));

    let modulo = addr & (alignment - 1);

    if modulo == 0 {
        Some(addr)
    } else {
        addr.checked_add(alignment - modulo)
    }
}

/// Rounds `n` up to the next multiple of [`HEADER_SIZE`].
///
/// Returns `None` when the rounded value does not fit in a `usize`.
pub fn round_up(n: usize) -> Option<usize> {
    align_forward(n, HEADER_SIZE)
}

/// Total block size needed to hand out `requested` usable bytes.
pub fn block_size_for(requested: usize) -> Option<usize> {
    round_up(requested)?.checked_add(HEADER_SIZE)
}
