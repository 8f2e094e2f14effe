use crate::transfer::ByteRange;

/// Split `total_bytes` into at most `segments` contiguous, disjoint,
/// inclusive ranges covering `[0, total_bytes - 1]`.
///
/// The remainder of the division is spread one byte at a time over the
/// leading ranges so segment sizes differ by at most one. The segment count
/// is clamped to the byte count so no range is ever empty. Disjointness of
/// the returned ranges is the invariant the transfer units rely on; they do
/// not re-validate it.
pub fn plan_ranges(total_bytes: u64, segments: usize) -> Vec<ByteRange> {
    assert!(total_bytes > 0, "cannot plan ranges for an empty resource");
    assert!(segments > 0, "segment count must be at least 1");

    let count = (segments as u64).min(total_bytes);
    let base = total_bytes / count;
    let remainder = total_bytes % count;

    let mut ranges = Vec::with_capacity(count as usize);
    let mut offset = 0u64;

    for i in 0..count {
        let size = base + u64::from(i < remainder);
        ranges.push(ByteRange::new(offset, offset + size - 1));
        offset += size;
    }

    ranges
}
