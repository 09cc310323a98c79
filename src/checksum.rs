/// Two's-complement checksum: the byte that brings the wrapping 8-bit sum
/// of `data` back to zero.
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg()
}

/// Receiver-side check: `expected` seals `data` when the sum of both wraps
/// to zero.
pub fn verify(data: &[u8], expected: u8) -> bool {
    data.iter()
        .fold(expected, |acc, &b| acc.wrapping_add(b))
        == 0
}
