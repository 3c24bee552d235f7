//! A1-style cell references.

/// Converts zero-based indexes to a reference such as `B3`.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    let mut letters = Vec::new();
    let mut col = col + 1;
    while col > 0 {
        let remainder = (col - 1) % 26;
        letters.push(b'A' + remainder as u8);
        col = (col - 1) / 26;
    }
    letters.reverse();
    format!("{}{}", String::from_utf8_lossy(&letters), row + 1)
}

/// Parses a reference such as `B3` into zero-based `(row, col)`.
/// Returns `None` when the reference is malformed.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.trim().replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .bytes()
        .try_fold(0usize, |acc, letter| {
            acc.checked_mul(26)?.checked_add((letter.to_ascii_uppercase() - b'A') as usize + 1)
        })?;
    let row = digits.parse::<usize>().ok()?;
    Some((row.checked_sub(1)?, col - 1))
}
