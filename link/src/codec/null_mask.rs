//! Packed null bitmaps.
//!
//! Bit `i` (LSB-first within each byte) is set when row `i` is null. Rows
//! past the end of the mask are non-null.

/// Whether `row` is marked null in `mask`.
pub fn is_null(mask: &[u8], row: usize) -> bool {
    mask.get(row / 8)
        .map_or(false, |byte| byte & (1 << (row % 8)) != 0)
}

/// Pack one flag per row into a bitmap.
///
/// Returns an empty mask when no row is null.
pub fn pack<I>(flags: I) -> Vec<u8>
where
    I: IntoIterator<Item = bool>,
{
    let mut mask = Vec::new();
    let mut any_null = false;
    for (row, null) in flags.into_iter().enumerate() {
        if row % 8 == 0 {
            mask.push(0u8);
        }
        if null {
            any_null = true;
            if let Some(byte) = mask.last_mut() {
                *byte |= 1 << (row % 8);
            }
        }
    }
    if any_null {
        mask
    } else {
        Vec::new()
    }
}
