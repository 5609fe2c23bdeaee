//! `A1`-style cell references.

/// Rows a worksheet may address (`1..=1048576`).
pub const MAX_ROWS: usize = 1 << 20;

/// Columns a worksheet may address (`A..=XFD`).
pub const MAX_COLUMNS: usize = 1 << 14;

/// Column letters for a 0-based column index (`0 -> "A"`, `27 -> "AB"`).
pub fn column_letters(mut col: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// `A1` reference for a 0-based `(row, col)` pair.
pub fn cell_ref(row: usize, col: usize) -> String {
    format!("{}{}", column_letters(col), row + 1)
}

/// 0-based column index of a reference like `"C7"` or `"AB12"`.
///
/// Returns `None` when the reference does not start with a column letter.
pub fn column_index(reference: &str) -> Option<usize> {
    let mut col = 0usize;
    let mut seen = false;
    for b in reference.bytes() {
        if !b.is_ascii_alphabetic() {
            break;
        }
        seen = true;
        col = col
            .checked_mul(26)?
            .checked_add((b.to_ascii_uppercase() - b'A') as usize + 1)?;
    }
    if seen {
        Some(col - 1)
    } else {
        None
    }
}

/// 0-based row index of a reference like `"C7"`, or of a bare row number.
pub(crate) fn row_index(reference: &str) -> Option<usize> {
    let digits = reference.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let row: usize = digits.parse().ok()?;
    row.checked_sub(1)
}
