//! Hex dump formatting for buffer diagnostics

/// Bytes per row in [`hex_dump`]
pub const DEFAULT_COLUMNS: usize = 16;

/// Format bytes as `0xAB 0xCD ...`, `columns` bytes per line
///
/// Lines are separated by `\n` with no trailing newline. Empty input gives
/// an empty string.
pub fn hex_dump_columns(data: &[u8], columns: usize) -> String {
    let columns = columns.max(1);
    data.chunks(columns)
        .map(|row| {
            row.iter()
                .map(|b| format!("0x{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format bytes as a 16-column hex dump
pub fn hex_dump(data: &[u8]) -> String {
    hex_dump_columns(data, DEFAULT_COLUMNS)
}
