//! Converts a byte offset into the `SourceLocation` diagnostics carry.
//! Deliberately a plain line/column scan rather than a cached line-index
//! structure: builder errors are rare on the hot path, so there is no
//! reason to keep one around for a whole compilation.

use ruff_text_size::TextSize;
use upyc_common::{OneIndexed, SourceLocation};

pub fn location_of(source: &str, offset: TextSize) -> SourceLocation {
    let offset = offset.to_usize();
    let mut line = 0usize;
    let mut col = 0usize;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    SourceLocation {
        line: OneIndexed::from_zero_indexed(line),
        character_offset: OneIndexed::from_zero_indexed(col),
    }
}
