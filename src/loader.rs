//! Hex program loader
//!
//! Each line holds one 32-bit instruction word as 8 hex digits,
//! most-significant nibble first. Blank lines (after trimming
//! whitespace) are skipped; anything else that isn't exactly 8 hex
//! digits is a malformed line. The word on each line is emitted as
//! four little-endian bytes, matching [`Memory`]'s byte order. This
//! module sits outside the functional core's no-host-arithmetic
//! discipline — it is ordinary file and string handling.

use std::fs;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to read program file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: expected 8 hex digits, got {content:?}")]
    MalformedLine { line: usize, content: String },
}

/// Parse a hex-text program image into little-endian instruction
/// bytes, ready for [`Memory::load_program`].
pub fn load_hex_file(path: &Path) -> Result<Vec<u8>, LoaderError> {
    let text = fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut bytes = Vec::new();
    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if line.len() != 8 || !line.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LoaderError::MalformedLine {
                line: index + 1,
                content: line.to_string(),
            });
        }
        let word = u32::from_str_radix(line, 16).expect("validated hex digits");
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    Ok(bytes)
}
