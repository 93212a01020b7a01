// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial line framing.
//!
//! The relay prints one ASCII line per received report:
//!
//! ```text
//! :<122 hex characters>\r\n
//! ```
//!
//! Only the length and the leading colon are checked. The trailing
//! checksum byte is passed through to the decoder, which ignores it.

use crate::frame::FrameError;

/// Expected line length including the leading `:`.
pub const LINE_LENGTH: usize = 123;

/// First byte of every relay frame line.
pub const FRAME_PREFIX: u8 = b':';

/// Validate a raw serial line and return the decoded frame bytes.
///
/// Trailing `\r` and `\n` are stripped before checking.
pub fn decode_line(line: &[u8]) -> Result<Vec<u8>, FrameError> {
    let line = trim_line_end(line);

    if line.len() != LINE_LENGTH {
        return Err(FrameError::WrongLength {
            expected: LINE_LENGTH,
            actual: line.len(),
        });
    }
    if line[0] != FRAME_PREFIX {
        return Err(FrameError::MissingPrefix);
    }

    Ok(hex::decode(&line[1..])?)
}

fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n'] = line {
        line = rest;
    }
    line
}
