//! Smol utilities for logging

use std::ascii;

/// Make an Ascii-safe string out of untrusted bytes, such as a request line
/// that failed to parse.
pub fn escape_bytes(s: &[u8]) -> String {
    s.iter()
        .flat_map(|&b| ascii::escape_default(b))
        .map(char::from)
        .collect()
}
