//! Helpers over byte ranges of a [`DataBuffer`].
//!
//! These only use the public buffer operations, so they behave the same for
//! every implementation.

use super::DataBuffer;

/// Half-open `[start, end)` range of buffer positions.
pub type ByteRange = (u64, u64);

/// Decode `[begin, end)` as UTF-8, replacing invalid sequences.
pub fn to_string_lossy(buf: &DataBuffer, begin: u64, end: u64) -> String {
    let end = end.min(buf.size());
    if begin >= end {
        return String::new();
    }
    let mut bytes = vec![0u8; (end - begin) as usize];
    let read = buf.read(begin, &mut bytes) as usize;
    bytes.truncate(read);
    String::from_utf8_lossy(&bytes).into_owned()
}

/// True when the bytes at `pos` equal `prefix`.
pub fn starts_with(buf: &DataBuffer, pos: u64, prefix: &[u8]) -> bool {
    let mut head = vec![0u8; prefix.len()];
    buf.read(pos, &mut head) as usize == prefix.len() && head == prefix
}

/// Split `[begin, end)` at the first `delim` and trim both halves.
///
/// Returns `None` when the delimiter does not occur in the range.
pub fn split_once(buf: &DataBuffer, begin: u64, end: u64, delim: &[u8]) -> Option<(ByteRange, ByteRange)> {
    let end = end.min(buf.size());
    if delim.is_empty() {
        return None;
    }
    let at = buf.find(begin, end, delim);
    if at == buf.size() {
        return None;
    }
    let left = buf.trim(begin, at);
    let right = buf.trim(at + delim.len() as u64, end);
    Some((left, right))
}

/// Value of the first line `name <sep> value`, with lines separated by `\n`.
///
/// The name must match exactly after trimming; the value is trimmed and
/// decoded lossily.
pub fn field_value(buf: &DataBuffer, name: &[u8], sep: &[u8]) -> Option<String> {
    let size = buf.size();
    let mut pos = 0;
    while pos < size {
        let line_end = buf.find(pos, size, b"\n");
        if let Some((key, value)) = split_once(buf, pos, line_end, sep) {
            if key.1 - key.0 == name.len() as u64 && starts_with(buf, key.0, name) {
                return Some(to_string_lossy(buf, value.0, value.1));
            }
        }
        pos = line_end + 1;
    }
    None
}
