//! Property tests for the buffer contract.
//!
//! Every property runs against both the in-memory and the file-backed
//! implementation. File buffers use a five byte block so searches and trims
//! routinely cross block boundaries.

use databuffer::buffer::is_trimmable;
use databuffer::{DataBuffer, FileBackedBuffer};
use proptest::prelude::*;
use tempfile::TempDir;

const FILE_BLOCK: usize = 5;

fn make_buffer(dir: &TempDir, content: &[u8], file_backed: bool) -> DataBuffer {
    let mut buf = if file_backed {
        DataBuffer::from_impl(FileBackedBuffer::temporary(dir.path(), FILE_BLOCK).unwrap())
    } else {
        DataBuffer::new()
    };
    buf.write(0, content).unwrap();
    buf
}

fn reference_find(content: &[u8], begin: u64, end: u64, needle: &[u8]) -> u64 {
    let size = content.len() as u64;
    if needle.is_empty() {
        return begin;
    }
    let end = end.min(size);
    if begin >= end {
        return size;
    }
    content[begin as usize..end as usize]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|offset| begin + offset as u64)
        .unwrap_or(size)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_byte() -> impl Strategy<Value = u8> {
    prop_oneof![Just(b' '), Just(b'\n'), Just(b'a'), Just(b'b'), Just(b'c')]
}

fn arb_content() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(arb_byte(), 0..48)
}

fn arb_needle() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(arb_byte(), 0..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// read(p, 1) and at(p) agree for every valid position.
    #[test]
    fn read_matches_at(content in arb_content(), file_backed in any::<bool>()) {
        let dir = TempDir::new().unwrap();
        let buf = make_buffer(&dir, &content, file_backed);
        for pos in 0..buf.size() {
            let mut byte = [0u8; 1];
            prop_assert_eq!(buf.read(pos, &mut byte), 1);
            prop_assert_eq!(buf.at(pos).unwrap(), byte[0]);
        }
        prop_assert!(buf.at(buf.size()).is_err());
    }

    /// Reading back what was written yields the same bytes.
    #[test]
    fn write_read_roundtrip(
        content in arb_content(),
        data in proptest::collection::vec(any::<u8>(), 0..32),
        pos in 0u64..64,
        file_backed in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let mut buf = make_buffer(&dir, &content, file_backed);
        prop_assert_eq!(buf.write(pos, &data).unwrap(), data.len() as u64);

        let mut out = vec![0u8; data.len()];
        prop_assert_eq!(buf.read(pos, &mut out), data.len() as u64);
        prop_assert_eq!(out, data);
    }

    /// Writing past the end zero-fills the gap and sets size to pos + len.
    #[test]
    fn write_past_end_zero_fills(
        content in arb_content(),
        gap in 1u64..16,
        data in proptest::collection::vec(any::<u8>(), 1..16),
        file_backed in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let mut buf = make_buffer(&dir, &content, file_backed);
        let old_size = buf.size();
        let pos = old_size + gap;
        buf.write(pos, &data).unwrap();

        prop_assert_eq!(buf.size(), pos + data.len() as u64);
        let mut filled = vec![0xffu8; gap as usize];
        prop_assert_eq!(buf.read(old_size, &mut filled), gap);
        prop_assert!(filled.iter().all(|&b| b == 0));
    }

    /// An empty needle always matches at `begin`.
    #[test]
    fn empty_needle_returns_begin(
        content in arb_content(),
        begin in 0u64..64,
        end in 0u64..64,
        file_backed in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let buf = make_buffer(&dir, &content, file_backed);
        prop_assert_eq!(buf.find(begin, end, b""), begin);
    }

    /// find returns the lowest match inside the range, or exactly size().
    #[test]
    fn find_matches_reference(
        content in arb_content(),
        needle in arb_needle(),
        begin in 0u64..56,
        end in 0u64..56,
        file_backed in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let buf = make_buffer(&dir, &content, file_backed);
        let found = buf.find(begin, end, &needle);
        prop_assert_eq!(found, reference_find(&content, begin, end, &needle));

        if !needle.is_empty() && found != buf.size() {
            prop_assert!(found >= begin);
            prop_assert!(found + needle.len() as u64 <= end.min(buf.size()));
        }
    }

    /// trim is idempotent, stays inside the range and agrees across
    /// implementations.
    #[test]
    fn trim_is_idempotent(
        content in arb_content(),
        begin in 0u64..56,
        end in 0u64..56,
    ) {
        let dir = TempDir::new().unwrap();
        let memory = make_buffer(&dir, &content, false);
        let file = make_buffer(&dir, &content, true);

        let (start, stop) = memory.trim(begin, end);
        prop_assert_eq!(file.trim(begin, end), (start, stop));
        prop_assert_eq!(memory.trim(start, stop), (start, stop));

        let clamped = end.min(memory.size());
        if begin <= clamped {
            prop_assert!(begin <= start && start <= stop && stop <= clamped);
        }
        if start < stop {
            prop_assert!(!is_trimmable(memory.at(start).unwrap()));
            prop_assert!(!is_trimmable(memory.at(stop - 1).unwrap()));
        }
    }

    /// Shrinking then growing back yields zeros, not the discarded bytes.
    #[test]
    fn resize_discards_then_zero_fills(
        content in proptest::collection::vec(1u8..=255, 1..48),
        keep in 0usize..48,
        file_backed in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let mut buf = make_buffer(&dir, &content, file_backed);
        let old_size = buf.size();
        let keep = (keep as u64).min(old_size);

        buf.resize(keep).unwrap();
        prop_assert_eq!(buf.size(), keep);
        buf.resize(old_size).unwrap();
        prop_assert_eq!(buf.size(), old_size);

        let bytes = buf.to_vec().unwrap();
        prop_assert_eq!(&bytes[..keep as usize], &content[..keep as usize]);
        prop_assert!(bytes[keep as usize..].iter().all(|&b| b == 0));
    }

    /// Writes to a copy never show up in the original.
    #[test]
    fn copy_is_independent(
        content in arb_content(),
        data in proptest::collection::vec(any::<u8>(), 1..16),
        pos in 0u64..48,
        file_backed in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let original = make_buffer(&dir, &content, file_backed);
        let mut copy = original.copy().unwrap();
        copy.write(pos, &data).unwrap();

        prop_assert_eq!(original.to_vec().unwrap(), content);
    }

    /// Walking chunks visits every byte exactly once.
    #[test]
    fn chunk_loop_covers_buffer(content in arb_content(), file_backed in any::<bool>()) {
        let dir = TempDir::new().unwrap();
        let buf = make_buffer(&dir, &content, file_backed);
        let view = buf.view();

        let mut pos = 0;
        let mut collected = Vec::new();
        loop {
            let (seg_start, seg_end) = view.segment(pos);
            let chunk = view.chunk(pos);
            prop_assert_eq!(seg_start, pos.min(view.size()));
            prop_assert_eq!(seg_end - seg_start, chunk.len() as u64);
            if chunk.is_empty() {
                break;
            }
            collected.extend_from_slice(&chunk);
            pos += chunk.len() as u64;
        }
        prop_assert_eq!(pos, view.size());
        prop_assert_eq!(collected, content);
    }
}

#[test]
fn trim_scenario() {
    let buf = DataBuffer::from("  ab cd ");
    assert_eq!(buf.trim(0, 8), (2, 6));
}

#[test]
fn find_scenario() {
    let mut buf = DataBuffer::new();
    buf.write(0, b"hello").unwrap();
    buf.write(10, b"!!").unwrap();
    assert_eq!(buf.size(), 12);
    assert_eq!(buf.find(0, 12, b"ll"), 2);
    assert_eq!(buf.find(0, 12, b"zz"), 12);
}
