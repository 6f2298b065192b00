//! Append-only, file-backed list of variable-length byte blocks.
//!
//! Every block carries its length twice, in a header before the payload and
//! a footer after it, so the list can be walked in both directions from the
//! bytes alone. A zero length is reserved for the sentinels at either end:
//!
//! ```text
//! | 0 | 0 | 128 |    data    | 128 | 1928 |    data     | 1928 | ... | 0 | 0 |
//! | dummy | h0  |  block 0   | f0  |  h1  |   block 1   |  f1  | ... | tail  |
//! ```
//!
//! The tail offset is not stored in the file. It is discovered by scanning
//! forward from the first header the first time an append or a backward walk
//! from the end needs it, and cached for the lifetime of the handle.

use std::path::Path;

use tracing::debug;

use crate::storage::{BLOCK_LIST_SUFFIX, MappedRegion, backing_path, read_u32, write_u32};
use crate::{Error, Result};

/// Width of a size marker (header or footer)
const MARKER: usize = size_of::<u32>();

/// Offset of the first real block header, past the dummy sentinel pair
const FIRST_HEADER: usize = 2 * MARKER;

/// Header + footer + a fresh zero tail
const APPEND_OVERHEAD: usize = 4 * MARKER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    Unresolved,
    Resolved(usize),
}

/// Position and length of a block payload inside the list.
///
/// Returned by [`BlockList::append`], [`BlockList::next`] and
/// [`BlockList::prev`], and passed back to them as a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    offset: usize,
    size: u32,
}

impl BlockRef {
    /// Byte offset of the payload from the start of the file
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Payload length in bytes (never zero)
    pub fn size(&self) -> u32 {
        self.size
    }

    fn end(&self) -> usize {
        self.offset + self.size as usize
    }
}

pub struct BlockList {
    region: MappedRegion,
    tail: Tail,
}

impl BlockList {
    /// Open the block list stored at `base` + `.ll`.
    ///
    /// A nonzero `size` creates an empty list of exactly that many bytes;
    /// zero reopens an existing file.
    pub fn open<P: AsRef<Path>>(base: P, size: u32) -> Result<Self> {
        if size != 0 && size as usize <= APPEND_OVERHEAD {
            return Err(Error::InvalidArgument(format!(
                "block list size must exceed {} bytes, got {}",
                APPEND_OVERHEAD, size
            )));
        }

        let path = backing_path(base.as_ref(), BLOCK_LIST_SUFFIX);
        debug!(path = %path.display(), size, "opening block list");
        let region = MappedRegion::open(&path, size as usize)?;

        if region.len() < APPEND_OVERHEAD {
            return Err(Error::InvalidFormat(format!(
                "block list '{}' is {} bytes, smaller than its sentinels",
                path.display(),
                region.len()
            )));
        }

        Ok(BlockList {
            region,
            tail: Tail::Unresolved,
        })
    }

    pub fn region(&self) -> &MappedRegion {
        &self.region
    }

    /// Cached tail offset, if it has been discovered yet
    pub fn tail(&self) -> Option<usize> {
        match self.tail {
            Tail::Resolved(offset) => Some(offset),
            Tail::Unresolved => None,
        }
    }

    fn resolve_tail(&mut self) -> Result<usize> {
        if let Tail::Resolved(offset) = self.tail {
            return Ok(offset);
        }

        debug!("finding tail...");
        let bytes = self.region.as_slice();
        let mut pos = FIRST_HEADER;
        loop {
            let size = read_u32(bytes, pos).ok_or_else(|| corrupt(pos))?;
            if size == 0 {
                break;
            }
            pos = pos
                .checked_add(size as usize + 2 * MARKER)
                .ok_or_else(|| corrupt(pos))?;
        }

        debug!(tail = pos, "tail found");
        self.tail = Tail::Resolved(pos);
        Ok(pos)
    }

    /// Append a block at the tail.
    ///
    /// Returns `Ok(None)` without touching the file when the block, its two
    /// markers and a fresh tail would not fit in the region.
    pub fn append(&mut self, payload: &[u8]) -> Result<Option<BlockRef>> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument(
                "block payload must not be empty".to_string(),
            ));
        }
        let size = u32::try_from(payload.len()).map_err(|_| {
            Error::InvalidArgument(format!("block of {} bytes is too large", payload.len()))
        })?;

        let tail = self.resolve_tail()?;
        let fits = tail
            .checked_add(payload.len() + APPEND_OVERHEAD)
            .is_some_and(|end| end <= self.region.len());
        if !fits {
            debug!(tail, size, capacity = self.region.len(), "block does not fit");
            return Ok(None);
        }

        let bytes = self.region.as_mut_slice();
        let data_start = tail + MARKER;
        let new_tail = data_start + payload.len() + MARKER;

        write_u32(bytes, tail, size);
        bytes[data_start..data_start + payload.len()].copy_from_slice(payload);
        write_u32(bytes, new_tail - MARKER, size);
        write_u32(bytes, new_tail, 0);
        write_u32(bytes, new_tail + MARKER, 0);

        self.tail = Tail::Resolved(new_tail);
        Ok(Some(BlockRef {
            offset: data_start,
            size,
        }))
    }

    /// Step forward from `cursor`, or to the first block when `None`.
    ///
    /// `Ok(None)` marks the end of the list.
    pub fn next(&self, cursor: Option<BlockRef>) -> Result<Option<BlockRef>> {
        let bytes = self.region.as_slice();
        // the dummy sentinel acts as a zero-size block whose payload starts here
        let last = cursor.map_or(MARKER, |block| block.offset);

        let current = last
            .checked_sub(MARKER)
            .and_then(|header| read_u32(bytes, header))
            .ok_or_else(|| corrupt(last))?;
        let next = last
            .checked_add(current as usize + 2 * MARKER)
            .ok_or_else(|| corrupt(last))?;
        let size = read_u32(bytes, next - MARKER).ok_or_else(|| corrupt(next - MARKER))?;
        if size == 0 {
            return Ok(None);
        }

        let block = BlockRef { offset: next, size };
        check_payload(bytes, block)?;
        Ok(Some(block))
    }

    /// Step backward from `cursor`, or to the last block when `None`.
    ///
    /// Starting from the end resolves the tail first. `Ok(None)` marks the
    /// head of the list.
    pub fn prev(&mut self, cursor: Option<BlockRef>) -> Result<Option<BlockRef>> {
        let last = match cursor {
            Some(block) => block.offset,
            None => self.resolve_tail()? + MARKER,
        };
        self.step_back(last)
    }

    /// `last` is the payload offset of the block we are leaving; the previous
    /// block's footer sits two markers before it.
    fn step_back(&self, last: usize) -> Result<Option<BlockRef>> {
        let bytes = self.region.as_slice();
        let footer = last.checked_sub(2 * MARKER).ok_or_else(|| corrupt(last))?;
        let size = read_u32(bytes, footer).ok_or_else(|| corrupt(footer))?;
        if size == 0 {
            return Ok(None);
        }

        let offset = footer
            .checked_sub(size as usize)
            .filter(|&offset| offset >= FIRST_HEADER + MARKER)
            .ok_or_else(|| corrupt(footer))?;
        let block = BlockRef { offset, size };
        check_payload(bytes, block)?;
        Ok(Some(block))
    }

    pub fn payload(&self, block: BlockRef) -> Option<&[u8]> {
        self.region.as_slice().get(block.offset..block.end())
    }

    /// Mutable view of a payload, bounded by the block's length
    pub fn payload_mut(&mut self, block: BlockRef) -> Option<&mut [u8]> {
        self.region.as_mut_slice().get_mut(block.offset..block.end())
    }

    /// Iterate payloads from the head.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: None,
            done: false,
        }
    }

    /// Iterate payloads from the tail back to the head.
    pub fn iter_rev(&mut self) -> Result<IterRev<'_>> {
        let tail = self.resolve_tail()?;
        Ok(IterRev {
            list: self,
            last: tail + MARKER,
            done: false,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.region.flush()
    }

    pub fn close(self) -> Result<()> {
        self.region.close()
    }
}

fn check_payload(bytes: &[u8], block: BlockRef) -> Result<()> {
    // payload plus its footer must lie inside the region
    match block.end().checked_add(MARKER) {
        Some(end) if end <= bytes.len() => Ok(()),
        _ => Err(corrupt(block.offset)),
    }
}

fn corrupt(offset: usize) -> Error {
    Error::InvalidFormat(format!(
        "block marker at offset {} points outside the list",
        offset
    ))
}

pub struct Iter<'a> {
    list: &'a BlockList,
    cursor: Option<BlockRef>,
    done: bool,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.list.next(self.cursor) {
            Ok(Some(block)) => {
                self.cursor = Some(block);
                Some(self.list.payload(block).ok_or_else(|| corrupt(block.offset)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

pub struct IterRev<'a> {
    list: &'a BlockList,
    last: usize,
    done: bool,
}

impl<'a> Iterator for IterRev<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.list.step_back(self.last) {
            Ok(Some(block)) => {
                self.last = block.offset;
                Some(self.list.payload(block).ok_or_else(|| corrupt(block.offset)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mmstore-bl-{}-{}", std::process::id(), name))
    }

    fn cleanup(base: &Path) {
        let _ = fs::remove_file(backing_path(base, BLOCK_LIST_SUFFIX));
    }

    /// head sentinel + two 8-byte blocks with markers + tail sentinel
    const TWO_BLOCKS: u32 = 8 + 2 * (8 + 8) + 8;

    #[test]
    fn test_two_blocks_fill_list() {
        let base = scratch("two");
        let mut list = BlockList::open(&base, TWO_BLOCKS).expect("Failed to create list");

        let first = list.append(b"aaaaaaaa").unwrap().expect("first block should fit");
        list.payload_mut(first).unwrap()[0] = b'A';
        assert!(list.append(b"bbbbbbbb").unwrap().is_some());

        let tail = list.tail();
        let before = list.region().as_slice().to_vec();
        assert!(list.append(b"cccccccc").unwrap().is_none());
        assert_eq!(list.tail(), tail);
        assert_eq!(list.region().as_slice(), &before[..]);

        let mut count = 0;
        let mut cursor = list.next(None).unwrap();
        while let Some(block) = cursor {
            assert_eq!(block.size(), 8);
            count += 1;
            cursor = list.next(Some(block)).unwrap();
        }
        assert_eq!(count, 2);
        assert_eq!(list.payload(first).unwrap(), b"Aaaaaaaa");

        list.close().unwrap();
        cleanup(&base);
    }

    #[test]
    fn test_byte_layout() {
        let base = scratch("layout");
        let mut list = BlockList::open(&base, 64).unwrap();
        let block = list.append(b"xyz").unwrap().unwrap();
        assert_eq!(block.offset(), 12);

        let bytes = list.region().as_slice();
        assert_eq!(&bytes[0..8], &[0u8; 8]);
        assert_eq!(read_u32(bytes, 8), Some(3));
        assert_eq!(&bytes[12..15], b"xyz");
        assert_eq!(read_u32(bytes, 15), Some(3));
        assert_eq!(read_u32(bytes, 19), Some(0));
        assert_eq!(read_u32(bytes, 23), Some(0));
        assert_eq!(list.tail(), Some(19));

        list.close().unwrap();
        cleanup(&base);
    }

    #[test]
    fn test_forward_and_backward_order() {
        let base = scratch("order");
        let mut list = BlockList::open(&base, 1024).unwrap();
        let payloads: Vec<Vec<u8>> = (1..=10u8).map(|n| vec![n; n as usize * 3]).collect();
        for payload in &payloads {
            list.append(payload).unwrap().expect("block should fit");
        }

        let forward: Vec<&[u8]> = list.iter().map(|b| b.unwrap()).collect();
        assert_eq!(forward.len(), payloads.len());
        for (got, want) in forward.iter().zip(&payloads) {
            assert_eq!(*got, &want[..]);
        }

        let backward: Vec<Vec<u8>> = list.iter_rev().unwrap().map(|b| b.unwrap().to_vec()).collect();
        let mut reversed = payloads.clone();
        reversed.reverse();
        assert_eq!(backward, reversed);

        list.close().unwrap();
        cleanup(&base);
    }

    #[test]
    fn test_prev_walks_back_from_a_cursor() {
        let base = scratch("prev");
        let mut list = BlockList::open(&base, 256).unwrap();
        list.append(b"one").unwrap();
        let two = list.append(b"two!").unwrap().unwrap();
        list.append(b"three").unwrap();

        let one = list.prev(Some(two)).unwrap().unwrap();
        assert_eq!(list.payload(one).unwrap(), b"one");
        assert_eq!(list.prev(Some(one)).unwrap(), None);

        let last = list.prev(None).unwrap().unwrap();
        assert_eq!(list.payload(last).unwrap(), b"three");
        assert_eq!(list.next(Some(last)).unwrap(), None);

        list.close().unwrap();
        cleanup(&base);
    }

    #[test]
    fn test_empty_list() {
        let base = scratch("empty");
        let mut list = BlockList::open(&base, 32).unwrap();

        assert_eq!(list.next(None).unwrap(), None);
        assert_eq!(list.tail(), None);
        assert_eq!(list.prev(None).unwrap(), None);
        assert_eq!(list.tail(), Some(FIRST_HEADER));

        list.close().unwrap();
        cleanup(&base);
    }

    #[test]
    fn test_tail_is_discovered_after_reopen() {
        let base = scratch("reopen");
        let mut list = BlockList::open(&base, 512).unwrap();
        list.append(b"first").unwrap();
        list.append(b"second").unwrap();
        let tail = list.tail();
        list.close().unwrap();

        let mut list = BlockList::open(&base, 0).unwrap();
        assert_eq!(list.region().len(), 512);
        assert_eq!(list.tail(), None);

        // forward traversal does not resolve the tail
        assert_eq!(list.iter().count(), 2);
        assert_eq!(list.tail(), None);

        let third = list.append(b"third").unwrap().unwrap();
        assert!(list.tail() > tail);
        assert_eq!(list.payload(third).unwrap(), b"third");

        let all: Vec<Vec<u8>> = list.iter().map(|b| b.unwrap().to_vec()).collect();
        assert_eq!(all, vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);

        list.close().unwrap();
        cleanup(&base);
    }

    #[test]
    fn test_invalid_arguments() {
        let base = scratch("args");
        assert!(matches!(BlockList::open(&base, 16), Err(Error::InvalidArgument(_))));

        let mut list = BlockList::open(&base, 64).unwrap();
        assert!(matches!(list.append(b""), Err(Error::InvalidArgument(_))));
        assert_eq!(list.next(None).unwrap(), None);

        list.close().unwrap();
        cleanup(&base);
    }

    #[test]
    fn test_corrupt_header_is_rejected() {
        let base = scratch("corrupt");
        let mut list = BlockList::open(&base, 64).unwrap();
        write_u32(list.region.as_mut_slice(), FIRST_HEADER, 1000);

        assert!(matches!(list.next(None), Err(Error::InvalidFormat(_))));
        assert!(matches!(list.append(b"x"), Err(Error::InvalidFormat(_))));

        list.close().unwrap();
        cleanup(&base);
    }
}
