//! Append-only table of NUL-terminated strings in a single mapped file.
//!
//! ```text
//!         byte | contents      | description
//!         -----|---------------|-------------
//!            0 | STBL          | identifying marker
//!            4 | size          | u32 size of file
//!            8 | n             | u32 number of elements
//!           12 | index[0]      | offset of element 0
//!      12 + 4i | index[i]      | offset of element i
//!  12 + 4(n)   |               | free space
//!              | element n-1   | last element added
//!              | ...           |
//!              | element 0     | first element added is at end of table
//!         size | end           |
//! ```
//!
//! Offsets are measured backward from the end of the file to the first byte
//! of the string, so the index grows toward the end of the file while the
//! strings grow toward the start. Element `i` spans
//! `offset[i] - offset[i - 1]` bytes, terminator included.

use std::ffi::CStr;
use std::ops::Range;
use std::path::Path;

use tracing::debug;
use zerocopy::byteorder::{NativeEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::storage::{MappedRegion, STRTABLE_SUFFIX, backing_path, read_u32, write_u32};
use crate::{Error, Result};

const MAGIC: [u8; 4] = *b"STBL";

const HEADER_SIZE: usize = size_of::<TableHeader>();

const ENTRY_SIZE: usize = size_of::<u32>();

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct TableHeader {
    magic: [u8; 4],
    size: U32<NativeEndian>,
    len: U32<NativeEndian>,
}

const _: () = assert!(HEADER_SIZE == 12);

pub struct StrTable {
    region: MappedRegion,
    /// Mirrors of the header fields; the header in the file is kept in sync
    size: u32,
    len: u32,
}

impl StrTable {
    /// Open the string table stored at `base` + `.stb`.
    ///
    /// A nonzero `size` creates an empty table of exactly that many bytes;
    /// zero reopens an existing file, which must carry the `STBL` marker and
    /// record its own size correctly.
    pub fn open<P: AsRef<Path>>(base: P, size: u32) -> Result<Self> {
        if size != 0 && (size as usize) < HEADER_SIZE {
            return Err(Error::InvalidArgument(format!(
                "string table size must be at least {} bytes, got {}",
                HEADER_SIZE, size
            )));
        }

        let path = backing_path(base.as_ref(), STRTABLE_SUFFIX);
        debug!(path = %path.display(), size, "opening string table");
        let mut region = MappedRegion::open(&path, size as usize)?;

        if size > 0 {
            debug!("initializing header");
            let (header, _) = TableHeader::mut_from_prefix(region.as_mut_slice())
                .map_err(|_| Error::InvalidFormat("string table header does not fit".to_string()))?;
            *header = TableHeader {
                magic: MAGIC,
                size: U32::new(size),
                len: U32::new(0),
            };
        }

        let (header, _) = TableHeader::ref_from_prefix(region.as_slice()).map_err(|_| {
            Error::InvalidFormat(format!(
                "'{}' is too small to be a string table",
                path.display()
            ))
        })?;
        if header.magic != MAGIC {
            return Err(Error::InvalidFormat(format!(
                "'{}' is not a string table",
                path.display()
            )));
        }
        let stored = header.size.get();
        if stored as usize != region.len() {
            return Err(Error::InvalidFormat(format!(
                "string table '{}' records size {} but is {} bytes",
                path.display(),
                stored,
                region.len()
            )));
        }
        let len = header.len.get();
        validate_index(region.as_slice(), len)?;

        Ok(StrTable {
            region,
            size: stored,
            len,
        })
    }

    pub fn region(&self) -> &MappedRegion {
        &self.region
    }

    /// Number of elements
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total table size in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    fn offset(&self, index: u32) -> Option<u32> {
        read_u32(self.region.as_slice(), entry_offset(index))
    }

    /// Add a string, returning its index.
    ///
    /// Returns `Ok(None)` without touching the file when the string and its
    /// index entry would overlap.
    pub fn add(&mut self, element: &str) -> Result<Option<u32>> {
        if element.as_bytes().contains(&0) {
            return Err(Error::InvalidArgument(
                "string table elements cannot contain NUL".to_string(),
            ));
        }

        let previous_end = match self.len {
            0 => 0,
            len => self.offset(len - 1).ok_or_else(|| index_corrupt(len - 1))?,
        };
        let needed = element.len() + 1;

        // the string must start at or after the end of its own index entry
        let index_limit = entry_offset(self.len) + ENTRY_SIZE;
        let start = (previous_end as usize)
            .checked_add(needed)
            .and_then(|back| (self.size as usize).checked_sub(back))
            .filter(|&start| start >= index_limit);
        let Some(start) = start else {
            debug!(len = self.len, needed, "element does not fit");
            return Ok(None);
        };

        let index = self.len;
        let bytes = self.region.as_mut_slice();
        bytes[start..start + element.len()].copy_from_slice(element.as_bytes());
        bytes[start + element.len()] = 0;
        write_u32(bytes, entry_offset(index), self.size - start as u32);

        let (header, _) = TableHeader::mut_from_prefix(bytes)
            .map_err(|_| Error::InvalidFormat("string table header does not fit".to_string()))?;
        header.len.set(index + 1);
        self.len = index + 1;

        debug!(index, start, "element added");
        Ok(Some(index))
    }

    /// Length of element `index` in bytes, terminator included
    pub fn element_len(&self, index: u32) -> Option<u32> {
        if index >= self.len {
            return None;
        }
        let end = self.offset(index)?;
        match index {
            0 => Some(end),
            _ => end.checked_sub(self.offset(index - 1)?),
        }
    }

    fn element_range(&self, index: u32) -> Option<Range<usize>> {
        let start = (self.size as usize).checked_sub(self.offset(index)? as usize)?;
        Some(start..start + self.element_len(index)? as usize)
    }

    pub fn get(&self, index: u32) -> Option<&CStr> {
        let range = self.element_range(index)?;
        CStr::from_bytes_until_nul(self.region.as_slice().get(range)?).ok()
    }

    /// Mutable view of an element's bytes, excluding its terminator.
    ///
    /// The view can never grow past the element's stored length.
    pub fn get_mut(&mut self, index: u32) -> Option<&mut [u8]> {
        let range = self.element_range(index)?;
        self.region
            .as_mut_slice()
            .get_mut(range.start..range.end.checked_sub(1)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> + '_ {
        (0..self.len).filter_map(move |index| self.get(index))
    }

    pub fn flush(&self) -> Result<()> {
        self.region.flush()
    }

    pub fn close(self) -> Result<()> {
        self.region.close()
    }
}

fn entry_offset(index: u32) -> usize {
    HEADER_SIZE + index as usize * ENTRY_SIZE
}

fn index_corrupt(index: u32) -> Error {
    Error::InvalidFormat(format!("string table index entry {} is invalid", index))
}

/// Check that the index fits and its offsets are strictly increasing without
/// reaching back into the index itself.
fn validate_index(bytes: &[u8], len: u32) -> Result<()> {
    let index_end = entry_offset(len);
    if index_end > bytes.len() {
        return Err(Error::InvalidFormat(format!(
            "string table index of {} entries overruns the file",
            len
        )));
    }

    let data_capacity = bytes.len() - index_end;
    let mut previous = 0u32;
    for index in 0..len {
        let offset = read_u32(bytes, entry_offset(index)).ok_or_else(|| index_corrupt(index))?;
        if offset <= previous || offset as usize > data_capacity {
            return Err(index_corrupt(index));
        }
        previous = offset;
    }
    Ok(())
}
