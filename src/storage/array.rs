use std::ops::Range;
use std::path::Path;

use tracing::debug;
use zerocopy::byteorder::{NativeEndian, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::storage::{ARRAY_SUFFIX, MappedRegion, backing_path};
use crate::{Error, Result};

const HEADER_SIZE: usize = size_of::<ArrayHeader>();

/// `| u64 num elements | u64 element size | data ... |`
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct ArrayHeader {
    len: U64<NativeEndian>,
    element_size: U64<NativeEndian>,
}

const _: () = assert!(HEADER_SIZE == 16);

/// Disk-backed array of equal-size slots
pub struct DiskArray {
    region: MappedRegion,
    len: u64,
    element_size: u64,
}

impl DiskArray {
    /// Open the array stored at `base` + `.arr`.
    ///
    /// With `desired > 0` a zeroed array of `desired` slots of `element_size`
    /// bytes is created; with `desired == 0` the header of an existing file
    /// is read back and `element_size` is ignored.
    pub fn open<P: AsRef<Path>>(base: P, desired: u64, element_size: u64) -> Result<Self> {
        let size = if desired > 0 {
            if element_size == 0 {
                return Err(Error::InvalidArgument(
                    "array element size must be nonzero".to_string(),
                ));
            }
            desired
                .checked_mul(element_size)
                .and_then(|body| body.checked_add(HEADER_SIZE as u64))
                .and_then(|total| usize::try_from(total).ok())
                .ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "array of {} x {} bytes is too large",
                        desired, element_size
                    ))
                })?
        } else {
            0
        };

        let path = backing_path(base.as_ref(), ARRAY_SUFFIX);
        debug!(path = %path.display(), desired, element_size, "opening array");
        let mut region = MappedRegion::open(&path, size)?;

        if size > 0 {
            // the mapped size is authoritative; a partial trailing slot is dropped
            let len = (region.len() - HEADER_SIZE) as u64 / element_size;
            let (header, _) = ArrayHeader::mut_from_prefix(region.as_mut_slice())
                .map_err(|_| Error::InvalidFormat("array header does not fit".to_string()))?;
            *header = ArrayHeader {
                len: U64::new(len),
                element_size: U64::new(element_size),
            };
        }

        let (header, _) = ArrayHeader::ref_from_prefix(region.as_slice()).map_err(|_| {
            Error::InvalidFormat(format!("'{}' is too small to be an array", path.display()))
        })?;
        let len = header.len.get();
        let element_size = header.element_size.get();

        let fits = len
            .checked_mul(element_size)
            .and_then(|body| body.checked_add(HEADER_SIZE as u64))
            .is_some_and(|total| total <= region.len() as u64);
        if element_size == 0 || !fits {
            return Err(Error::InvalidFormat(format!(
                "array '{}' header ({} x {} bytes) does not match its {} byte file",
                path.display(),
                len,
                element_size,
                region.len()
            )));
        }

        debug!(len, element_size, "array opened");
        Ok(DiskArray {
            region,
            len,
            element_size,
        })
    }

    pub fn region(&self) -> &MappedRegion {
        &self.region
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn element_size(&self) -> u64 {
        self.element_size
    }

    fn element_range(&self, index: u64) -> Option<Range<usize>> {
        if index >= self.len {
            return None;
        }
        // fits in usize: the whole body was checked against the mapping at open
        let size = self.element_size as usize;
        let start = HEADER_SIZE + index as usize * size;
        Some(start..start + size)
    }

    pub fn get(&self, index: u64) -> Option<&[u8]> {
        self.region.as_slice().get(self.element_range(index)?)
    }

    /// Mutable view of one slot, exactly `element_size` bytes long
    pub fn get_mut(&mut self, index: u64) -> Option<&mut [u8]> {
        let range = self.element_range(index)?;
        self.region.as_mut_slice().get_mut(range)
    }

    /// Decode slot `index` as a `T`; `None` if out of range or if `T` is not
    /// exactly `element_size` bytes.
    pub fn read<T: FromBytes>(&self, index: u64) -> Option<T> {
        T::read_from_bytes(self.get(index)?).ok()
    }

    /// Encode `value` into slot `index`; `false` under the same conditions
    /// under which [`read`](Self::read) returns `None`.
    pub fn write<T: IntoBytes + Immutable>(&mut self, index: u64, value: &T) -> bool {
        match self.get_mut(index) {
            Some(slot) if slot.len() == size_of::<T>() => {
                slot.copy_from_slice(value.as_bytes());
                true
            }
            _ => false,
        }
    }

    /// The whole body, `len * element_size` bytes
    pub fn as_bytes(&self) -> &[u8] {
        let end = HEADER_SIZE + (self.len * self.element_size) as usize;
        &self.region.as_slice()[HEADER_SIZE..end]
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        let end = HEADER_SIZE + (self.len * self.element_size) as usize;
        &mut self.region.as_mut_slice()[HEADER_SIZE..end]
    }

    pub fn flush(&self) -> Result<()> {
        self.region.flush()
    }

    pub fn close(self) -> Result<()> {
        self.region.close()
    }
}
