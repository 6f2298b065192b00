mod region;
pub mod array;
pub mod block_list;
pub mod strtable;

pub use self::region::MappedRegion;
pub use self::array::DiskArray;
pub use self::block_list::{BlockList, BlockRef};
pub use self::strtable::StrTable;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Backing-file suffix for block lists
pub const BLOCK_LIST_SUFFIX: &str = ".ll";

/// Backing-file suffix for string tables
pub const STRTABLE_SUFFIX: &str = ".stb";

/// Backing-file suffix for fixed-stride arrays
pub const ARRAY_SUFFIX: &str = ".arr";

/// Append a format suffix to a caller-supplied base path.
///
/// The suffix is appended to the whole file name (`db/log` becomes
/// `db/log.ll`), never substituted for an existing extension.
pub fn backing_path(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Read a native-endian u32 at `offset`, or `None` if it would leave `bytes`.
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let raw: [u8; 4] = bytes.get(offset..end)?.try_into().ok()?;
    Some(u32::from_ne_bytes(raw))
}

/// Write a native-endian u32 at `offset`. Callers validate the range first.
pub(crate) fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}
