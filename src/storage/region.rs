use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::{Error, Result};

/// A fixed-size, file-backed, read/write memory view.
///
/// The size is decided when the region is opened and never changes while it
/// is open. All access goes through [`as_slice`](Self::as_slice) and
/// [`as_mut_slice`](Self::as_mut_slice), so the borrow checker keeps views
/// from outliving the mapping.
pub struct MappedRegion {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
}

impl MappedRegion {
    /// Open a region.
    ///
    /// With `size > 0` the file is created (or truncated) to exactly `size`
    /// zero bytes. With `size == 0` an existing file is mapped as-is and its
    /// size is taken from the filesystem.
    pub fn open<P: AsRef<Path>>(path: P, size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let (file, len) = if size > 0 {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            file.set_len(size as u64)?;
            reserve(&file, size)?;
            debug!(path = %path.display(), size, "created region");
            (file, size)
        } else {
            let file = OpenOptions::new().read(true).write(true).open(&path)?;
            let len = file.metadata()?.len();
            if len == 0 {
                return Err(Error::InvalidFormat(format!(
                    "cannot map empty file '{}'",
                    path.display()
                )));
            }
            let len = usize::try_from(len).map_err(|_| {
                Error::InvalidFormat(format!("file '{}' is too large to map", path.display()))
            })?;
            debug!(path = %path.display(), size = len, "file exists, opening");
            (file, len)
        };

        // SAFETY: the file is opened read/write by this handle only, and the
        // map lives exactly as long as the region that owns the file.
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        debug!(path = %path.display(), addr = ?mmap.as_ptr(), "region mapped");

        Ok(MappedRegion { path, file, mmap })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base address of the mapping, for diagnostics only.
    pub fn base_addr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Synchronously write dirty pages back to the file.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Unmap the region and close the backing file.
    pub fn close(self) -> Result<()> {
        let MappedRegion { path, file, mmap } = self;
        drop(mmap);
        drop(file);
        debug!(path = %path.display(), "region closed");
        Ok(())
    }
}

/// Reserve disk blocks for the whole file up front.
#[cfg(target_os = "linux")]
fn reserve(file: &File, size: usize) -> io::Result<()> {
    let len = libc::off_t::try_from(size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "region size exceeds off_t"))?;
    // posix_fallocate reports the error number directly instead of via errno
    // SAFETY: plain syscall on an open descriptor.
    match unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, len) } {
        0 => Ok(()),
        // filesystem cannot preallocate; the sparse file from set_len stands
        libc::EOPNOTSUPP | libc::EINVAL => Ok(()),
        err => Err(io::Error::from_raw_os_error(err)),
    }
}

#[cfg(not(target_os = "linux"))]
fn reserve(_file: &File, _size: usize) -> io::Result<()> {
    Ok(())
}
