//! Thin memory-mapped file wrappers.
//!
//! The CnC file and every log buffer are shared-memory files jointly mapped
//! by the driver and one or more clients. This crate only owns the mapping
//! lifetime and raw pointer access; the byte-level layout, ordering, and
//! record framing on top of the mapped region live in `aeron-buffers` and
//! `aeron-log-buffer`. CnC file *creation* and sizing is the driver's job
//! (spec.md §1 out-of-scope); this crate maps files the driver already
//! created as well as files this process creates for its own log buffers.

use memmap2::{Mmap, MmapMut};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A read-write memory mapping over a file.
pub struct MmapFileMut {
    /// File handle kept alive to maintain the memory map validity
    _file: File,
    /// Memory-mapped region providing mutable access to file contents
    mmap: MmapMut,
}

/// A read-only memory mapping over a file.
pub struct MmapFile {
    /// File handle kept alive to maintain the memory map validity
    _file: File,
    /// Memory-mapped region providing read-only access to file contents
    mmap: Mmap,
}

impl MmapFileMut {
    /// Create a new file sized to `size_bytes` and map it read-write.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Open an existing file and map it read-write, without changing its length.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Raw pointer to the start of the mapped region.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl MmapFile {
    /// Open an existing file and map it read-only.
    pub fn open_ro<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { _file: file, mmap })
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Default OS page size assumed for region alignment (spec.md §6: "Each
/// buffer is page-aligned"). 4 KiB holds on every platform this client
/// targets; a runtime-queried page size would only matter for huge-page
/// deployments, which are out of scope here.
pub const PAGE_SIZE: usize = 4096;

/// Rounds `len` up to the next multiple of [`PAGE_SIZE`].
pub fn page_align(len: usize) -> usize {
    let rem = len % PAGE_SIZE;
    if rem == 0 { len } else { len + (PAGE_SIZE - rem) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn mmap_roundtrip_bytes() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path();

        {
            let mut mm = MmapFileMut::create_rw(path, 4096).unwrap();
            let s = mm.as_mut_slice();
            s[0] = 0xAB;
            s[1] = 0xCD;
        }
        {
            let mm = MmapFile::open_ro(path).unwrap();
            let s = mm.as_slice();
            assert_eq!(s[0], 0xAB);
            assert_eq!(s[1], 0xCD);
        }
    }

    #[test]
    fn page_align_rounds_up() {
        assert_eq!(page_align(0), 0);
        assert_eq!(page_align(1), PAGE_SIZE);
        assert_eq!(page_align(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_align(PAGE_SIZE + 1), 2 * PAGE_SIZE);
    }
}
