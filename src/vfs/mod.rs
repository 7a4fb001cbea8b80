//! The filesystem seam the rest of the harness is written against.
//!
//! Containers, path roots, and file objects never touch `std::fs` directly;
//! they speak to a [`FileSystem`] handle instead, so the same code serves
//! both temp-directory roots and fully in-memory workspaces.

use crate::error::Result;
use std::{
    fmt,
    io::{Read, Seek, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};

mod mem;
mod os;

pub use mem::{lookup_ram_filesystem, MemoryFileSystem, RAM_URI_SCHEME};
pub use os::OsFileSystem;

/// Seekable read stream, as needed by archive readers.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// The type of a directory entry, reported without following symlinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
    Symlink,
}

impl FileType {
    pub fn is_file(self) -> bool {
        matches!(self, Self::File)
    }

    pub fn is_dir(self) -> bool {
        matches!(self, Self::Dir)
    }
}

/// Metadata for a single path, after following symlinks.
#[derive(Clone, Debug)]
pub struct FileMetadata {
    pub file_type: FileType,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// One entry of a directory stream.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub path: PathBuf,
    pub file_type: FileType,
}

/// Operations every backing filesystem supports.
///
/// Directory streams are sorted lexicographically so that all listing
/// operations built on top of them are deterministic.
pub trait FileSystem: fmt::Debug + Send + Sync {
    /// URI scheme for files on this filesystem.
    fn scheme(&self) -> &str;

    /// Human-readable identity, used in container names and messages.
    fn display_name(&self) -> String;

    /// Render the URI of a path on this filesystem.
    fn uri(&self, path: &Path) -> String;

    fn exists(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Fully resolve a path, following symlinks. Fails if it does not exist.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek + Send>>;

    /// Open a truncating writer. The parent directory must already exist.
    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>>;

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Sorted directory stream. Entry types are reported without following
    /// symlinks.
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    fn hard_link(&self, target: &Path, link: &Path) -> Result<()>;

    fn remove_dir_all(&self, path: &Path) -> Result<()>;
}
