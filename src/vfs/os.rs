use super::{DirEntry, FileMetadata, FileSystem, FileType, ReadSeek};
use crate::error::{HarnessError, Result};
use once_cell::sync::Lazy;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Thin delegation to the host filesystem.
#[derive(Debug, Default)]
pub struct OsFileSystem;

static SHARED: Lazy<Arc<OsFileSystem>> = Lazy::new(|| Arc::new(OsFileSystem));

impl OsFileSystem {
    /// The process-wide handle; the host filesystem carries no per-instance
    /// state, so every caller shares one.
    pub fn shared() -> Arc<OsFileSystem> {
        SHARED.clone()
    }
}

impl FileSystem for OsFileSystem {
    fn scheme(&self) -> &str {
        "file"
    }

    fn display_name(&self) -> String {
        "os".into()
    }

    fn uri(&self, path: &Path) -> String {
        use path_slash::PathExt;
        format!("file://{}", path.to_slash_lossy())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let meta = fs::metadata(path).map_err(|io| HarnessError::io(io, path))?;
        let file_type = if meta.is_dir() { FileType::Dir } else { FileType::File };
        Ok(FileMetadata { file_type, len: meta.len(), modified: meta.modified().ok() })
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        crate::utils::canonicalize(path)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|io| HarnessError::io(io, path))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek + Send>> {
        let file = fs::File::open(path).map_err(|io| HarnessError::io(io, path))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        let file = fs::File::create(path).map_err(|io| HarnessError::io(io, path))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::write(path, bytes).map_err(|io| HarnessError::io(io, path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|io| HarnessError::io(io, path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(|io| HarnessError::io(io, path))? {
            let entry = entry.map_err(|io| HarnessError::io(io, path))?;
            let file_type = entry.file_type().map_err(|io| HarnessError::io(io, entry.path()))?;
            let file_type = if file_type.is_symlink() {
                FileType::Symlink
            } else if file_type.is_dir() {
                FileType::Dir
            } else {
                FileType::File
            };
            entries.push(DirEntry { path: entry.path(), file_type });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        os_symlink(target, link).map_err(|io| HarnessError::io(io, link))
    }

    fn hard_link(&self, target: &Path, link: &Path) -> Result<()> {
        fs::hard_link(target, link).map_err(|io| HarnessError::io(io, link))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).map_err(|io| HarnessError::io(io, path))
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn os_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
            std::os::unix::fs::symlink(target, link)
        }
    } else if #[cfg(windows)] {
        fn os_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
            std::os::windows::fs::symlink_file(target, link)
        }
    } else {
        fn os_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "symlinks unsupported on this platform",
            ))
        }
    }
}
