//! File objects handed to and received from the compiler.

use crate::{
    error::{HarnessError, Result},
    vfs::{FileSystem, ReadSeek},
};
use std::{
    fmt,
    hash::{Hash, Hasher},
    io::{Cursor, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::UNIX_EPOCH,
};

/// The semantic type of a file the compiler recognises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileKind {
    Source,
    Class,
    Html,
    Other,
}

impl FileKind {
    /// Every kind with a real file extension, i.e. everything except
    /// [`FileKind::Other`].
    pub const EXTENSION_KINDS: [FileKind; 3] = [FileKind::Source, FileKind::Class, FileKind::Html];

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Source => ".java",
            Self::Class => ".class",
            Self::Html => ".html",
            Self::Other => "",
        }
    }

    /// Classify a name or path by its extension; anything unrecognised is
    /// [`FileKind::Other`].
    pub fn from_name(name: &str) -> Self {
        let base = name.rsplit('/').next().unwrap_or(name);
        for kind in Self::EXTENSION_KINDS {
            if base.len() > kind.extension().len() && base.ends_with(kind.extension()) {
                return kind;
            }
        }
        Self::Other
    }

    pub fn from_path(path: &Path) -> Self {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(Self::from_name)
            .unwrap_or(Self::Other)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "SOURCE",
            Self::Class => "CLASS",
            Self::Html => "HTML",
            Self::Other => "OTHER",
        };
        f.write_str(name)
    }
}

/// Read-only byte store behind archive-backed file objects.
pub(crate) trait ByteSource: Send + Sync + fmt::Debug {
    fn read_entry(&self, entry: &str) -> Result<Vec<u8>>;
}

#[derive(Debug)]
enum Backing {
    /// A real path on some filesystem (host or in-memory).
    Path { fs: Arc<dyn FileSystem>, path: PathBuf },
    /// An entry inside a read-only archive.
    Entry { source: Arc<dyn ByteSource>, entry: String },
}

#[derive(Debug)]
struct Inner {
    backing: Backing,
    name: String,
    kind: FileKind,
    writable: bool,
    uri: String,
}

/// A single file visible to the compiler.
///
/// Identity (equality and hashing) is the URI, so the same file surfaced
/// twice through different containers compares equal only when it genuinely
/// is the same path on the same backing store.
#[derive(Clone, Debug)]
pub struct FileObject {
    inner: Arc<Inner>,
}

impl FileObject {
    /// A path-backed file object; `name` is the path relative to the
    /// surfacing container root.
    pub fn for_path(
        fs: Arc<dyn FileSystem>,
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        writable: bool,
    ) -> Self {
        let path = path.into();
        let name = name.into();
        let kind = FileKind::from_path(&path);
        let uri = fs.uri(&path);
        Self {
            inner: Arc::new(Inner {
                backing: Backing::Path { fs, path },
                name,
                kind,
                writable,
                uri,
            }),
        }
    }

    /// An archive-entry-backed, read-only file object. `name` is the logical
    /// path inside the archive; `entry` is the physical entry to read.
    pub(crate) fn for_entry(
        source: Arc<dyn ByteSource>,
        uri: String,
        name: impl Into<String>,
        entry: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let kind = FileKind::from_name(&name);
        Self {
            inner: Arc::new(Inner {
                backing: Backing::Entry { source, entry: entry.into() },
                name,
                kind,
                writable: false,
                uri,
            }),
        }
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// The name of this file relative to its container root, with `/`
    /// separators.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The backing path, for path-backed objects.
    pub fn path(&self) -> Option<&Path> {
        match &self.inner.backing {
            Backing::Path { path, .. } => Some(path),
            Backing::Entry { .. } => None,
        }
    }

    pub fn kind(&self) -> FileKind {
        self.inner.kind
    }

    pub fn open_input(&self) -> Result<Box<dyn ReadSeek + Send>> {
        match &self.inner.backing {
            Backing::Path { fs, path } => fs.open_read(path),
            Backing::Entry { source, entry } => {
                Ok(Box::new(Cursor::new(source.read_entry(entry)?)))
            }
        }
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match &self.inner.backing {
            Backing::Path { fs, path } => fs.read(path),
            Backing::Entry { source, entry } => source.read_entry(entry),
        }
    }

    pub fn read_to_string(&self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| {
            HarnessError::config(format!("file {} is not valid UTF-8", self.inner.uri))
        })
    }

    /// Open a truncating writer. Fails for files surfaced by read-only
    /// containers.
    pub fn open_output(&self) -> Result<Box<dyn Write + Send>> {
        match &self.inner.backing {
            Backing::Path { fs, path } if self.inner.writable => fs.open_write(path),
            _ => Err(HarnessError::ReadOnlyContainer { container: self.inner.uri.clone() }),
        }
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        match &self.inner.backing {
            Backing::Path { fs, path } if self.inner.writable => fs.write(path, bytes),
            _ => Err(HarnessError::ReadOnlyContainer { container: self.inner.uri.clone() }),
        }
    }

    /// Seconds since the epoch at which this file was last modified, or `0`
    /// when unknown.
    pub fn last_modified(&self) -> u64 {
        match &self.inner.backing {
            Backing::Path { fs, path } => fs
                .metadata(path)
                .ok()
                .and_then(|meta| meta.modified)
                .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
                .map(|duration| duration.as_secs())
                .unwrap_or(0),
            Backing::Entry { .. } => 0,
        }
    }
}

impl PartialEq for FileObject {
    fn eq(&self, other: &Self) -> bool {
        self.inner.uri == other.inner.uri
    }
}

impl Eq for FileObject {}

impl Hash for FileObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.uri.hash(state);
    }
}

impl fmt::Display for FileObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFileSystem;
    use pretty_assertions::assert_eq;

    #[test]
    fn kinds_classify_by_extension() {
        assert_eq!(FileKind::from_path(Path::new("Foo.java")), FileKind::Source);
        assert_eq!(FileKind::from_path(Path::new("Foo.class")), FileKind::Class);
        assert_eq!(FileKind::from_path(Path::new("doc.html")), FileKind::Html);
        assert_eq!(FileKind::from_path(Path::new("app.properties")), FileKind::Other);
        // a bare extension is not a file of that kind
        assert_eq!(FileKind::from_path(Path::new(".java")), FileKind::Other);
        assert_eq!(FileKind::from_name("com/example/Foo.java"), FileKind::Source);
    }

    #[test]
    fn read_only_file_objects_reject_writes() {
        let fs = MemoryFileSystem::new();
        fs.write(Path::new("/Foo.class"), b"x").unwrap();
        let file = FileObject::for_path(fs.clone(), "/Foo.class", "Foo.class", false);
        assert!(matches!(file.open_output(), Err(HarnessError::ReadOnlyContainer { .. })));
        assert_eq!(file.read_bytes().unwrap(), b"x");
    }

    #[test]
    fn last_modified_is_zero_for_missing_files() {
        let fs = MemoryFileSystem::new();
        let file = FileObject::for_path(fs.clone(), "/nope.txt", "nope.txt", false);
        assert_eq!(file.last_modified(), 0);

        fs.write(Path::new("/there.txt"), b"x").unwrap();
        let file = FileObject::for_path(fs, "/there.txt", "there.txt", false);
        assert!(file.last_modified() > 0);
    }

    #[test]
    fn identity_is_the_uri() {
        let fs = MemoryFileSystem::new();
        fs.write(Path::new("/a.txt"), b"x").unwrap();
        let one = FileObject::for_path(fs.clone(), "/a.txt", "a.txt", false);
        let two = FileObject::for_path(fs.clone(), "/a.txt", "a.txt", true);
        let other = FileObject::for_path(fs, "/b.txt", "b.txt", false);
        assert_eq!(one, two);
        assert_ne!(one, other);
    }
}
