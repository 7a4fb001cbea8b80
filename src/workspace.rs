//! Ephemeral workspaces tests materialise sources and resources into.

use crate::{
    containers::write_jar,
    error::{aggregate_close, HarnessError, Result},
    files::FileObject,
    utils,
    vfs::{FileSystem, MemoryFileSystem, OsFileSystem},
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use walkdir::WalkDir;

/// Prefix for temp-directory roots, so stray directories are attributable.
const TEMP_PREFIX: &str = "javac-harness-";

/// How a workspace materialises its path roots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PathStrategy {
    /// Roots live in an isolated in-memory filesystem, one per workspace.
    #[default]
    RamDisk,
    /// Roots are uniquely-named directories under the OS temp location,
    /// removed recursively on close.
    TempDir,
}

#[derive(Debug)]
enum RootBacking {
    Memory(Arc<MemoryFileSystem>),
    Temp(Mutex<Option<tempfile::TempDir>>),
}

#[derive(Debug)]
struct RootInner {
    name: String,
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    backing: RootBacking,
}

/// A disposable root directory, on disk or in memory.
///
/// For in-memory roots the backing filesystem handle is co-owned, so the
/// filesystem stays alive as long as any root (or any container built from
/// one) references it.
#[derive(Clone, Debug)]
pub struct PathRoot {
    inner: Arc<RootInner>,
}

impl PathRoot {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.inner.fs
    }

    /// The in-memory filesystem backing this root, for roots on the
    /// [`PathStrategy::RamDisk`] strategy.
    pub fn memory_filesystem(&self) -> Option<Arc<MemoryFileSystem>> {
        match &self.inner.backing {
            RootBacking::Memory(fs) => Some(fs.clone()),
            RootBacking::Temp(_) => None,
        }
    }

    /// Resolve path segments against this root.
    pub fn resolve<I, S>(&self, segments: I) -> PathBuf
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut path = self.inner.path.clone();
        for segment in segments {
            path.push(segment.as_ref());
        }
        path
    }

    /// Start building a file under this root.
    pub fn create_file<I, S>(&self, segments: I) -> FileBuilder<'_>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        FileBuilder { root: self, path: self.resolve(segments) }
    }

    /// Create a directory (and its parents) under this root.
    pub fn create_directory<I, S>(&self, segments: I) -> Result<PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let path = self.resolve(segments);
        self.inner.fs.create_dir_all(&path)?;
        Ok(path)
    }

    /// Write `bytes` at `relative`, creating parent directories.
    pub fn write_file(&self, relative: impl AsRef<Path>, bytes: impl AsRef<[u8]>) -> Result<FileObject> {
        let path = self.inner.path.join(relative.as_ref());
        if let Some(parent) = path.parent() {
            self.inner.fs.create_dir_all(parent)?;
        }
        self.inner.fs.write(&path, bytes.as_ref())?;
        let relative = path
            .strip_prefix(&self.inner.path)
            .unwrap_or(&path)
            .to_path_buf();
        Ok(self.file_object(path, relative))
    }

    /// Recursively copy a host directory into this root, preserving relative
    /// layout. Files land as links where the strategy and platform allow,
    /// byte copies otherwise.
    pub fn copy_tree_from(&self, source: impl AsRef<Path>) -> Result<()> {
        let source = source.as_ref();
        for entry in WalkDir::new(source).follow_links(true) {
            let entry = entry.map_err(|e| {
                HarnessError::io(
                    e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                    }),
                    source,
                )
            })?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .expect("walker yields paths under its own root");
            if relative.as_os_str().is_empty() {
                continue;
            }
            let target = self.inner.path.join(relative);
            if entry.file_type().is_dir() {
                self.inner.fs.create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    self.inner.fs.create_dir_all(parent)?;
                }
                match &self.inner.backing {
                    RootBacking::Temp(_) => utils::link_or_copy(entry.path(), &target)?,
                    RootBacking::Memory(_) => {
                        let bytes = std::fs::read(entry.path())
                            .map_err(|io| HarnessError::io(io, entry.path()))?;
                        self.inner.fs.write(&target, &bytes)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Package `entries` into a stored archive at `relative`.
    pub fn write_archive<I, S>(&self, relative: impl AsRef<Path>, entries: I) -> Result<FileObject>
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        let bytes = write_jar(entries)?;
        self.write_file(relative, bytes)
    }

    fn file_object(&self, path: PathBuf, relative: PathBuf) -> FileObject {
        use path_slash::PathExt;
        let name = relative.to_slash_lossy().into_owned();
        FileObject::for_path(self.inner.fs.clone(), path, name, true)
    }

    fn close(&self) -> Result<()> {
        match &self.inner.backing {
            // the workspace owns the shared in-memory filesystem
            RootBacking::Memory(_) => Ok(()),
            RootBacking::Temp(dir) => {
                match dir.lock().expect("temp root poisoned").take() {
                    Some(dir) => {
                        let path = dir.path().to_path_buf();
                        dir.close().map_err(|io| HarnessError::io(io, path))
                    }
                    None => Ok(()),
                }
            }
        }
    }
}

/// Builder returned by [`PathRoot::create_file`].
#[derive(Debug)]
pub struct FileBuilder<'a> {
    root: &'a PathRoot,
    path: PathBuf,
}

impl FileBuilder<'_> {
    pub fn with_contents(self, bytes: impl AsRef<[u8]>) -> Result<FileObject> {
        let relative = self
            .path
            .strip_prefix(self.root.path())
            .unwrap_or(&self.path)
            .to_path_buf();
        self.root.write_file(relative, bytes)
    }

    /// Join `lines` with `\n` (plus a trailing newline) and write them.
    pub fn with_lines<I, S>(self, lines: I) -> Result<FileObject>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut contents = String::new();
        for line in lines {
            contents.push_str(line.as_ref());
            contents.push('\n');
        }
        self.with_contents(contents)
    }
}

/// The scoped owner of every path root used by one compilation test.
///
/// Closing is idempotent and removes every root the workspace created: temp
/// directories are unlinked recursively, the in-memory filesystem is closed.
/// Dropping the workspace closes it best-effort.
#[derive(Debug)]
pub struct Workspace {
    strategy: PathStrategy,
    ram_fs: Mutex<Option<Arc<MemoryFileSystem>>>,
    roots: Mutex<Vec<PathRoot>>,
    names: Mutex<HashMap<String, usize>>,
    closed: AtomicBool,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(PathStrategy::default())
    }
}

impl Workspace {
    pub fn new(strategy: PathStrategy) -> Self {
        debug!(?strategy, "created workspace");
        Self {
            strategy,
            ram_fs: Mutex::new(None),
            roots: Mutex::new(Vec::new()),
            names: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn strategy(&self) -> PathStrategy {
        self.strategy
    }

    /// All roots created so far, in creation order.
    pub fn roots(&self) -> Vec<PathRoot> {
        self.roots.lock().expect("roots poisoned").clone()
    }

    /// Create a new root. `name` is sanitised to a filesystem-safe identifier
    /// and suffixed for uniqueness within this workspace if needed.
    pub fn new_root(&self, name: &str) -> Result<PathRoot> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HarnessError::config("workspace is closed"));
        }
        let name = self.unique_name(name);
        let inner = match self.strategy {
            PathStrategy::RamDisk => {
                let fs = self.ram_filesystem();
                let path = PathBuf::from("/").join(&name);
                fs.create_dir_all(&path)?;
                RootInner {
                    name,
                    fs: fs.clone() as Arc<dyn FileSystem>,
                    path,
                    backing: RootBacking::Memory(fs),
                }
            }
            PathStrategy::TempDir => {
                let dir = tempfile::Builder::new()
                    .prefix(&format!("{TEMP_PREFIX}{name}-"))
                    .tempdir()
                    .map_err(|io| HarnessError::io(io, std::env::temp_dir()))?;
                let path = dir.path().to_path_buf();
                RootInner {
                    name,
                    fs: OsFileSystem::shared() as Arc<dyn FileSystem>,
                    path,
                    backing: RootBacking::Temp(Mutex::new(Some(dir))),
                }
            }
        };
        let root = PathRoot { inner: Arc::new(inner) };
        trace!(name = root.name(), path = %root.path().display(), "created path root");
        self.roots.lock().expect("roots poisoned").push(root.clone());
        Ok(root)
    }

    fn unique_name(&self, raw: &str) -> String {
        let base = utils::sanitize_root_name(raw);
        let mut names = self.names.lock().expect("names poisoned");
        let count = names.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}-{}", *count - 1)
        }
    }

    fn ram_filesystem(&self) -> Arc<MemoryFileSystem> {
        self.ram_fs
            .lock()
            .expect("ram fs poisoned")
            .get_or_insert_with(MemoryFileSystem::new)
            .clone()
    }

    /// Close every root. Idempotent; failures are aggregated.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let roots = self.roots.lock().expect("roots poisoned").clone();
        let result = aggregate_close(roots.iter().map(PathRoot::close));
        if let Some(fs) = self.ram_fs.lock().expect("ram fs poisoned").take() {
            fs.close();
        }
        debug!("closed workspace");
        result
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ram_roots_materialise_files() {
        let workspace = Workspace::new(PathStrategy::RamDisk);
        let root = workspace.new_root("sources").unwrap();
        let file = root
            .create_file(["com", "example", "HelloWorld.java"])
            .with_lines(["package com.example;", "", "public class HelloWorld {}"])
            .unwrap();
        assert!(file.uri().starts_with("javacram://"));
        assert!(file.read_to_string().unwrap().contains("class HelloWorld"));
        assert_eq!(file.name(), "com/example/HelloWorld.java");
    }

    #[test]
    fn root_names_get_uniqueness_suffixes() {
        let workspace = Workspace::new(PathStrategy::RamDisk);
        let first = workspace.new_root("src").unwrap();
        let second = workspace.new_root("src").unwrap();
        let weird = workspace.new_root("my root!").unwrap();
        assert_eq!(first.name(), "src");
        assert_eq!(second.name(), "src-1");
        assert_eq!(weird.name(), "my_root_");
    }

    #[test]
    fn temp_roots_are_removed_on_close() {
        let workspace = Workspace::new(PathStrategy::TempDir);
        let root = workspace.new_root("build").unwrap();
        let path = root.path().to_path_buf();
        root.write_file("a/b.txt", b"contents").unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_PREFIX));
        workspace.close().unwrap();
        assert!(!path.exists());
        // idempotent
        workspace.close().unwrap();
    }

    #[test]
    fn ram_filesystem_closes_with_the_workspace() {
        let workspace = Workspace::new(PathStrategy::RamDisk);
        let root = workspace.new_root("src").unwrap();
        let file = root.write_file("A.java", b"class A {}").unwrap();
        workspace.close().unwrap();
        assert!(file.read_bytes().is_err());
    }

    #[test]
    fn copy_tree_preserves_relative_layout() {
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("com/example")).unwrap();
        std::fs::write(source.path().join("com/example/A.java"), "class A {}").unwrap();
        std::fs::write(source.path().join("top.txt"), "top").unwrap();

        let workspace = Workspace::new(PathStrategy::RamDisk);
        let root = workspace.new_root("copied").unwrap();
        root.copy_tree_from(source.path()).unwrap();

        let fs = root.filesystem();
        assert!(fs.is_file(&root.path().join("com/example/A.java")));
        assert_eq!(fs.read(&root.path().join("top.txt")).unwrap(), b"top");
    }

    #[test]
    fn archives_written_into_roots_are_readable() {
        let workspace = Workspace::new(PathStrategy::RamDisk);
        let root = workspace.new_root("libs").unwrap();
        let jar = root
            .write_archive("a.jar", [("com/example/A.class".to_owned(), b"bytes".to_vec())])
            .unwrap();
        assert!(jar.read_bytes().unwrap().len() > 4);
        assert_eq!(jar.name(), "a.jar");
    }
}
