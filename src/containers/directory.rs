use super::Container;
use crate::{
    error::{HarnessError, Result},
    files::{FileKind, FileObject},
    location::Location,
    utils,
    vfs::{FileSystem, FileType, MemoryFileSystem},
};
use path_slash::PathExt;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

/// A container over a directory tree on some filesystem.
///
/// Writable iff its location is an output location. When constructed from an
/// in-memory path root it co-owns the backing filesystem, so the filesystem
/// cannot be collected while the container is reachable.
#[derive(Debug)]
pub struct DirectoryContainer {
    location: Location,
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    root_uri: String,
    writable: bool,
    // keeps the in-memory filesystem alive for the container's lifetime
    _owned_fs: Option<Arc<MemoryFileSystem>>,
}

impl DirectoryContainer {
    pub fn new(location: Location, fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self::with_owned_fs(location, fs, root, None)
    }

    /// A directory container that co-owns the in-memory filesystem backing it.
    pub fn with_owned_fs(
        location: Location,
        fs: Arc<dyn FileSystem>,
        root: impl Into<PathBuf>,
        owned_fs: Option<Arc<MemoryFileSystem>>,
    ) -> Self {
        let root = root.into();
        let root_uri = fs.uri(&root);
        let writable = location.is_output();
        Self { location, fs, root, root_uri, writable, _owned_fs: owned_fs }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative_name: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_name);
        if relative.is_absolute() {
            return Err(HarnessError::config(format!(
                "resource name \"{relative_name}\" must be relative"
            )));
        }
        Ok(self.root.join(relative))
    }

    fn surfaces(&self, file: &FileObject) -> bool {
        file.uri() == self.root_uri
            || file.uri().strip_prefix(&self.root_uri).is_some_and(|rest| rest.starts_with('/'))
    }

    fn walk(
        &self,
        dir: &Path,
        kinds: &[FileKind],
        recurse: bool,
        visited: &mut HashSet<PathBuf>,
        out: &mut Vec<FileObject>,
    ) -> Result<()> {
        for entry in self.fs.read_dir(dir)? {
            let treat_as_dir = match entry.file_type {
                FileType::Dir => true,
                FileType::Symlink => self.fs.is_dir(&entry.path),
                FileType::File => false,
            };
            if treat_as_dir {
                if recurse {
                    // guard against symlink cycles via canonical identity
                    let canonical = self.fs.canonicalize(&entry.path)?;
                    if visited.insert(canonical) {
                        self.walk(&entry.path, kinds, recurse, visited, out)?;
                    }
                }
            } else if self.fs.is_file(&entry.path) {
                let kind = FileKind::from_path(&entry.path);
                if kinds.contains(&kind) {
                    let relative = entry
                        .path
                        .strip_prefix(&self.root)
                        .unwrap_or(&entry.path)
                        .to_slash_lossy()
                        .into_owned();
                    out.push(FileObject::for_path(
                        self.fs.clone(),
                        entry.path.clone(),
                        relative,
                        self.writable,
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Container for DirectoryContainer {
    fn location(&self) -> &Location {
        &self.location
    }

    fn display_name(&self) -> String {
        format!("{}({})", self.fs.display_name(), self.root.display())
    }

    fn find_file(&self, relative_name: &str) -> Result<Option<FileObject>> {
        let candidate = self.resolve(relative_name)?;
        if self.fs.is_file(&candidate) {
            Ok(Some(FileObject::for_path(
                self.fs.clone(),
                candidate,
                relative_name,
                self.writable,
            )))
        } else {
            Ok(None)
        }
    }

    fn file_for_input(&self, package: &str, relative_name: &str) -> Result<Option<FileObject>> {
        let relative = utils::resource_path(package, relative_name)?;
        self.find_file(&relative.to_slash_lossy())
    }

    fn file_for_output(&self, package: &str, relative_name: &str) -> Result<Option<FileObject>> {
        if !self.writable {
            return Err(HarnessError::ReadOnlyContainer { container: self.display_name() });
        }
        let relative = utils::resource_path(package, relative_name)?;
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            self.fs.create_dir_all(parent)?;
        }
        Ok(Some(FileObject::for_path(
            self.fs.clone(),
            target,
            relative.to_slash_lossy(),
            true,
        )))
    }

    fn java_file_for_input(&self, binary_name: &str, kind: FileKind) -> Result<Option<FileObject>> {
        let relative = utils::binary_name_to_path(binary_name, kind.extension());
        self.find_file(&relative.to_slash_lossy())
    }

    fn java_file_for_output(
        &self,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        let (package, class) = utils::split_binary_name(binary_name);
        self.file_for_output(package, &format!("{class}{}", kind.extension()))
    }

    fn list(&self, package: &str, kinds: &[FileKind], recurse: bool) -> Result<Vec<FileObject>> {
        let dir = self.root.join(utils::package_to_path(package));
        if !self.fs.is_dir(&dir) {
            return Ok(Vec::new());
        }
        let mut visited = HashSet::new();
        if let Ok(canonical) = self.fs.canonicalize(&dir) {
            visited.insert(canonical);
        }
        let mut out = Vec::new();
        self.walk(&dir, kinds, recurse, &mut visited, &mut out)?;
        Ok(out)
    }

    fn infer_binary_name(&self, file: &FileObject) -> Option<String> {
        if !self.surfaces(file) || file.kind() == FileKind::Other {
            return None;
        }
        let relative = file.path()?.strip_prefix(&self.root).ok()?;
        utils::path_to_binary_name(relative, file.kind().extension())
    }

    fn contains(&self, file: &FileObject) -> bool {
        self.surfaces(file)
            && file.path().is_some_and(|path| self.fs.is_file(path))
    }

    fn read_resource(&self, relative_name: &str) -> Result<Option<Vec<u8>>> {
        match self.find_file(relative_name)? {
            Some(file) => Ok(Some(file.read_bytes()?)),
            None => Ok(None),
        }
    }

    fn directory_backing(&self) -> Option<(Arc<dyn FileSystem>, PathBuf)> {
        Some((self.fs.clone(), self.root.clone()))
    }

    fn close(&self) -> Result<()> {
        // nothing to release; the backing filesystem outlives the container
        Ok(())
    }
}
