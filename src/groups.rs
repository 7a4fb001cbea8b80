//! Container groups: ordered container sets bound to one location.

use crate::{
    classloading::{ContainerClassLoader, ServiceLoader},
    containers::{is_archive_path, ArchiveContainer, Container, DirectoryContainer},
    error::{aggregate_close, HarnessError, Result},
    files::{FileKind, FileObject},
    location::Location,
    utils::LazyOnce,
    vfs::OsFileSystem,
    workspace::PathRoot,
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex, RwLock},
};

/// An ordered set of containers under one location.
///
/// Lookups scan containers in order; the first hit wins. Write lookups only
/// ever resolve against the first container.
#[derive(Debug)]
pub struct PackageGroup {
    location: Location,
    release: Option<String>,
    containers: RwLock<Vec<Arc<dyn Container>>>,
    class_loader: LazyOnce<Arc<ContainerClassLoader>>,
}

impl PackageGroup {
    pub fn new(location: Location, release: Option<String>) -> Self {
        Self {
            location,
            release,
            containers: RwLock::new(Vec::new()),
            class_loader: LazyOnce::new(),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_read().is_empty()
    }

    pub fn container_count(&self) -> usize {
        self.lock_read().len()
    }

    /// Snapshot of the containers in declaration order.
    pub fn containers(&self) -> Vec<Arc<dyn Container>> {
        self.lock_read().clone()
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn Container>>> {
        self.containers.read().expect("container set poisoned")
    }

    pub fn add_container(&self, container: Arc<dyn Container>) {
        self.containers.write().expect("container set poisoned").push(container);
        // the loader snapshot is stale now; rebuild on next use
        self.class_loader.destroy();
    }

    /// Insert a container ahead of every existing one, making it the new
    /// first-hit winner.
    pub fn prepend_container(&self, container: Arc<dyn Container>) {
        self.containers.write().expect("container set poisoned").insert(0, container);
        self.class_loader.destroy();
    }

    /// Classify and add a host path: an archive extension opens an archive
    /// container, anything else becomes a directory container.
    pub fn add_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let container: Arc<dyn Container> = if is_archive_path(&path) {
            Arc::new(ArchiveContainer::open(
                self.location.clone(),
                OsFileSystem::shared(),
                path,
                self.release.as_deref(),
            )?)
        } else {
            Arc::new(DirectoryContainer::new(
                self.location.clone(),
                OsFileSystem::shared(),
                path,
            ))
        };
        self.add_container(container);
        Ok(())
    }

    pub fn add_paths<I, P>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in paths {
            self.add_path(path)?;
        }
        Ok(())
    }

    /// Add a workspace path root. The resulting container co-owns the root's
    /// filesystem so in-memory roots stay alive while referenced.
    pub fn add_path_root(&self, root: &PathRoot) {
        self.add_container(Arc::new(DirectoryContainer::with_owned_fs(
            self.location.clone(),
            root.filesystem().clone(),
            root.path(),
            root.memory_filesystem(),
        )));
    }

    pub fn file_for_input(&self, package: &str, relative_name: &str) -> Result<Option<FileObject>> {
        for container in self.lock_read().iter() {
            if let Some(file) = container.file_for_input(package, relative_name)? {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    pub fn java_file_for_input(
        &self,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        for container in self.lock_read().iter() {
            if let Some(file) = container.java_file_for_input(binary_name, kind)? {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    pub(crate) fn file_for_output(
        &self,
        package: &str,
        relative_name: &str,
    ) -> Result<Option<FileObject>> {
        match self.lock_read().first() {
            Some(container) => container.file_for_output(package, relative_name),
            None => Ok(None),
        }
    }

    pub(crate) fn java_file_for_output(
        &self,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        match self.lock_read().first() {
            Some(container) => container.java_file_for_output(binary_name, kind),
            None => Ok(None),
        }
    }

    /// Union of container listings, stable order, no deduplication: the same
    /// binary name in two containers yields two entries, shadowing is the
    /// compiler's business via first-hit input lookups.
    pub fn list(&self, package: &str, kinds: &[FileKind], recurse: bool) -> Result<Vec<FileObject>> {
        let mut all = Vec::new();
        for container in self.lock_read().iter() {
            all.extend(container.list(package, kinds, recurse)?);
        }
        Ok(all)
    }

    pub fn infer_binary_name(&self, file: &FileObject) -> Option<String> {
        self.lock_read().iter().find_map(|container| container.infer_binary_name(file))
    }

    pub fn contains(&self, file: &FileObject) -> bool {
        self.lock_read().iter().any(|container| container.contains(file))
    }

    /// The lazily-built classloader over this group's containers. Thread-safe;
    /// the first call synthesises the loader, closing the group invalidates it.
    pub fn class_loader(&self) -> Result<Arc<ContainerClassLoader>> {
        self.class_loader
            .get_or_init(|| Ok(Arc::new(ContainerClassLoader::new(self.containers()))))
    }

    /// Discover service providers visible to this group.
    ///
    /// Service loading on module-scoped locations is not supported.
    pub fn service_loader(&self, service: &str) -> Result<ServiceLoader> {
        if self.location.is_module_scoped() {
            return Err(HarnessError::UnsupportedOnModuleLocation {
                location: self.location.to_string(),
            });
        }
        let loader = self.class_loader()?;
        ServiceLoader::discover(loader.as_ref(), service)
    }

    /// Close every container, best-effort, aggregating failures.
    pub fn close(&self) -> Result<()> {
        self.class_loader.destroy();
        let containers = self.lock_read().clone();
        aggregate_close(containers.iter().map(|c| c.close()))
    }
}

/// A [`PackageGroup`] for an output location; writes land in the first
/// container only and are serialised under an exclusive lock.
///
/// When a compilation uses a module source path, per-module output groups
/// nest under this one, rooted at `<first container>/<module>`, which yields
/// the module-partitioned output layout.
#[derive(Debug)]
pub struct OutputGroup {
    package: Arc<PackageGroup>,
    write_lock: Mutex<()>,
    modules: RwLock<Vec<(String, Arc<PackageGroup>)>>,
}

impl OutputGroup {
    pub fn new(location: Location, release: Option<String>) -> Result<Self> {
        if !location.is_output() {
            return Err(HarnessError::config(format!(
                "{location} is not an output location"
            )));
        }
        Ok(Self {
            package: Arc::new(PackageGroup::new(location, release)),
            write_lock: Mutex::new(()),
            modules: RwLock::new(Vec::new()),
        })
    }

    pub fn package(&self) -> &PackageGroup {
        &self.package
    }

    pub(crate) fn package_group(&self) -> Arc<PackageGroup> {
        self.package.clone()
    }

    pub fn file_for_output(
        &self,
        package: &str,
        relative_name: &str,
    ) -> Result<Option<FileObject>> {
        let _guard = self.write_lock.lock().expect("output lock poisoned");
        self.package.file_for_output(package, relative_name)
    }

    pub fn java_file_for_output(
        &self,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        let _guard = self.write_lock.lock().expect("output lock poisoned");
        self.package.java_file_for_output(binary_name, kind)
    }

    /// The writable directory backing the first container, if any.
    pub(crate) fn output_backing(&self) -> Option<(Arc<dyn crate::vfs::FileSystem>, PathBuf)> {
        self.package.lock_read().first().and_then(|c| c.directory_backing())
    }

    /// Fetch or create the output group partition for `module`.
    pub fn module_group(&self, module: &str) -> Result<Arc<PackageGroup>> {
        if let Some(existing) = self.get_module(module) {
            return Ok(existing);
        }
        let container = module_output_container(self, module)?;
        let mut modules = self.modules.write().expect("output modules poisoned");
        if let Some((_, existing)) = modules.iter().find(|(name, _)| name == module) {
            return Ok(existing.clone());
        }
        let group = Arc::new(PackageGroup::new(
            Location::module(self.package.location().kind(), module),
            self.package.release().map(str::to_owned),
        ));
        if let Some(container) = container {
            group.add_container(container);
        }
        modules.push((module.to_owned(), group.clone()));
        Ok(group)
    }

    pub fn get_module(&self, module: &str) -> Option<Arc<PackageGroup>> {
        self.modules
            .read()
            .expect("output modules poisoned")
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, group)| group.clone())
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules
            .read()
            .expect("output modules poisoned")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn close(&self) -> Result<()> {
        let modules = self.modules.read().expect("output modules poisoned").clone();
        aggregate_close(
            std::iter::once(self.package.close())
                .chain(modules.iter().map(|(_, group)| group.close())),
        )
    }
}

/// A module-oriented group: one nested [`PackageGroup`] per module, created
/// on demand, insertion order preserved.
#[derive(Debug)]
pub struct ModuleGroup {
    location: Location,
    release: Option<String>,
    modules: RwLock<Vec<(String, Arc<PackageGroup>)>>,
}

impl ModuleGroup {
    pub fn new(location: Location, release: Option<String>) -> Self {
        Self { location, release, modules: RwLock::new(Vec::new()) }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().expect("module set poisoned").is_empty()
    }

    /// Fetch or create the group for `module`. Idempotent under concurrency.
    pub fn get_or_create(&self, module: &str) -> Arc<PackageGroup> {
        if let Some(existing) = self.get(module) {
            return existing;
        }
        let mut modules = self.modules.write().expect("module set poisoned");
        if let Some((_, existing)) = modules.iter().find(|(name, _)| name == module) {
            return existing.clone();
        }
        let inner = Arc::new(PackageGroup::new(
            Location::module(self.location.kind(), module),
            self.release.clone(),
        ));
        modules.push((module.to_owned(), inner.clone()));
        inner
    }

    pub fn get(&self, module: &str) -> Option<Arc<PackageGroup>> {
        self.modules
            .read()
            .expect("module set poisoned")
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, group)| group.clone())
    }

    /// Module names in insertion order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules
            .read()
            .expect("module set poisoned")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// `(name, group)` pairs in insertion order.
    pub fn modules(&self) -> Vec<(String, Arc<PackageGroup>)> {
        self.modules.read().expect("module set poisoned").clone()
    }

    /// One synthetic module location per known module.
    pub fn locations_for_modules(&self) -> Vec<Location> {
        self.module_names()
            .into_iter()
            .map(|module| Location::module(self.location.kind(), module))
            .collect()
    }

    pub fn close(&self) -> Result<()> {
        let modules = self.modules.read().expect("module set poisoned").clone();
        aggregate_close(modules.iter().map(|(_, group)| group.close()))
    }
}

/// Helper for the driver: a directory container nested under an output root,
/// used for module-partitioned outputs.
pub(crate) fn module_output_container(
    parent: &OutputGroup,
    module: &str,
) -> Result<Option<Arc<dyn Container>>> {
    let Some((fs, root)) = parent.output_backing() else {
        return Ok(None);
    };
    let module_root = root.join(module);
    fs.create_dir_all(&module_root)?;
    Ok(Some(Arc::new(DirectoryContainer::new(
        Location::module(parent.package().location().kind(), module),
        fs,
        module_root,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        location::StandardLocation,
        vfs::{FileSystem, MemoryFileSystem},
    };
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn memory_container(
        location: Location,
        files: &[(&str, &[u8])],
    ) -> Arc<dyn Container> {
        let fs = MemoryFileSystem::new();
        for (name, bytes) in files {
            let path = Path::new("/root").join(name);
            fs.create_dir_all(path.parent().unwrap()).unwrap();
            fs.write(&path, bytes).unwrap();
        }
        Arc::new(DirectoryContainer::new(location, fs, "/root"))
    }

    #[test]
    fn first_hit_wins_and_prepending_changes_the_winner() {
        let location: Location = StandardLocation::ClassPath.into();
        let group = PackageGroup::new(location.clone(), None);
        group.add_container(memory_container(location.clone(), &[(
            "com/example/Foo.class",
            b"original",
        )]));

        let file = group.java_file_for_input("com.example.Foo", FileKind::Class).unwrap().unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"original");

        // appending does not change the winner
        group.add_container(memory_container(location.clone(), &[(
            "com/example/Foo.class",
            b"appended",
        )]));
        let file = group.java_file_for_input("com.example.Foo", FileKind::Class).unwrap().unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"original");

        // prepending does
        group.prepend_container(memory_container(location, &[(
            "com/example/Foo.class",
            b"prepended",
        )]));
        let file = group.java_file_for_input("com.example.Foo", FileKind::Class).unwrap().unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"prepended");
    }

    #[test]
    fn listing_does_not_deduplicate_across_containers() {
        let location: Location = StandardLocation::ClassPath.into();
        let group = PackageGroup::new(location.clone(), None);
        for bytes in [b"one" as &[u8], b"two"] {
            group.add_container(memory_container(location.clone(), &[(
                "com/example/Foo.class",
                bytes,
            )]));
        }
        let listed = group.list("com.example", &[FileKind::Class], false).unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn output_groups_require_an_output_location() {
        assert!(OutputGroup::new(StandardLocation::ClassPath.into(), None).is_err());
        assert!(OutputGroup::new(StandardLocation::ClassOutput.into(), None).is_ok());
    }

    #[test]
    fn module_groups_create_entries_on_demand_in_insertion_order() {
        let group = ModuleGroup::new(StandardLocation::ModuleSourcePath.into(), None);
        let first = group.get_or_create("hello.world");
        let again = group.get_or_create("hello.world");
        assert!(Arc::ptr_eq(&first, &again));
        group.get_or_create("greeter");
        assert_eq!(group.module_names(), vec!["hello.world".to_owned(), "greeter".to_owned()]);
        assert_eq!(
            first.location(),
            &Location::module(StandardLocation::ModuleSourcePath, "hello.world")
        );
        assert_eq!(
            group.locations_for_modules(),
            vec![
                Location::module(StandardLocation::ModuleSourcePath, "hello.world"),
                Location::module(StandardLocation::ModuleSourcePath, "greeter"),
            ]
        );
    }

    #[test]
    fn host_paths_classify_by_extension_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("exploded/com/example")).unwrap();
        std::fs::write(dir.path().join("exploded/com/example/Dir.class"), b"dir").unwrap();
        let jar = crate::containers::write_jar([(
            "com/example/Jarred.class".to_owned(),
            b"jar".to_vec(),
        )])
        .unwrap();
        std::fs::write(dir.path().join("lib.JAR"), jar).unwrap();

        let group = PackageGroup::new(StandardLocation::ClassPath.into(), None);
        group.add_path(dir.path().join("exploded")).unwrap();
        group.add_path(dir.path().join("lib.JAR")).unwrap();

        let from_dir =
            group.java_file_for_input("com.example.Dir", FileKind::Class).unwrap().unwrap();
        assert_eq!(from_dir.read_bytes().unwrap(), b"dir");
        let from_jar =
            group.java_file_for_input("com.example.Jarred", FileKind::Class).unwrap().unwrap();
        assert_eq!(from_jar.read_bytes().unwrap(), b"jar");
        assert!(from_jar.uri().starts_with("jar:"));
    }

    #[test]
    fn service_loading_fails_on_module_scoped_groups() {
        let group = PackageGroup::new(
            Location::module(StandardLocation::ModuleSourcePath, "hello.world"),
            None,
        );
        assert!(matches!(
            group.service_loader("com.example.Processor"),
            Err(HarnessError::UnsupportedOnModuleLocation { .. })
        ));
    }

    #[test]
    fn class_loader_is_rebuilt_after_container_changes() {
        let location: Location = StandardLocation::ClassPath.into();
        let group = PackageGroup::new(location.clone(), None);
        group.add_container(memory_container(location.clone(), &[(
            "com/example/Foo.class",
            b"one",
        )]));
        let loader = group.class_loader().unwrap();
        group.add_container(memory_container(location, &[("com/example/Bar.class", b"two")]));
        let rebuilt = group.class_loader().unwrap();
        assert!(!Arc::ptr_eq(&loader, &rebuilt));
    }
}
