//! The file manager: the single object the compiler talks to for file access.

use crate::{
    classloading::{ContainerClassLoader, ServiceLoader},
    containers::Container,
    error::{aggregate_close, HarnessError, Result},
    files::{FileKind, FileObject},
    groups::{ModuleGroup, OutputGroup, PackageGroup},
    location::{Location, StandardLocation},
    utils,
    vfs::{FileSystem, MemoryFileSystem},
    workspace::PathRoot,
};
use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    sync::{Arc, RwLock},
};

mod logging;

pub use logging::TracingFileManager;

/// The file-manager capability the compiler consumes. Callable from any
/// thread while a compilation task runs.
pub trait JavaFileManager: Send + Sync + fmt::Debug {
    /// The effective release used when opening multi-release archives.
    fn release(&self) -> Option<&str>;

    fn has_location(&self, location: &Location) -> bool;

    fn list(
        &self,
        location: &Location,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileObject>>;

    fn file_for_input(
        &self,
        location: &Location,
        package: &str,
        relative_name: &str,
    ) -> Result<Option<FileObject>>;

    fn file_for_output(
        &self,
        location: &Location,
        package: &str,
        relative_name: &str,
    ) -> Result<Option<FileObject>>;

    fn java_file_for_input(
        &self,
        location: &Location,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>>;

    fn java_file_for_output(
        &self,
        location: &Location,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>>;

    fn infer_binary_name(&self, location: &Location, file: &FileObject) -> Option<String>;

    fn contains(&self, location: &Location, file: &FileObject) -> Result<bool>;

    fn class_loader(&self, location: &Location) -> Result<Option<Arc<ContainerClassLoader>>>;

    fn service_loader(&self, location: &Location, service: &str) -> Result<ServiceLoader>;

    /// The modules known under a module-oriented (or output) location.
    fn module_names(&self, location: &Location) -> Result<Vec<String>>;

    /// Resolve the location of one module, with fuzzy suggestions on failure.
    fn location_for_module(&self, location: &Location, module: &str) -> Result<Location>;

    /// Nested groupings of module locations; standard layouts produce exactly
    /// one outer element.
    fn list_locations_for_modules(&self, location: &Location) -> Result<Vec<Vec<Location>>>;
}

#[derive(Clone, Debug)]
enum GroupEntry {
    Package(Arc<PackageGroup>),
    Output(Arc<OutputGroup>),
    Module(Arc<ModuleGroup>),
}

/// [`JavaFileManager`] over location-keyed container groups.
///
/// The group map is only mutated while a test populates locations; during a
/// compilation the compiler writes only *within* output groups (and creates
/// per-module entries on demand), both of which are internally synchronised.
pub struct ContainerFileManager {
    release: Option<String>,
    groups: RwLock<HashMap<StandardLocation, GroupEntry>>,
}

impl fmt::Debug for ContainerFileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups = self.groups.read().expect("group map poisoned");
        let mut locations: Vec<_> = groups.keys().map(|k| k.name()).collect();
        locations.sort_unstable();
        f.debug_struct("ContainerFileManager")
            .field("release", &self.release)
            .field("locations", &locations)
            .finish()
    }
}

impl ContainerFileManager {
    pub fn new(release: Option<String>) -> Self {
        Self { release, groups: RwLock::new(HashMap::new()) }
    }

    fn entry(&self, kind: StandardLocation) -> Option<GroupEntry> {
        self.groups.read().expect("group map poisoned").get(&kind).cloned()
    }

    fn entry_or_create(&self, kind: StandardLocation) -> Result<GroupEntry> {
        if let Some(existing) = self.entry(kind) {
            return Ok(existing);
        }
        let mut groups = self.groups.write().expect("group map poisoned");
        if let Some(existing) = groups.get(&kind) {
            return Ok(existing.clone());
        }
        let created = if kind.is_output() {
            GroupEntry::Output(Arc::new(OutputGroup::new(kind.into(), self.release.clone())?))
        } else if kind.is_module_oriented() {
            GroupEntry::Module(Arc::new(ModuleGroup::new(kind.into(), self.release.clone())))
        } else {
            GroupEntry::Package(Arc::new(PackageGroup::new(kind.into(), self.release.clone())))
        };
        groups.insert(kind, created.clone());
        Ok(created)
    }

    /// Resolve the package-level group a content operation targets, creating
    /// nested module entries when `create` is set.
    fn package_target(
        &self,
        location: &Location,
        create: bool,
    ) -> Result<Option<Arc<PackageGroup>>> {
        match location {
            Location::Standard(kind) if kind.is_module_oriented() => {
                Err(HarnessError::config(format!(
                    "{location} is module-oriented; target one of its modules instead"
                )))
            }
            Location::Standard(kind) => {
                let entry = if create { Some(self.entry_or_create(*kind)?) } else { self.entry(*kind) };
                Ok(entry.map(|entry| match entry {
                    GroupEntry::Package(group) => group,
                    GroupEntry::Output(group) => group.package_group(),
                    GroupEntry::Module(_) => unreachable!("module groups are module-oriented"),
                }))
            }
            Location::Module { parent, module } => {
                let entry =
                    if create { Some(self.entry_or_create(*parent)?) } else { self.entry(*parent) };
                match entry {
                    None => Ok(None),
                    Some(GroupEntry::Module(group)) => {
                        if create {
                            Ok(Some(group.get_or_create(module)))
                        } else {
                            Ok(group.get(module))
                        }
                    }
                    Some(GroupEntry::Output(group)) => {
                        if create {
                            Ok(Some(group.module_group(module)?))
                        } else {
                            Ok(group.get_module(module))
                        }
                    }
                    Some(GroupEntry::Package(_)) => Err(HarnessError::config(format!(
                        "{} cannot nest module {module}",
                        parent.name()
                    ))),
                }
            }
        }
    }

    fn package_required(&self, location: &Location) -> Result<Arc<PackageGroup>> {
        self.package_target(location, false)?.ok_or_else(|| {
            HarnessError::config(format!("no containers are registered for {location}"))
        })
    }

    /// Add a host path to a location, classifying it as archive or directory.
    pub fn add_path(&self, location: Location, path: impl Into<PathBuf>) -> Result<()> {
        self.package_create(&location)?.add_path(path)
    }

    pub fn add_paths<I, P>(&self, location: Location, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let group = self.package_create(&location)?;
        group.add_paths(paths)
    }

    /// Add a workspace path root to a location.
    pub fn add_path_root(&self, location: Location, root: &PathRoot) -> Result<()> {
        self.package_create(&location)?.add_path_root(root);
        Ok(())
    }

    /// Add a pre-built container to a location.
    pub fn add_container(&self, location: Location, container: Arc<dyn Container>) -> Result<()> {
        self.package_create(&location)?.add_container(container);
        Ok(())
    }

    fn package_create(&self, location: &Location) -> Result<Arc<PackageGroup>> {
        self.package_target(location, true)?.ok_or_else(|| {
            HarnessError::config(format!("cannot create a container group for {location}"))
        })
    }

    /// Guarantee `CLASS_OUTPUT` resolves to an output group with at least one
    /// container, synthesising an in-memory `classes` directory if the test
    /// supplied none.
    pub fn ensure_class_output(&self) -> Result<()> {
        let entry = self.entry_or_create(StandardLocation::ClassOutput)?;
        let GroupEntry::Output(output) = entry else {
            unreachable!("CLASS_OUTPUT is an output location");
        };
        if output.package().is_empty() {
            let fs = MemoryFileSystem::new();
            let root = PathBuf::from("/classes");
            fs.create_dir_all(&root)?;
            output.package().add_container(Arc::new(
                crate::containers::DirectoryContainer::with_owned_fs(
                    StandardLocation::ClassOutput.into(),
                    fs.clone(),
                    root,
                    Some(fs),
                ),
            ));
            debug!("synthesised default in-memory class output");
        }
        Ok(())
    }

    /// Guarantee a (possibly empty) group exists for `location`.
    pub fn ensure_group(&self, kind: StandardLocation) -> Result<()> {
        self.entry_or_create(kind).map(|_| ())
    }

    /// The output group for `CLASS_OUTPUT`, if populated.
    pub fn class_output(&self) -> Option<Arc<OutputGroup>> {
        match self.entry(StandardLocation::ClassOutput) {
            Some(GroupEntry::Output(group)) => Some(group),
            _ => None,
        }
    }

    /// The module group registered at `kind`, if any.
    pub fn module_group(&self, kind: StandardLocation) -> Option<Arc<ModuleGroup>> {
        match self.entry(kind) {
            Some(GroupEntry::Module(group)) => Some(group),
            _ => None,
        }
    }

    /// Up to three fuzzy suggestions for a module name missing under
    /// `location`.
    pub fn suggest_modules(&self, location: &Location, module: &str) -> Vec<String> {
        let Ok(names) = self.known_module_names(location) else {
            return Vec::new();
        };
        utils::fuzzy_suggestions(
            module,
            names.iter().map(String::as_str),
            utils::FUZZY_LIMIT,
            utils::FUZZY_THRESHOLD,
        )
    }

    fn known_module_names(&self, location: &Location) -> Result<Vec<String>> {
        let Location::Standard(kind) = location else {
            return Err(HarnessError::config(format!(
                "{location} is module-scoped and nests no further modules"
            )));
        };
        match self.entry(*kind) {
            Some(GroupEntry::Module(group)) => Ok(group.module_names()),
            Some(GroupEntry::Output(group)) => Ok(group.module_names()),
            Some(GroupEntry::Package(_)) => Err(HarnessError::config(format!(
                "{location} is not module-oriented"
            ))),
            None => Ok(Vec::new()),
        }
    }

    /// Close every group, aggregating failures.
    pub fn close(&self) -> Result<()> {
        let entries: Vec<GroupEntry> =
            self.groups.read().expect("group map poisoned").values().cloned().collect();
        aggregate_close(entries.iter().map(|entry| match entry {
            GroupEntry::Package(group) => group.close(),
            GroupEntry::Output(group) => group.close(),
            GroupEntry::Module(group) => group.close(),
        }))
    }
}

impl JavaFileManager for ContainerFileManager {
    fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    fn has_location(&self, location: &Location) -> bool {
        match location {
            Location::Standard(kind) => match self.entry(*kind) {
                Some(GroupEntry::Package(group)) => !group.is_empty(),
                Some(GroupEntry::Output(_)) => true,
                Some(GroupEntry::Module(group)) => !group.is_empty(),
                None => false,
            },
            Location::Module { .. } => {
                matches!(self.package_target(location, false), Ok(Some(_)))
            }
        }
    }

    fn list(
        &self,
        location: &Location,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileObject>> {
        match self.package_target(location, false)? {
            Some(group) => group.list(package, kinds, recurse),
            None => Ok(Vec::new()),
        }
    }

    fn file_for_input(
        &self,
        location: &Location,
        package: &str,
        relative_name: &str,
    ) -> Result<Option<FileObject>> {
        match self.package_target(location, false)? {
            Some(group) => group.file_for_input(package, relative_name),
            None => Ok(None),
        }
    }

    fn file_for_output(
        &self,
        location: &Location,
        package: &str,
        relative_name: &str,
    ) -> Result<Option<FileObject>> {
        if !location.is_output() {
            return Err(HarnessError::config(format!("{location} is not an output location")));
        }
        match location {
            Location::Standard(kind) => match self.entry(*kind) {
                Some(GroupEntry::Output(group)) => group.file_for_output(package, relative_name),
                _ => Ok(None),
            },
            Location::Module { .. } => match self.package_target(location, true)? {
                Some(group) => group.file_for_output(package, relative_name),
                None => Ok(None),
            },
        }
    }

    fn java_file_for_input(
        &self,
        location: &Location,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        match self.package_target(location, false)? {
            Some(group) => group.java_file_for_input(binary_name, kind),
            None => Ok(None),
        }
    }

    fn java_file_for_output(
        &self,
        location: &Location,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        if !location.is_output() {
            return Err(HarnessError::config(format!("{location} is not an output location")));
        }
        match location {
            Location::Standard(kind_) => match self.entry(*kind_) {
                Some(GroupEntry::Output(group)) => group.java_file_for_output(binary_name, kind),
                _ => Ok(None),
            },
            Location::Module { .. } => match self.package_target(location, true)? {
                Some(group) => group.java_file_for_output(binary_name, kind),
                None => Ok(None),
            },
        }
    }

    fn infer_binary_name(&self, location: &Location, file: &FileObject) -> Option<String> {
        self.package_target(location, false)
            .ok()
            .flatten()
            .and_then(|group| group.infer_binary_name(file))
    }

    fn contains(&self, location: &Location, file: &FileObject) -> Result<bool> {
        match self.package_target(location, false)? {
            Some(group) => Ok(group.contains(file)),
            None => Ok(false),
        }
    }

    fn class_loader(&self, location: &Location) -> Result<Option<Arc<ContainerClassLoader>>> {
        match self.package_target(location, false)? {
            Some(group) => Ok(Some(group.class_loader()?)),
            None => Ok(None),
        }
    }

    fn service_loader(&self, location: &Location, service: &str) -> Result<ServiceLoader> {
        if location.is_module_scoped() {
            return Err(HarnessError::UnsupportedOnModuleLocation {
                location: location.to_string(),
            });
        }
        self.package_required(location)?.service_loader(service)
    }

    fn module_names(&self, location: &Location) -> Result<Vec<String>> {
        self.known_module_names(location)
    }

    fn location_for_module(&self, location: &Location, module: &str) -> Result<Location> {
        let names = self.known_module_names(location)?;
        if names.iter().any(|name| name == module) {
            Ok(Location::module(location.kind(), module))
        } else {
            Err(HarnessError::NoSuchModule {
                location: location.to_string(),
                module: module.to_owned(),
                suggestions: self.suggest_modules(location, module),
            })
        }
    }

    fn list_locations_for_modules(&self, location: &Location) -> Result<Vec<Vec<Location>>> {
        let kind = location.kind();
        let names = self.known_module_names(location)?;
        let locations = names
            .into_iter()
            .map(|module| Location::module(kind, module))
            .collect::<Vec<_>>();
        // one grouping per underlying path set; a single layout yields one
        Ok(vec![locations])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{PathStrategy, Workspace};
    use pretty_assertions::assert_eq;

    fn manager_with_source(workspace: &Workspace) -> ContainerFileManager {
        let manager = ContainerFileManager::new(Some("17".to_owned()));
        let sources = workspace.new_root("sources").unwrap();
        sources
            .create_file(["com", "example", "HelloWorld.java"])
            .with_lines(["package com.example;", "public class HelloWorld {}"])
            .unwrap();
        manager
            .add_path_root(StandardLocation::SourcePath.into(), &sources)
            .unwrap();
        manager
    }

    #[test]
    fn lists_across_groups_and_resolves_inputs() {
        let workspace = Workspace::new(PathStrategy::RamDisk);
        let manager = manager_with_source(&workspace);

        let listed = manager
            .list(&StandardLocation::SourcePath.into(), "", &[FileKind::Source], true)
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            manager.infer_binary_name(&StandardLocation::SourcePath.into(), &listed[0]),
            Some("com.example.HelloWorld".to_owned())
        );
        assert!(manager.contains(&StandardLocation::SourcePath.into(), &listed[0]).unwrap());
        assert!(manager.has_location(&StandardLocation::SourcePath.into()));
        assert!(!manager.has_location(&StandardLocation::ClassPath.into()));
    }

    #[test]
    fn class_output_default_is_synthesised_once() {
        let manager = ContainerFileManager::new(None);
        manager.ensure_class_output().unwrap();
        manager.ensure_class_output().unwrap();
        let output = manager.class_output().unwrap();
        assert_eq!(output.package().container_count(), 1);

        let file = manager
            .java_file_for_output(
                &StandardLocation::ClassOutput.into(),
                "com.example.Foo",
                FileKind::Class,
            )
            .unwrap()
            .unwrap();
        file.write_bytes(b"\xca\xfe\xba\xbe").unwrap();
        let read_back = manager
            .java_file_for_input(
                &StandardLocation::ClassOutput.into(),
                "com.example.Foo",
                FileKind::Class,
            )
            .unwrap()
            .unwrap();
        assert_eq!(read_back.read_bytes().unwrap(), b"\xca\xfe\xba\xbe");
    }

    #[test]
    fn module_scoped_output_partitions_by_module_name() {
        let manager = ContainerFileManager::new(None);
        manager.ensure_class_output().unwrap();
        let file = manager
            .java_file_for_output(
                &Location::module(StandardLocation::ClassOutput, "hello.world"),
                "com.example.HelloWorld",
                FileKind::Class,
            )
            .unwrap()
            .unwrap();
        file.write_bytes(b"bytes").unwrap();
        assert_eq!(file.name(), "com/example/HelloWorld.class");
        assert!(file
            .path()
            .unwrap()
            .to_string_lossy()
            .contains("/classes/hello.world/com/example/HelloWorld.class"));
        assert_eq!(
            manager.module_names(&StandardLocation::ClassOutput.into()).unwrap(),
            vec!["hello.world".to_owned()]
        );
    }

    #[test]
    fn module_oriented_locations_reject_direct_content_operations() {
        let manager = ContainerFileManager::new(None);
        manager.ensure_group(StandardLocation::ModuleSourcePath).unwrap();
        assert!(manager
            .list(&StandardLocation::ModuleSourcePath.into(), "", &[FileKind::Source], true)
            .is_err());
    }

    #[test]
    fn missing_modules_come_back_with_fuzzy_suggestions() {
        let workspace = Workspace::new(PathStrategy::RamDisk);
        let manager = ContainerFileManager::new(None);
        for module in ["foo.baz", "foo.bork", "org.example"] {
            let root = workspace.new_root(module).unwrap();
            manager
                .add_path_root(
                    Location::module(StandardLocation::ModuleSourcePath, module),
                    &root,
                )
                .unwrap();
        }

        let err = manager
            .location_for_module(&StandardLocation::ModuleSourcePath.into(), "foo.bar")
            .unwrap_err();
        match err {
            HarnessError::NoSuchModule { suggestions, .. } => {
                assert_eq!(suggestions, vec!["foo.baz".to_owned(), "foo.bork".to_owned()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let found = manager
            .location_for_module(&StandardLocation::ModuleSourcePath.into(), "foo.baz")
            .unwrap();
        assert_eq!(found, Location::module(StandardLocation::ModuleSourcePath, "foo.baz"));
    }

    #[test]
    fn list_locations_for_modules_nests_one_grouping() {
        let workspace = Workspace::new(PathStrategy::RamDisk);
        let manager = ContainerFileManager::new(None);
        for module in ["greeter", "hello.world"] {
            let root = workspace.new_root(module).unwrap();
            manager
                .add_path_root(
                    Location::module(StandardLocation::ModuleSourcePath, module),
                    &root,
                )
                .unwrap();
        }
        let groupings = manager
            .list_locations_for_modules(&StandardLocation::ModuleSourcePath.into())
            .unwrap();
        assert_eq!(groupings.len(), 1);
        assert_eq!(groupings[0].len(), 2);
    }

    #[test]
    fn service_loaders_are_refused_for_module_scoped_locations() {
        let manager = ContainerFileManager::new(None);
        let err = manager
            .service_loader(
                &Location::module(StandardLocation::AnnotationProcessorModulePath, "m"),
                "com.example.Processor",
            )
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnsupportedOnModuleLocation { .. }));
    }
}
