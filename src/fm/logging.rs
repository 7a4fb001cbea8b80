//! Structured logging decoration for file managers.

use super::JavaFileManager;
use crate::{
    classloading::{ContainerClassLoader, ServiceLoader},
    error::Result,
    files::{FileKind, FileObject},
    location::Location,
};
use std::{backtrace::Backtrace, fmt, sync::Arc};

const TARGET: &str = "javac_harness::file_manager";

/// A transparent wrapper emitting one structured event per file-manager
/// operation, optionally with the caller's stack attached.
///
/// Semantics and return values are exactly those of the wrapped manager.
pub struct TracingFileManager {
    inner: Arc<dyn JavaFileManager>,
    stacktraces: bool,
}

impl fmt::Debug for TracingFileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingFileManager")
            .field("stacktraces", &self.stacktraces)
            .field("inner", &self.inner)
            .finish()
    }
}

impl TracingFileManager {
    pub fn new(inner: Arc<dyn JavaFileManager>, stacktraces: bool) -> Self {
        Self { inner, stacktraces }
    }

    pub fn into_inner(self) -> Arc<dyn JavaFileManager> {
        self.inner
    }

    fn event(&self, operation: &'static str, arguments: &str, outcome: &str) {
        if self.stacktraces {
            let stack = Backtrace::force_capture();
            trace!(target: TARGET, operation, arguments, outcome, stack = %stack);
        } else {
            trace!(target: TARGET, operation, arguments, outcome);
        }
    }
}

fn outcome_of<T>(result: &Result<T>, describe: impl Fn(&T) -> String) -> String {
    match result {
        Ok(value) => describe(value),
        Err(err) => format!("error: {err}"),
    }
}

fn describe_file(file: &Option<FileObject>) -> String {
    match file {
        Some(file) => file.uri().to_owned(),
        None => "<none>".to_owned(),
    }
}

impl JavaFileManager for TracingFileManager {
    fn release(&self) -> Option<&str> {
        self.inner.release()
    }

    fn has_location(&self, location: &Location) -> bool {
        let result = self.inner.has_location(location);
        self.event("has_location", &location.to_string(), &result.to_string());
        result
    }

    fn list(
        &self,
        location: &Location,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileObject>> {
        let result = self.inner.list(location, package, kinds, recurse);
        self.event(
            "list",
            &format!("{location}, package={package:?}, kinds={kinds:?}, recurse={recurse}"),
            &outcome_of(&result, |files| format!("{} file(s)", files.len())),
        );
        result
    }

    fn file_for_input(
        &self,
        location: &Location,
        package: &str,
        relative_name: &str,
    ) -> Result<Option<FileObject>> {
        let result = self.inner.file_for_input(location, package, relative_name);
        self.event(
            "file_for_input",
            &format!("{location}, package={package:?}, relative={relative_name:?}"),
            &outcome_of(&result, describe_file),
        );
        result
    }

    fn file_for_output(
        &self,
        location: &Location,
        package: &str,
        relative_name: &str,
    ) -> Result<Option<FileObject>> {
        let result = self.inner.file_for_output(location, package, relative_name);
        self.event(
            "file_for_output",
            &format!("{location}, package={package:?}, relative={relative_name:?}"),
            &outcome_of(&result, describe_file),
        );
        result
    }

    fn java_file_for_input(
        &self,
        location: &Location,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        let result = self.inner.java_file_for_input(location, binary_name, kind);
        self.event(
            "java_file_for_input",
            &format!("{location}, binary_name={binary_name}, kind={kind}"),
            &outcome_of(&result, describe_file),
        );
        result
    }

    fn java_file_for_output(
        &self,
        location: &Location,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        let result = self.inner.java_file_for_output(location, binary_name, kind);
        self.event(
            "java_file_for_output",
            &format!("{location}, binary_name={binary_name}, kind={kind}"),
            &outcome_of(&result, describe_file),
        );
        result
    }

    fn infer_binary_name(&self, location: &Location, file: &FileObject) -> Option<String> {
        let result = self.inner.infer_binary_name(location, file);
        self.event(
            "infer_binary_name",
            &format!("{location}, file={}", file.uri()),
            result.as_deref().unwrap_or("<none>"),
        );
        result
    }

    fn contains(&self, location: &Location, file: &FileObject) -> Result<bool> {
        let result = self.inner.contains(location, file);
        self.event(
            "contains",
            &format!("{location}, file={}", file.uri()),
            &outcome_of(&result, bool::to_string),
        );
        result
    }

    fn class_loader(&self, location: &Location) -> Result<Option<Arc<ContainerClassLoader>>> {
        let result = self.inner.class_loader(location);
        self.event(
            "class_loader",
            &location.to_string(),
            &outcome_of(&result, |loader| {
                if loader.is_some() { "<loader>".to_owned() } else { "<none>".to_owned() }
            }),
        );
        result
    }

    fn service_loader(&self, location: &Location, service: &str) -> Result<ServiceLoader> {
        let result = self.inner.service_loader(location, service);
        self.event(
            "service_loader",
            &format!("{location}, service={service}"),
            &outcome_of(&result, |loader| format!("{} provider(s)", loader.providers().len())),
        );
        result
    }

    fn module_names(&self, location: &Location) -> Result<Vec<String>> {
        let result = self.inner.module_names(location);
        self.event(
            "module_names",
            &location.to_string(),
            &outcome_of(&result, |names| names.join(", ")),
        );
        result
    }

    fn location_for_module(&self, location: &Location, module: &str) -> Result<Location> {
        let result = self.inner.location_for_module(location, module);
        self.event(
            "location_for_module",
            &format!("{location}, module={module}"),
            &outcome_of(&result, Location::to_string),
        );
        result
    }

    fn list_locations_for_modules(&self, location: &Location) -> Result<Vec<Vec<Location>>> {
        let result = self.inner.list_locations_for_modules(location);
        self.event(
            "list_locations_for_modules",
            &location.to_string(),
            &outcome_of(&result, |groupings| format!("{} grouping(s)", groupings.len())),
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fm::ContainerFileManager,
        location::StandardLocation,
        workspace::{PathStrategy, Workspace},
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn the_wrapper_is_transparent() {
        let workspace = Workspace::new(PathStrategy::RamDisk);
        let sources = workspace.new_root("sources").unwrap();
        sources
            .create_file(["com", "example", "A.java"])
            .with_contents("package com.example; class A {}")
            .unwrap();

        let inner = Arc::new(ContainerFileManager::new(None));
        inner
            .add_path_root(StandardLocation::SourcePath.into(), &sources)
            .unwrap();
        let wrapped = TracingFileManager::new(inner.clone(), true);

        let direct = inner
            .list(&StandardLocation::SourcePath.into(), "", &[FileKind::Source], true)
            .unwrap();
        let proxied = wrapped
            .list(&StandardLocation::SourcePath.into(), "", &[FileKind::Source], true)
            .unwrap();
        assert_eq!(direct, proxied);
        assert_eq!(
            wrapped.has_location(&StandardLocation::SourcePath.into()),
            inner.has_location(&StandardLocation::SourcePath.into())
        );
    }
}
