//! The compilation driver: turns a fluent configuration into a
//! [`CompilationResult`].
//!
//! A compilation walks a fixed sequence: craft the flag vector, build the
//! diagnostic tracer and the file manager (guaranteeing a class output and a
//! class path), discover compilation units, open the tee writer, hand
//! everything to the compiler, await its verdict, and assemble the result.

use crate::{
    compilers::{AnnotationProcessor, CompilerFactory, Locale, TaskInputs},
    containers::{ArchiveContainer, Container},
    diagnostics::{DiagnosticListener, DiagnosticTracer, LoggingMode},
    error::{HarnessError, Result},
    files::{FileKind, FileObject},
    flags::{CompilationSettings, FlagBuilderFactory, JavacFlagBuilder},
    fm::{ContainerFileManager, JavaFileManager, TracingFileManager},
    location::{Location, StandardLocation},
    tee::TeeWriter,
    utils,
    workspace::{PathRoot, Workspace},
};
use std::{
    collections::HashSet,
    io::Write,
    panic::{catch_unwind, AssertUnwindSafe},
    path::PathBuf,
    sync::Arc,
};

mod result;

pub use result::CompilationResult;

/// What applying a configurer decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigureOutcome {
    Continue,
    /// The compilation should not run; not an error.
    Abort,
}

/// A reusable piece of builder configuration.
pub trait CompilationConfigurer {
    fn configure(&self, builder: &mut CompilationBuilder) -> Result<ConfigureOutcome>;
}

#[derive(Debug)]
struct PanicMessage(String);

impl std::fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for PanicMessage {}

/// Fluent configuration for one compilation.
pub struct CompilationBuilder {
    compiler_factory: Box<dyn CompilerFactory>,
    flag_builder_factory: Box<dyn FlagBuilderFactory>,
    workspace: Option<Arc<Workspace>>,
    settings: CompilationSettings,
    locale: Locale,
    include_current_class_path: bool,
    include_current_platform_class_path: bool,
    file_manager_logging: LoggingMode,
    diagnostic_logging: LoggingMode,
    processors: Vec<AnnotationProcessor>,
    class_names: Vec<String>,
    console_output: Option<Box<dyn Write + Send>>,
    paths: Vec<(Location, PathBuf)>,
    path_roots: Vec<(Location, PathRoot)>,
    containers: Vec<(Location, Arc<dyn Container>)>,
}

impl std::fmt::Debug for CompilationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationBuilder")
            .field("settings", &self.settings)
            .field("locale", &self.locale)
            .field("paths", &self.paths.len())
            .field("path_roots", &self.path_roots.len())
            .finish()
    }
}

impl CompilationBuilder {
    /// Start configuring a compilation against the given compiler factory.
    pub fn new(compiler_factory: impl CompilerFactory + 'static) -> Self {
        Self {
            compiler_factory: Box::new(compiler_factory),
            flag_builder_factory: Box::new(|| {
                Ok(Box::new(JavacFlagBuilder) as Box<dyn crate::flags::FlagBuilder>)
            }),
            workspace: None,
            settings: CompilationSettings::default(),
            locale: Locale::root(),
            include_current_class_path: true,
            include_current_platform_class_path: true,
            file_manager_logging: LoggingMode::Disabled,
            diagnostic_logging: LoggingMode::Disabled,
            processors: Vec::new(),
            class_names: Vec::new(),
            console_output: None,
            paths: Vec::new(),
            path_roots: Vec::new(),
            containers: Vec::new(),
        }
    }

    #[must_use]
    pub fn flag_builder(mut self, factory: impl FlagBuilderFactory + 'static) -> Self {
        self.flag_builder_factory = Box::new(factory);
        self
    }

    /// Attach the workspace owning the roots used by this compilation, so it
    /// outlives the result.
    #[must_use]
    pub fn workspace(mut self, workspace: Arc<Workspace>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn settings_mut(&mut self) -> &mut CompilationSettings {
        &mut self.settings
    }

    #[must_use]
    pub fn release_version(mut self, version: impl Into<String>) -> Self {
        self.settings.set_release_version(version);
        self
    }

    #[must_use]
    pub fn source_version(mut self, version: impl Into<String>) -> Self {
        self.settings.set_source_version(version);
        self
    }

    #[must_use]
    pub fn target_version(mut self, version: impl Into<String>) -> Self {
        self.settings.set_target_version(version);
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.settings.verbose = verbose;
        self
    }

    #[must_use]
    pub fn preview_features(mut self, enabled: bool) -> Self {
        self.settings.preview_features = enabled;
        self
    }

    #[must_use]
    pub fn warnings(mut self, enabled: bool) -> Self {
        self.settings.warnings = enabled;
        self
    }

    #[must_use]
    pub fn warnings_as_errors(mut self, enabled: bool) -> Self {
        self.settings.warnings_as_errors = enabled;
        self
    }

    #[must_use]
    pub fn deprecation_warnings(mut self, enabled: bool) -> Self {
        self.settings.deprecation_warnings = enabled;
        self
    }

    #[must_use]
    pub fn annotation_processor_option(mut self, option: impl Into<String>) -> Self {
        self.settings.annotation_processor_options.push(option.into());
        self
    }

    #[must_use]
    pub fn runtime_option(mut self, option: impl Into<String>) -> Self {
        self.settings.runtime_options.push(option.into());
        self
    }

    #[must_use]
    pub fn extra_option(mut self, option: impl Into<String>) -> Self {
        self.settings.extra_options.push(option.into());
        self
    }

    #[must_use]
    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    #[must_use]
    pub fn include_current_class_path(mut self, include: bool) -> Self {
        self.include_current_class_path = include;
        self
    }

    #[must_use]
    pub fn include_current_platform_class_path(mut self, include: bool) -> Self {
        self.include_current_platform_class_path = include;
        self
    }

    #[must_use]
    pub fn file_manager_logging(mut self, mode: LoggingMode) -> Self {
        self.file_manager_logging = mode;
        self
    }

    #[must_use]
    pub fn diagnostic_logging(mut self, mode: LoggingMode) -> Self {
        self.diagnostic_logging = mode;
        self
    }

    #[must_use]
    pub fn processor(mut self, processor: AnnotationProcessor) -> Self {
        self.processors.push(processor);
        self
    }

    /// Binary names of already-compiled classes to hand to the compiler for
    /// annotation processing.
    #[must_use]
    pub fn class_name(mut self, binary_name: impl Into<String>) -> Self {
        self.class_names.push(binary_name.into());
        self
    }

    /// Where the pass-through side of the tee goes. Defaults to discarding,
    /// which keeps test output quiet; the buffered side is always captured.
    #[must_use]
    pub fn console_output(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.console_output = Some(writer);
        self
    }

    #[must_use]
    pub fn with_path(mut self, location: impl Into<Location>, path: impl Into<PathBuf>) -> Self {
        self.push_path(location, path);
        self
    }

    #[must_use]
    pub fn with_path_root(mut self, location: impl Into<Location>, root: &PathRoot) -> Self {
        self.push_path_root(location, root);
        self
    }

    #[must_use]
    pub fn with_container(
        mut self,
        location: impl Into<Location>,
        container: Arc<dyn Container>,
    ) -> Self {
        self.containers.push((location.into(), container));
        self
    }

    /// Convenience: a root on the source path.
    #[must_use]
    pub fn source_path(self, root: &PathRoot) -> Self {
        self.with_path_root(StandardLocation::SourcePath, root)
    }

    /// Convenience: a root holding one module's sources.
    #[must_use]
    pub fn module_source(self, module: impl Into<String>, root: &PathRoot) -> Self {
        self.with_path_root(
            Location::module(StandardLocation::ModuleSourcePath, module.into()),
            root,
        )
    }

    /// Convenience: a host path (directory or archive) on the class path.
    #[must_use]
    pub fn class_path(self, path: impl Into<PathBuf>) -> Self {
        self.with_path(StandardLocation::ClassPath, path)
    }

    pub fn push_path(&mut self, location: impl Into<Location>, path: impl Into<PathBuf>) {
        self.paths.push((location.into(), path.into()));
    }

    pub fn push_path_root(&mut self, location: impl Into<Location>, root: &PathRoot) {
        self.path_roots.push((location.into(), root.clone()));
    }

    /// Apply a configurer; the caller decides what an abort means.
    pub fn apply<C>(mut self, configurer: &C) -> Result<(Self, ConfigureOutcome)>
    where
        C: CompilationConfigurer + ?Sized,
    {
        let outcome = configurer.configure(&mut self)?;
        Ok((self, outcome))
    }

    /// Run the compilation.
    pub fn compile(self) -> Result<CompilationResult> {
        if let Some(workspace) = &self.workspace {
            trace!(strategy = ?workspace.strategy(), "compiling against workspace");
        }
        let compiler = self.compiler_factory.create_compiler()?;
        let flag_builder = self.flag_builder_factory.create_flag_builder()?;
        let flags = flag_builder.build_flags(&self.settings)?;
        debug!(
            compiler = %compiler.name(),
            flag_builder = flag_builder.name(),
            ?flags,
            "starting compilation"
        );

        let tracer = Arc::new(DiagnosticTracer::new(self.diagnostic_logging));
        let manager = self.build_file_manager()?;
        let compilation_units = discover_compilation_units(&manager)?;
        debug!(units = compilation_units.len(), "discovered compilation units");

        let file_manager: Arc<dyn JavaFileManager> = match self.file_manager_logging {
            LoggingMode::Disabled => manager.clone(),
            LoggingMode::Enabled => Arc::new(TracingFileManager::new(manager.clone(), false)),
            LoggingMode::Stacktraces => Arc::new(TracingFileManager::new(manager.clone(), true)),
        };

        let tee = Arc::new(match self.console_output {
            Some(downstream) => TeeWriter::new(downstream),
            None => TeeWriter::sink(),
        });

        let mut task = compiler.create_task(TaskInputs {
            out: tee.clone(),
            file_manager,
            diagnostics: tracer.clone() as Arc<dyn DiagnosticListener>,
            flags,
            class_names: self.class_names,
            compilation_units: compilation_units.clone(),
        })?;
        task.set_processors(self.processors);
        task.set_locale(self.locale);

        let verdict = match catch_unwind(AssertUnwindSafe(|| task.call())) {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(error)) => return Err(HarnessError::crashed(error)),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| panic.downcast_ref::<&str>().map(|s| (*s).to_owned()))
                    .unwrap_or_else(|| "compiler panicked".to_owned());
                return Err(HarnessError::CompilerCrashed(Box::new(PanicMessage(message))));
            }
        };
        let Some(verdict) = verdict else {
            return Err(HarnessError::CompilerIndeterminate);
        };

        let _ = tee.close();
        let diagnostics = tracer.diagnostics();
        let warnings_present = diagnostics.iter().any(|d| d.kind().is_warning());
        let success = verdict && (!self.settings.warnings_as_errors || !warnings_present);
        let output_lines: Vec<String> = tee.content().split('\n').map(str::to_owned).collect();
        debug!(verdict, success, diagnostics = diagnostics.len(), "compilation finished");

        Ok(CompilationResult::new(
            success,
            self.settings.warnings_as_errors,
            output_lines,
            compilation_units,
            diagnostics,
            manager,
        ))
    }

    fn build_file_manager(&self) -> Result<Arc<ContainerFileManager>> {
        let manager = Arc::new(ContainerFileManager::new(
            self.settings.effective_release().map(str::to_owned),
        ));
        for (location, root) in &self.path_roots {
            manager.add_path_root(location.clone(), root)?;
        }
        for (location, path) in &self.paths {
            manager.add_path(location.clone(), path.clone())?;
        }
        for (location, container) in &self.containers {
            manager.add_container(location.clone(), container.clone())?;
        }

        manager.ensure_class_output()?;
        // some compilers insist on the location existing even when empty
        manager.ensure_group(StandardLocation::ClassPath)?;

        if self.include_current_class_path {
            for path in utils::host_class_path() {
                manager.add_path(StandardLocation::ClassPath.into(), path)?;
            }
        }
        if self.include_current_platform_class_path {
            for path in utils::host_platform_class_path() {
                manager.add_path(StandardLocation::PlatformClassPath.into(), path)?;
            }
        }
        add_runtime_modules(&manager);

        Ok(manager)
    }
}

/// Register the host runtime's module roots under `SYSTEM_MODULES`,
/// best-effort.
fn add_runtime_modules(manager: &ContainerFileManager) {
    for jmods in utils::host_system_modules() {
        let Ok(entries) = std::fs::read_dir(&jmods) else {
            continue;
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("jmod")))
            .collect();
        paths.sort();
        for path in paths {
            let Some(module) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let location = Location::module(StandardLocation::SystemModules, module);
            match ArchiveContainer::open(
                location.clone(),
                crate::vfs::OsFileSystem::shared(),
                &path,
                manager.release(),
            ) {
                Ok(container) => {
                    if let Err(error) = manager.add_container(location, Arc::new(container)) {
                        warn!(%error, module, "skipping runtime module");
                    }
                }
                Err(error) => warn!(%error, module, "failed to open runtime module"),
            }
        }
    }
}

/// List every source-kind file reachable from `SOURCE_PATH` and from each
/// module under `MODULE_SOURCE_PATH`, deduplicated by identity, in a
/// deterministic order.
fn discover_compilation_units(manager: &ContainerFileManager) -> Result<Vec<FileObject>> {
    let mut units =
        manager.list(&StandardLocation::SourcePath.into(), "", &[FileKind::Source], true)?;
    if let Some(modules) = manager.module_group(StandardLocation::ModuleSourcePath) {
        for (module, group) in modules.modules() {
            let found = group.list("", &[FileKind::Source], true)?;
            trace!(module, units = found.len(), "discovered module sources");
            units.extend(found);
        }
    }
    let mut seen = HashSet::new();
    units.retain(|unit| seen.insert(unit.clone()));
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::PathStrategy;
    use pretty_assertions::assert_eq;

    struct NoCompiler;

    impl CompilerFactory for NoCompiler {
        fn create_compiler(&self) -> Result<Box<dyn crate::compilers::Compiler>> {
            Err(HarnessError::config("no compiler installed"))
        }
    }

    #[test]
    fn factory_failures_surface_from_compile() {
        let workspace = Arc::new(Workspace::new(PathStrategy::RamDisk));
        let result = CompilationBuilder::new(NoCompiler).workspace(workspace).compile();
        assert!(matches!(result, Err(HarnessError::Configuration(_))));
    }

    #[test]
    fn configurers_report_their_outcome() {
        struct Aborting;
        impl CompilationConfigurer for Aborting {
            fn configure(&self, builder: &mut CompilationBuilder) -> Result<ConfigureOutcome> {
                builder.settings_mut().verbose = true;
                Ok(ConfigureOutcome::Abort)
            }
        }

        let builder = CompilationBuilder::new(NoCompiler);
        let (builder, outcome) = builder.apply(&Aborting).unwrap();
        assert_eq!(outcome, ConfigureOutcome::Abort);
        assert!(builder.settings.verbose);
    }
}
