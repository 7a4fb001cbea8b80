//! The compiler capability the driver consumes.
//!
//! The harness does not ship a compiler; tests supply one through
//! [`CompilerFactory`]. The driver hands the compiler a tee writer, the file
//! manager, a diagnostic listener, the crafted flag vector, and the
//! discovered compilation units, then blocks on the task's verdict.

use crate::{
    diagnostics::DiagnosticListener,
    error::Result,
    files::FileObject,
    fm::JavaFileManager,
    tee::TeeWriter,
};
use std::{fmt, sync::Arc};

/// A locale tag used to render diagnostic messages. The root locale is the
/// empty tag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Locale {
    tag: String,
}

impl Locale {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_root(&self) -> bool {
        self.tag.is_empty()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("ROOT")
        } else {
            f.write_str(&self.tag)
        }
    }
}

/// Opaque handle naming one annotation processor the compiler should run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationProcessor {
    name: String,
}

impl AnnotationProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Everything a compiler receives to set up one compilation task.
pub struct TaskInputs {
    pub out: Arc<TeeWriter>,
    pub file_manager: Arc<dyn JavaFileManager>,
    pub diagnostics: Arc<dyn DiagnosticListener>,
    pub flags: Vec<String>,
    /// Binary names of classes to process (annotation processing rounds).
    pub class_names: Vec<String>,
    pub compilation_units: Vec<FileObject>,
}

impl fmt::Debug for TaskInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInputs")
            .field("flags", &self.flags)
            .field("class_names", &self.class_names)
            .field("compilation_units", &self.compilation_units.len())
            .finish()
    }
}

/// One pending compilation.
pub trait CompilationTask: Send {
    fn set_processors(&mut self, processors: Vec<AnnotationProcessor>);

    fn set_locale(&mut self, locale: Locale);

    /// Run to completion. `Ok(Some(verdict))` is a definitive result,
    /// `Ok(None)` means the compiler could not decide, and `Err` is a crash.
    fn call(&mut self) -> Result<Option<bool>>;
}

/// The compiler capability consumed by the driver.
pub trait Compiler: Send + Sync {
    /// Human-readable name, used in logs and failure messages.
    fn name(&self) -> String;

    fn create_task(&self, inputs: TaskInputs) -> Result<Box<dyn CompilationTask>>;

    /// The source-version strings this compiler accepts.
    fn source_version_names(&self) -> Vec<String>;
}

/// Produces [`Compiler`]s for the driver; invoked once per compilation.
pub trait CompilerFactory: Send + Sync {
    fn create_compiler(&self) -> Result<Box<dyn Compiler>>;
}

impl<F> CompilerFactory for F
where
    F: Fn() -> Result<Box<dyn Compiler>> + Send + Sync,
{
    fn create_compiler(&self) -> Result<Box<dyn Compiler>> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_root_locale_is_the_empty_tag() {
        assert!(Locale::root().is_root());
        assert_eq!(Locale::root().to_string(), "ROOT");
        assert_eq!(Locale::new("de-DE").to_string(), "de-DE");
    }
}
