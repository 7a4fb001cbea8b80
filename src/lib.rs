#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;
pub use error::{HarnessError, Result};

pub mod vfs;

pub mod files;
pub use files::{FileKind, FileObject};

pub mod location;
pub use location::{Location, StandardLocation};

pub mod workspace;
pub use workspace::{PathRoot, PathStrategy, Workspace};

pub mod containers;
pub use containers::{ArchiveContainer, Container, DirectoryContainer};

pub mod classloading;
pub use classloading::{ClassLoading, ContainerClassLoader, ServiceLoader};

pub mod groups;
pub use groups::{ModuleGroup, OutputGroup, PackageGroup};

pub mod fm;
pub use fm::{ContainerFileManager, JavaFileManager, TracingFileManager};

pub mod diagnostics;
pub use diagnostics::{
    Diagnostic, DiagnosticKind, DiagnosticListener, DiagnosticTracer, LoggingMode,
    TraceDiagnostic, NO_POS,
};

pub mod tee;
pub use tee::TeeWriter;

pub mod flags;
pub use flags::{
    CompilationSettings, EcjFlagBuilder, FlagBuilder, FlagBuilderFactory, JavacFlagBuilder,
};

pub mod compilers;
pub use compilers::{
    AnnotationProcessor, CompilationTask, Compiler, CompilerFactory, Locale, TaskInputs,
};

mod compile;
pub use compile::{CompilationBuilder, CompilationConfigurer, CompilationResult, ConfigureOutcome};

pub mod utils;
