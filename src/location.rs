//! Compiler locations: the named buckets the compiler resolves files from.

use std::fmt;

/// The closed set of standard locations.
///
/// Flags (`is_output`, `is_module_oriented`) are static per kind; no runtime
/// metadata is consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardLocation {
    SourcePath,
    SourceOutput,
    ClassPath,
    ClassOutput,
    AnnotationProcessorPath,
    AnnotationProcessorModulePath,
    PlatformClassPath,
    SystemModules,
    ModuleSourcePath,
    ModulePath,
    UpgradeModulePath,
    PatchModulePath,
    NativeHeaderOutput,
}

impl StandardLocation {
    pub const ALL: [StandardLocation; 13] = [
        Self::SourcePath,
        Self::SourceOutput,
        Self::ClassPath,
        Self::ClassOutput,
        Self::AnnotationProcessorPath,
        Self::AnnotationProcessorModulePath,
        Self::PlatformClassPath,
        Self::SystemModules,
        Self::ModuleSourcePath,
        Self::ModulePath,
        Self::UpgradeModulePath,
        Self::PatchModulePath,
        Self::NativeHeaderOutput,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::SourcePath => "SOURCE_PATH",
            Self::SourceOutput => "SOURCE_OUTPUT",
            Self::ClassPath => "CLASS_PATH",
            Self::ClassOutput => "CLASS_OUTPUT",
            Self::AnnotationProcessorPath => "ANNOTATION_PROCESSOR_PATH",
            Self::AnnotationProcessorModulePath => "ANNOTATION_PROCESSOR_MODULE_PATH",
            Self::PlatformClassPath => "PLATFORM_CLASS_PATH",
            Self::SystemModules => "SYSTEM_MODULES",
            Self::ModuleSourcePath => "MODULE_SOURCE_PATH",
            Self::ModulePath => "MODULE_PATH",
            Self::UpgradeModulePath => "UPGRADE_MODULE_PATH",
            Self::PatchModulePath => "PATCH_MODULE_PATH",
            Self::NativeHeaderOutput => "NATIVE_HEADER_OUTPUT",
        }
    }

    /// Locations the compiler writes to.
    pub const fn is_output(self) -> bool {
        matches!(self, Self::SourceOutput | Self::ClassOutput | Self::NativeHeaderOutput)
    }

    /// Locations that nest one group of containers per module.
    pub const fn is_module_oriented(self) -> bool {
        matches!(
            self,
            Self::ModuleSourcePath
                | Self::ModulePath
                | Self::UpgradeModulePath
                | Self::PatchModulePath
                | Self::AnnotationProcessorModulePath
                | Self::SystemModules
        )
    }
}

impl fmt::Display for StandardLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Either a standard location, or a single module nested under one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    Standard(StandardLocation),
    Module { parent: StandardLocation, module: String },
}

impl Location {
    pub fn module(parent: StandardLocation, module: impl Into<String>) -> Self {
        Self::Module { parent, module: module.into() }
    }

    /// The standard kind this location is, or nests under.
    pub fn kind(&self) -> StandardLocation {
        match self {
            Self::Standard(kind) => *kind,
            Self::Module { parent, .. } => *parent,
        }
    }

    pub fn module_name(&self) -> Option<&str> {
        match self {
            Self::Standard(_) => None,
            Self::Module { module, .. } => Some(module),
        }
    }

    pub fn is_output(&self) -> bool {
        self.kind().is_output()
    }

    /// A module-scoped location is never itself module-oriented.
    pub fn is_module_oriented(&self) -> bool {
        match self {
            Self::Standard(kind) => kind.is_module_oriented(),
            Self::Module { .. } => false,
        }
    }

    pub fn is_module_scoped(&self) -> bool {
        matches!(self, Self::Module { .. })
    }
}

impl From<StandardLocation> for Location {
    fn from(kind: StandardLocation) -> Self {
        Self::Standard(kind)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(kind) => f.write_str(kind.name()),
            Self::Module { parent, module } => write!(f, "{}[{}]", parent.name(), module),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_flags_are_static_per_kind() {
        assert!(StandardLocation::ClassOutput.is_output());
        assert!(StandardLocation::SourceOutput.is_output());
        assert!(StandardLocation::NativeHeaderOutput.is_output());
        assert!(!StandardLocation::ClassPath.is_output());
        assert!(!StandardLocation::ModuleSourcePath.is_output());
    }

    #[test]
    fn module_oriented_flags_are_static_per_kind() {
        assert!(StandardLocation::ModuleSourcePath.is_module_oriented());
        assert!(StandardLocation::SystemModules.is_module_oriented());
        assert!(!StandardLocation::SourcePath.is_module_oriented());
        assert!(!StandardLocation::ClassOutput.is_module_oriented());
    }

    #[test]
    fn module_scoped_locations_are_not_module_oriented() {
        let location = Location::module(StandardLocation::ModuleSourcePath, "hello.world");
        assert!(!location.is_module_oriented());
        assert!(location.is_module_scoped());
        assert_eq!(location.to_string(), "MODULE_SOURCE_PATH[hello.world]");
    }
}
