//! Translation of user-facing compiler options into CLI argument vectors.

use crate::error::{HarnessError, Result};

/// The user-facing compiler option set.
///
/// Version knobs are mutually exclusive: setting the release version clears
/// source and target, and vice versa.
#[derive(Clone, Debug)]
pub struct CompilationSettings {
    pub verbose: bool,
    pub preview_features: bool,
    pub warnings: bool,
    pub warnings_as_errors: bool,
    pub deprecation_warnings: bool,
    release_version: Option<String>,
    source_version: Option<String>,
    target_version: Option<String>,
    pub annotation_processor_options: Vec<String>,
    pub runtime_options: Vec<String>,
    pub extra_options: Vec<String>,
}

impl Default for CompilationSettings {
    fn default() -> Self {
        Self {
            verbose: false,
            preview_features: false,
            warnings: true,
            warnings_as_errors: false,
            deprecation_warnings: false,
            release_version: None,
            source_version: None,
            target_version: None,
            annotation_processor_options: Vec::new(),
            runtime_options: Vec::new(),
            extra_options: Vec::new(),
        }
    }
}

impl CompilationSettings {
    pub fn set_release_version(&mut self, version: impl Into<String>) {
        self.release_version = Some(version.into());
        self.source_version = None;
        self.target_version = None;
    }

    pub fn set_source_version(&mut self, version: impl Into<String>) {
        self.source_version = Some(version.into());
        self.release_version = None;
    }

    pub fn set_target_version(&mut self, version: impl Into<String>) {
        self.target_version = Some(version.into());
        self.release_version = None;
    }

    pub fn release_version(&self) -> Option<&str> {
        self.release_version.as_deref()
    }

    pub fn source_version(&self) -> Option<&str> {
        self.source_version.as_deref()
    }

    pub fn target_version(&self) -> Option<&str> {
        self.target_version.as_deref()
    }

    /// The release used when opening multi-release archives.
    pub fn effective_release(&self) -> Option<&str> {
        self.release_version().or(self.target_version())
    }

    fn validate(&self) -> Result<()> {
        for (label, version) in [
            ("release", &self.release_version),
            ("source", &self.source_version),
            ("target", &self.target_version),
        ] {
            if let Some(version) = version {
                if version.parse::<u64>().is_err() {
                    return Err(HarnessError::config(format!(
                        "{label} version \"{version}\" is not a non-negative integer"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builds the CLI argument vector for one compiler family.
///
/// Building is pure: the same settings always produce the same token
/// sequence.
pub trait FlagBuilder: Send + Sync {
    fn name(&self) -> &str;

    fn build_flags(&self, settings: &CompilationSettings) -> Result<Vec<String>>;
}

/// Produces [`FlagBuilder`]s for the driver.
pub trait FlagBuilderFactory: Send + Sync {
    fn create_flag_builder(&self) -> Result<Box<dyn FlagBuilder>>;
}

impl<F> FlagBuilderFactory for F
where
    F: Fn() -> Result<Box<dyn FlagBuilder>> + Send + Sync,
{
    fn create_flag_builder(&self) -> Result<Box<dyn FlagBuilder>> {
        self()
    }
}

/// Shared token crafting; only the warnings-as-errors spelling differs
/// between the builders.
fn craft(settings: &CompilationSettings, werror: &str) -> Result<Vec<String>> {
    settings.validate()?;
    let mut flags = Vec::new();
    if settings.verbose {
        flags.push("-verbose".to_owned());
    }
    if settings.preview_features {
        flags.push("--enable-preview".to_owned());
    }
    if !settings.warnings {
        flags.push("-nowarn".to_owned());
    }
    if settings.warnings_as_errors {
        flags.push(werror.to_owned());
    }
    if settings.deprecation_warnings {
        flags.push("-deprecation".to_owned());
    }
    if let Some(release) = settings.release_version() {
        flags.push("--release".to_owned());
        flags.push(release.to_owned());
    }
    if let Some(source) = settings.source_version() {
        flags.push("-source".to_owned());
        flags.push(source.to_owned());
    }
    if let Some(target) = settings.target_version() {
        flags.push("-target".to_owned());
        flags.push(target.to_owned());
    }
    for option in &settings.annotation_processor_options {
        flags.push(format!("-A{option}"));
    }
    for option in &settings.runtime_options {
        flags.push(format!("-J{option}"));
    }
    flags.extend(settings.extra_options.iter().cloned());
    Ok(flags)
}

/// Flag spelling for the mainline compiler.
#[derive(Clone, Copy, Debug, Default)]
pub struct JavacFlagBuilder;

impl FlagBuilder for JavacFlagBuilder {
    fn name(&self) -> &str {
        "javac"
    }

    fn build_flags(&self, settings: &CompilationSettings) -> Result<Vec<String>> {
        craft(settings, "-Werror")
    }
}

/// Flag spelling for the alternate batch compiler.
#[derive(Clone, Copy, Debug, Default)]
pub struct EcjFlagBuilder;

impl FlagBuilder for EcjFlagBuilder {
    fn name(&self) -> &str {
        "ecj"
    }

    fn build_flags(&self, settings: &CompilationSettings) -> Result<Vec<String>> {
        craft(settings, "--failOnWarning")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_produce_no_flags() {
        let flags = JavacFlagBuilder.build_flags(&CompilationSettings::default()).unwrap();
        assert!(flags.is_empty());
    }

    #[test]
    fn the_full_option_table_is_translated_in_order() {
        let mut settings = CompilationSettings {
            verbose: true,
            preview_features: true,
            warnings: false,
            warnings_as_errors: true,
            deprecation_warnings: true,
            annotation_processor_options: vec!["debug=true".into()],
            runtime_options: vec!["-Xmx512m".into()],
            extra_options: vec!["-nogen".into()],
            ..CompilationSettings::default()
        };
        settings.set_release_version("17");

        let flags = JavacFlagBuilder.build_flags(&settings).unwrap();
        assert_eq!(
            flags,
            vec![
                "-verbose",
                "--enable-preview",
                "-nowarn",
                "-Werror",
                "-deprecation",
                "--release",
                "17",
                "-Adebug=true",
                "-J-Xmx512m",
                "-nogen",
            ]
        );
    }

    #[test]
    fn builders_differ_only_in_the_warnings_as_errors_spelling() {
        let settings = CompilationSettings {
            warnings_as_errors: true,
            ..CompilationSettings::default()
        };
        assert_eq!(JavacFlagBuilder.build_flags(&settings).unwrap(), vec!["-Werror"]);
        assert_eq!(EcjFlagBuilder.build_flags(&settings).unwrap(), vec!["--failOnWarning"]);
    }

    #[test]
    fn building_twice_yields_the_same_tokens() {
        let mut settings = CompilationSettings::default();
        settings.set_source_version("11");
        settings.set_target_version("11");
        let first = EcjFlagBuilder.build_flags(&settings).unwrap();
        let second = EcjFlagBuilder.build_flags(&settings).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn release_clears_source_and_target_and_vice_versa() {
        let mut settings = CompilationSettings::default();
        settings.set_source_version("11");
        settings.set_target_version("11");
        settings.set_release_version("17");
        assert_eq!(settings.source_version(), None);
        assert_eq!(settings.target_version(), None);
        assert_eq!(settings.release_version(), Some("17"));

        settings.set_source_version("21");
        assert_eq!(settings.release_version(), None);
        assert_eq!(settings.source_version(), Some("21"));
    }

    #[test]
    fn negative_versions_are_a_configuration_error() {
        let mut settings = CompilationSettings::default();
        settings.set_release_version("-1");
        assert!(matches!(
            JavacFlagBuilder.build_flags(&settings),
            Err(HarnessError::Configuration(_))
        ));
    }
}
