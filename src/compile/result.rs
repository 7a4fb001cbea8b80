use crate::{
    diagnostics::TraceDiagnostic,
    files::FileObject,
    fm::ContainerFileManager,
};
use std::sync::Arc;

/// The immutable artifact of one compilation.
///
/// Holds only handles; post-compilation inspection of outputs goes through
/// the retained file manager. Closing the workspace invalidates
/// file-manager-backed queries, so assertions belong before teardown.
#[derive(Clone, Debug)]
pub struct CompilationResult {
    success: bool,
    failure_on_warnings: bool,
    output_lines: Vec<String>,
    compilation_units: Vec<FileObject>,
    diagnostics: Vec<TraceDiagnostic>,
    file_manager: Arc<ContainerFileManager>,
}

impl CompilationResult {
    pub(crate) fn new(
        success: bool,
        failure_on_warnings: bool,
        output_lines: Vec<String>,
        compilation_units: Vec<FileObject>,
        diagnostics: Vec<TraceDiagnostic>,
        file_manager: Arc<ContainerFileManager>,
    ) -> Self {
        Self {
            success,
            failure_on_warnings,
            output_lines,
            compilation_units,
            diagnostics,
            file_manager,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// The warnings-as-errors policy that was applied.
    pub fn failure_on_warnings(&self) -> bool {
        self.failure_on_warnings
    }

    /// Compiler console output, split on line terminators with empty lines
    /// preserved.
    pub fn output_lines(&self) -> &[String] {
        &self.output_lines
    }

    /// The source files discovered and handed to the compiler, deduplicated
    /// by identity, in discovery order.
    pub fn compilation_units(&self) -> &[FileObject] {
        &self.compilation_units
    }

    /// Every diagnostic in report order.
    pub fn diagnostics(&self) -> &[TraceDiagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> Vec<&TraceDiagnostic> {
        self.diagnostics.iter().filter(|d| d.kind().is_error()).collect()
    }

    pub fn warnings(&self) -> Vec<&TraceDiagnostic> {
        self.diagnostics.iter().filter(|d| d.kind().is_warning()).collect()
    }

    /// The post-compilation file manager, for inspecting outputs.
    pub fn file_manager(&self) -> &Arc<ContainerFileManager> {
        &self.file_manager
    }
}
