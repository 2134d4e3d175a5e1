//! Compiler collaborator contract.
//!
//! Publishing only needs two things from a compiler: the compiled output and
//! whether compilation produced errors. [`ModuleCompiler`] captures exactly
//! that, so the registry code never depends on a language front end.

use std::path::{Path, PathBuf};

/// Result of compiling one module.
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    /// Path of the compiled module.
    pub input: PathBuf,

    /// Compiled output bytes.
    pub output: Vec<u8>,

    /// Error diagnostics produced during compilation.
    pub errors: Vec<String>,
}

impl Compilation {
    /// Returns the number of error diagnostics.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns true if compilation produced no errors.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A compiler turning a module source file into publishable output.
pub trait ModuleCompiler {
    /// Compiles the module at `input`.
    ///
    /// Failures are reported as error diagnostics on the returned
    /// [`Compilation`], never as a panic.
    fn compile(&self, input: &Path) -> Compilation;
}

/// Compiler that publishes a module source file verbatim.
///
/// It reports an error for unreadable, empty or non-UTF-8 input.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceCompiler;

impl ModuleCompiler for SourceCompiler {
    fn compile(&self, input: &Path) -> Compilation {
        let mut compilation = Compilation {
            input: input.to_path_buf(),
            ..Compilation::default()
        };

        match std::fs::read(input) {
            Ok(bytes) if bytes.is_empty() => {
                compilation.errors.push(format!(
                    "{}: the module source is empty.",
                    input.display()
                ));
            }
            Ok(bytes) => {
                if std::str::from_utf8(&bytes).is_err() {
                    compilation.errors.push(format!(
                        "{}: the module source is not valid UTF-8.",
                        input.display()
                    ));
                } else {
                    compilation.output = bytes;
                }
            }
            Err(e) => {
                compilation
                    .errors
                    .push(format!("{}: unable to read the module source: {e}", input.display()));
            }
        }

        tracing::debug!(
            path = %input.display(),
            errors = compilation.error_count(),
            "Compiled module"
        );

        compilation
    }
}
