//! Client binding generation.

use crate::CompileError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Turns a schema document into client bindings.
///
/// Implementations run synchronously and either fully succeed or fail.
pub trait BindingGenerator: Send + Sync {
    fn generate(&self, schema: &Path, out_dir: &Path) -> Result<(), CompileError>;
}

/// Runs `protoc --csharp_out=<out_dir> <schema>`.
#[derive(Debug, Clone)]
pub struct ProtocGenerator {
    program: PathBuf,
}

impl Default for ProtocGenerator {
    fn default() -> Self {
        Self {
            program: PathBuf::from("protoc"),
        }
    }
}

impl ProtocGenerator {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl BindingGenerator for ProtocGenerator {
    fn generate(&self, schema: &Path, out_dir: &Path) -> Result<(), CompileError> {
        let fail = |detail: String| CompileError::Codegen {
            schema: schema.to_path_buf(),
            detail,
        };
        std::fs::create_dir_all(out_dir).map_err(|e| CompileError::io(out_dir, e))?;

        let mut cmd = Command::new(&self.program);
        if let Some(dir) = schema.parent().filter(|p| !p.as_os_str().is_empty()) {
            cmd.arg(format!("--proto_path={}", dir.display()));
        }
        cmd.arg(format!("--csharp_out={}", out_dir.display())).arg(schema);

        let output = cmd
            .output()
            .map_err(|e| fail(format!("cannot run {}: {e}", self.program.display())))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(fail(format!("{} exited with {}: {}", self.program.display(), output.status, stderr.trim())));
        }
        if !stderr.trim().is_empty() {
            return Err(fail(stderr.trim().to_string()));
        }
        info!(schema = %schema.display(), out = %out_dir.display(), "bindings generated");
        Ok(())
    }
}
