//! Kernel Build Pipeline
//!
//! Assembles kernel source fragments, compiles them out-of-process with the
//! external CUDA compiler, loads the produced cubin into the device context,
//! and resolves the entry function.
//!
//! Scratch-file protocol: the concatenated source goes to a uniquely named
//! `.cu` file in the platform temp directory (`TMPDIR` override honored);
//! the artifact path derives from it. Both files are removed on every exit
//! path - success, spawn failure, compiler failure, or loader failure.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::driver::CudaContext;
use crate::error::{GpuError, Result};
use crate::kernel::Kernel;

/// Environment variable naming the external compiler executable.
///
/// Defaults to `nvcc` on `PATH` when unset.
pub const COMPILER_ENV: &str = "NDCUDA_NVCC";

/// Removes a scratch path on drop, whatever the exit path was.
#[derive(Debug)]
struct ScratchGuard(PathBuf);

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

/// A compiled artifact on disk; both scratch files are removed on drop.
#[derive(Debug)]
struct CompiledArtifact {
    path: PathBuf,
    _artifact: ScratchGuard,
    _source: NamedTempFile,
}

/// Build a kernel from source fragments and resolve its entry function
///
/// Fragments are concatenated in order, so headers, bodies, and footers can
/// be generated separately and assembled without intermediate copies.
///
/// # Errors
///
/// - `GpuError::Value` - zero fragments (nothing to compile)
/// - `GpuError::System` - scratch file or process spawn failure
/// - `GpuError::Compiler` - nonzero exit or signal termination of the
///   external compiler
/// - `GpuError::ModuleLoad` / `GpuError::FunctionNotFound` - the device
///   loader rejects the artifact or cannot resolve `entry`
pub fn build_kernel(ctx: &CudaContext, fragments: &[&str], entry: &str) -> Result<Kernel> {
    let artifact = compile_with(&compiler_path(), fragments)?;
    Kernel::load(ctx, &artifact.path, entry)
}

fn compiler_path() -> PathBuf {
    env::var_os(COMPILER_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("nvcc"))
}

/// Write fragments to a scratch source file and run the external compiler.
fn compile_with(compiler: &Path, fragments: &[&str]) -> Result<CompiledArtifact> {
    if fragments.is_empty() {
        return Err(GpuError::Value("no source fragments to compile".to_string()));
    }

    let mut source = tempfile::Builder::new()
        .prefix("ndcuda-")
        .suffix(".cu")
        .tempfile()
        .map_err(|e| GpuError::System(format!("scratch source create failed: {e}")))?;
    for frag in fragments {
        source
            .write_all(frag.as_bytes())
            .map_err(|e| GpuError::System(format!("scratch source write failed: {e}")))?;
    }
    source
        .flush()
        .map_err(|e| GpuError::System(format!("scratch source write failed: {e}")))?;

    let path = artifact_path(source.path());
    // Held from before the spawn so the artifact is removed even when the
    // compiler fails after creating a partial output.
    let artifact = ScratchGuard(path.clone());

    debug!(
        source = %source.path().display(),
        artifact = %path.display(),
        compiler = %compiler.display(),
        "compiling kernel"
    );

    let output = Command::new(compiler)
        .arg("-x")
        .arg("cu")
        .arg("--cubin")
        .arg(source.path())
        .arg("-o")
        .arg(&path)
        .output()
        .map_err(|e| GpuError::System(format!("spawn {}: {e}", compiler.display())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, "kernel compiler failed");
        return Err(GpuError::Compiler(format!(
            "{}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(CompiledArtifact {
        path,
        _artifact: artifact,
        _source: source,
    })
}

/// Artifact path derived from the scratch source path.
fn artifact_path(source: &Path) -> PathBuf {
    let mut os = source.as_os_str().to_os_string();
    os.push(".cubin");
    PathBuf::from(os)
}
