//! Error types for ndcuda operations
//!
//! Backend-neutral taxonomy over the raw CUDA driver status codes plus the
//! host-side failure modes of the build pipeline (scratch files, compiler
//! process, module loader).

use thiserror::Error;

/// Result type alias for ndcuda operations
pub type Result<T> = std::result::Result<T, GpuError>;

/// Errors that can occur during backend operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    /// Malformed caller input: zero source fragments, size mismatches,
    /// out-of-range offsets, non-positive launch dimensions
    #[error("invalid value: {0}")]
    Value(String),

    /// Host resource failure: temp-file create/write or process spawn
    #[error("system error: {0}")]
    System(String),

    /// Underlying CUDA driver call failed
    #[error("driver error: {0} (code: {1})")]
    Driver(String, i32),

    /// Host allocation failure for argument/fragment bookkeeping
    #[error("host memory error: {0}")]
    Memory(String),

    /// Device memory allocation failure
    #[error("device allocation failed: {0}")]
    Allocation(String),

    /// External compiler exited nonzero or was killed by a signal
    #[error("kernel compiler failed: {0}")]
    Compiler(String),

    /// Device loader rejected the compiled artifact
    #[error("module load failed: {0}")]
    ModuleLoad(String),

    /// Entry symbol could not be resolved in a loaded module
    #[error("kernel function not found: {0}")]
    FunctionNotFound(String),

    /// Kernel launch or post-launch synchronization failed
    #[error("kernel launch failed: {0}")]
    Launch(String),

    /// Host/device or device/device transfer failed
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// CUDA driver library absent or `cuda` feature disabled
    #[error("CUDA not available: {0}")]
    NotAvailable(String),
}
