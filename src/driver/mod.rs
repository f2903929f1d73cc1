//! CUDA Driver API (Minimal FFI)
//!
//! Minimal bindings to the CUDA driver API for context, memory, module, and
//! launch management. The raw function-pointer table lives in [`sys`]; all
//! unsafe driver calls are isolated there and in the safe wrappers built on
//! top of it.
//!
//! The `cuda` cargo feature controls dynamic loading of libcuda. Without it
//! the types still compile and every driver entry point reports
//! [`crate::GpuError::NotAvailable`].

mod context;
pub mod sys;

pub use context::{cuda_available, get_driver, CudaContext};
pub use sys::last_error_string;

#[cfg(all(test, not(feature = "cuda")))]
mod tests {
    use super::*;

    #[test]
    fn test_cuda_unavailable_without_feature() {
        assert!(!cuda_available());
    }
}
