//! # ndcuda: CUDA Backend for Strided N-Dimensional Arrays
//!
//! One pluggable backend behind an array-buffer interface: device buffer
//! lifecycle and aliasing, an out-of-process kernel build pipeline
//! (source fragments → external compiler → module load → entry
//! resolution), typed argument marshaling and launch, and an elementwise
//! kernel source generator for arbitrarily strided N-dimensional arrays.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ndcuda::{elemwise, ArrayDesc, CudaContext, DeviceBuffer, ElemOp, ScalarType};
//!
//! let ctx = CudaContext::new(0)?;
//! let mut a = DeviceBuffer::alloc(&ctx, 256 * 4)?;
//! let b = DeviceBuffer::alloc(&ctx, 256 * 4)?;
//!
//! let host: Vec<u8> = (0..256u32).flat_map(|i| (i as f32).to_ne_bytes()).collect();
//! a.write(&host)?;
//!
//! let desc = ArrayDesc::new(vec![256], vec![1])?;
//! elemwise(&ctx, &a, &b, ScalarType::F32, ScalarType::F32, ElemOp::Assign, &desc, &desc)?;
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - CUDA driver API (minimal FFI, dynamic loading)
//! - [`buffer`] - device buffer lifecycle and aliasing
//! - [`build`] - out-of-process kernel build pipeline
//! - [`kernel`] - argument binding and launch
//! - [`elemwise`] - elementwise kernel source generation
//!
//! ## Execution Model
//!
//! One context per process, one logical thread of control. Launches and
//! host-to-device writes synchronize the context before returning, so all
//! cross-call ordering is sequential; multi-threaded callers need external
//! mutual exclusion around the buffer/kernel/launch sequence.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
// Allow uninlined format args - stylistic preference
#![allow(clippy::uninlined_format_args)]
// Allow missing errors doc where the Result type says it all
#![allow(clippy::missing_errors_doc)]
// Allow unwrap/expect in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod buffer;
pub mod build;
pub mod driver;
pub mod elemwise;
pub mod kernel;

/// Error types for backend operations
pub mod error;

pub use buffer::DeviceBuffer;
pub use build::build_kernel;
pub use driver::{cuda_available, last_error_string, CudaContext};
pub use elemwise::{elemwise, launch_config, ArrayDesc, ElemOp, ScalarType};
pub use error::{GpuError, Result};
pub use kernel::{Kernel, KernelArg};
