//! Minimal CUDA Driver API FFI Bindings
//!
//! Hand-written FFI for the driver functions this backend actually calls.
//! Dynamic loading via libcuda.so/nvcuda.dll, so there is no link-time
//! dependency on the CUDA toolkit.
//!
//! # Safety
//!
//! All function pointers in this module are unsafe to call. Safe wrappers
//! live in the sibling modules and in `buffer`/`kernel`.

use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_uchar, c_uint};
use std::sync::atomic::{AtomicI32, Ordering};

use crate::GpuError;

// ============================================================================
// CUDA Type Definitions (from cuda.h)
// ============================================================================

/// CUDA error code
pub type CUresult = c_int;

/// CUDA device handle
pub type CUdevice = c_int;

/// CUDA context handle (opaque pointer)
pub type CUcontext = *mut c_void;

/// CUDA module handle (opaque pointer)
pub type CUmodule = *mut c_void;

/// CUDA function handle (opaque pointer)
pub type CUfunction = *mut c_void;

/// CUDA stream handle (opaque pointer)
pub type CUstream = *mut c_void;

/// CUDA device pointer (GPU memory address)
pub type CUdeviceptr = u64;

// ============================================================================
// CUDA Error Codes (subset we report on)
// ============================================================================

/// Success
pub const CUDA_SUCCESS: CUresult = 0;
/// Invalid value passed
pub const CUDA_ERROR_INVALID_VALUE: CUresult = 1;
/// Out of memory
pub const CUDA_ERROR_OUT_OF_MEMORY: CUresult = 2;
/// Driver not initialized
pub const CUDA_ERROR_NOT_INITIALIZED: CUresult = 3;
/// Driver is shutting down
pub const CUDA_ERROR_DEINITIALIZED: CUresult = 4;
/// No CUDA device available
pub const CUDA_ERROR_NO_DEVICE: CUresult = 100;
/// Invalid device ordinal
pub const CUDA_ERROR_INVALID_DEVICE: CUresult = 101;
/// Invalid module image
pub const CUDA_ERROR_INVALID_IMAGE: CUresult = 200;
/// No context bound or invalid context
pub const CUDA_ERROR_INVALID_CONTEXT: CUresult = 201;
/// No kernel image suitable for device
pub const CUDA_ERROR_NO_BINARY_FOR_GPU: CUresult = 209;
/// Invalid kernel source
pub const CUDA_ERROR_INVALID_SOURCE: CUresult = 300;
/// File was not found
pub const CUDA_ERROR_FILE_NOT_FOUND: CUresult = 301;
/// Symbol not found
pub const CUDA_ERROR_NOT_FOUND: CUresult = 500;
/// Kernel raised an exception
pub const CUDA_ERROR_LAUNCH_FAILED: CUresult = 700;
/// Not enough resources to launch kernel
pub const CUDA_ERROR_LAUNCH_OUT_OF_RESOURCES: CUresult = 701;
/// Kernel took too long to execute
pub const CUDA_ERROR_LAUNCH_TIMEOUT: CUresult = 702;
/// Unknown internal error
pub const CUDA_ERROR_UNKNOWN: CUresult = 999;

// ============================================================================
// Last Driver Status
// ============================================================================

/// Status of the most recent checked driver call in this process.
///
/// Overwritten by the next fallible driver call; callers needing a stable
/// message must capture it immediately after the failing call.
static LAST_STATUS: AtomicI32 = AtomicI32::new(CUDA_SUCCESS);

/// Record a driver status code (done by [`CudaDriver::check`]).
pub(crate) fn record_status(code: CUresult) {
    LAST_STATUS.store(code, Ordering::Relaxed);
}

/// Human-readable string for the most recent driver status code.
#[must_use]
pub fn last_error_string() -> &'static str {
    cuda_error_string(LAST_STATUS.load(Ordering::Relaxed))
}

// ============================================================================
// CUDA Driver Function Pointers
// ============================================================================

/// Dynamically loaded CUDA driver functions
///
/// All function pointers are loaded at runtime from libcuda.so (Linux)
/// or nvcuda.dll (Windows). This avoids link-time dependency on CUDA.
#[allow(non_snake_case)]
pub struct CudaDriver {
    // Initialization
    /// cuInit - Initialize the CUDA driver
    pub cuInit: unsafe extern "C" fn(flags: c_uint) -> CUresult,

    // Device Management
    /// cuDeviceGetCount - Get number of CUDA devices
    pub cuDeviceGetCount: unsafe extern "C" fn(count: *mut c_int) -> CUresult,
    /// cuDeviceGet - Get device handle by ordinal
    pub cuDeviceGet: unsafe extern "C" fn(device: *mut CUdevice, ordinal: c_int) -> CUresult,

    // Context Management (Primary Context API)
    /// cuDevicePrimaryCtxRetain - Retain primary context
    pub cuDevicePrimaryCtxRetain:
        unsafe extern "C" fn(ctx: *mut CUcontext, device: CUdevice) -> CUresult,
    /// cuDevicePrimaryCtxRelease - Release primary context
    pub cuDevicePrimaryCtxRelease: unsafe extern "C" fn(device: CUdevice) -> CUresult,
    /// cuCtxSetCurrent - Set current context
    pub cuCtxSetCurrent: unsafe extern "C" fn(ctx: CUcontext) -> CUresult,
    /// cuCtxSynchronize - Synchronize current context
    pub cuCtxSynchronize: unsafe extern "C" fn() -> CUresult,

    // Module Management
    /// cuModuleLoad - Load module from a file (cubin/PTX artifact)
    pub cuModuleLoad:
        unsafe extern "C" fn(module: *mut CUmodule, fname: *const c_char) -> CUresult,
    /// cuModuleUnload - Unload module
    pub cuModuleUnload: unsafe extern "C" fn(module: CUmodule) -> CUresult,
    /// cuModuleGetFunction - Get function from module
    pub cuModuleGetFunction: unsafe extern "C" fn(
        func: *mut CUfunction,
        module: CUmodule,
        name: *const c_char,
    ) -> CUresult,

    // Memory Management
    /// cuMemAlloc - Allocate device memory
    pub cuMemAlloc: unsafe extern "C" fn(ptr: *mut CUdeviceptr, size: usize) -> CUresult,
    /// cuMemFree - Free device memory
    pub cuMemFree: unsafe extern "C" fn(ptr: CUdeviceptr) -> CUresult,
    /// cuMemcpyHtoD - Copy from host to device
    pub cuMemcpyHtoD:
        unsafe extern "C" fn(dst: CUdeviceptr, src: *const c_void, size: usize) -> CUresult,
    /// cuMemcpyDtoH - Copy from device to host
    pub cuMemcpyDtoH:
        unsafe extern "C" fn(dst: *mut c_void, src: CUdeviceptr, size: usize) -> CUresult,
    /// cuMemcpyDtoD - Copy from device to device
    pub cuMemcpyDtoD:
        unsafe extern "C" fn(dst: CUdeviceptr, src: CUdeviceptr, size: usize) -> CUresult,
    /// cuMemsetD8 - Fill device memory with a byte value
    pub cuMemsetD8:
        unsafe extern "C" fn(dst: CUdeviceptr, value: c_uchar, count: usize) -> CUresult,

    // Kernel Launch
    /// cuLaunchKernel - Launch a kernel
    #[allow(clippy::type_complexity)]
    pub cuLaunchKernel: unsafe extern "C" fn(
        func: CUfunction,
        grid_dim_x: c_uint,
        grid_dim_y: c_uint,
        grid_dim_z: c_uint,
        block_dim_x: c_uint,
        block_dim_y: c_uint,
        block_dim_z: c_uint,
        shared_mem_bytes: c_uint,
        stream: CUstream,
        kernel_params: *mut *mut c_void,
        extra: *mut *mut c_void,
    ) -> CUresult,
}

// ============================================================================
// Dynamic Loading
// ============================================================================

#[cfg(feature = "cuda")]
mod loading {
    use super::*;
    use libloading::{Library, Symbol};
    use std::sync::OnceLock;

    /// Global driver instance (loaded once)
    static DRIVER: OnceLock<Option<CudaDriver>> = OnceLock::new();

    /// Library handle (must outlive function pointers)
    static LIBRARY: OnceLock<Option<Library>> = OnceLock::new();

    impl CudaDriver {
        /// Load CUDA driver dynamically
        ///
        /// Returns `None` if CUDA is not available (no driver installed).
        /// This is NOT an error - it's expected on systems without NVIDIA GPUs.
        #[must_use]
        pub fn load() -> Option<&'static Self> {
            let _ = LIBRARY.get_or_init(|| {
                #[cfg(target_os = "linux")]
                let lib_names = ["libcuda.so.1", "libcuda.so"];
                #[cfg(target_os = "windows")]
                let lib_names = ["nvcuda.dll"];
                #[cfg(target_os = "macos")]
                let lib_names: [&str; 0] = [];

                for name in lib_names {
                    // SAFETY: We're loading a well-known system library
                    if let Ok(lib) = unsafe { Library::new(name) } {
                        return Some(lib);
                    }
                }
                None
            });

            DRIVER
                .get_or_init(|| {
                    let lib = LIBRARY.get()?.as_ref()?;
                    Self::load_from_library(lib)
                })
                .as_ref()
        }

        /// Load function pointers from library
        fn load_from_library(lib: &Library) -> Option<Self> {
            // SAFETY: All symbols are standard CUDA driver API functions
            unsafe {
                macro_rules! load_sym {
                    ($name:ident, $ty:ty) => {{
                        let sym: Symbol<'_, $ty> = lib.get(stringify!($name).as_bytes()).ok()?;
                        *sym
                    }};
                }

                type FnInit = unsafe extern "C" fn(c_uint) -> CUresult;
                type FnDeviceGetCount = unsafe extern "C" fn(*mut c_int) -> CUresult;
                type FnDeviceGet = unsafe extern "C" fn(*mut CUdevice, c_int) -> CUresult;
                type FnPrimaryCtxRetain =
                    unsafe extern "C" fn(*mut CUcontext, CUdevice) -> CUresult;
                type FnPrimaryCtxRelease = unsafe extern "C" fn(CUdevice) -> CUresult;
                type FnCtxSetCurrent = unsafe extern "C" fn(CUcontext) -> CUresult;
                type FnCtxSync = unsafe extern "C" fn() -> CUresult;
                type FnModuleLoad = unsafe extern "C" fn(*mut CUmodule, *const c_char) -> CUresult;
                type FnModuleUnload = unsafe extern "C" fn(CUmodule) -> CUresult;
                type FnModuleGetFunction =
                    unsafe extern "C" fn(*mut CUfunction, CUmodule, *const c_char) -> CUresult;
                type FnMemAlloc = unsafe extern "C" fn(*mut CUdeviceptr, usize) -> CUresult;
                type FnMemFree = unsafe extern "C" fn(CUdeviceptr) -> CUresult;
                type FnMemcpyHtoD =
                    unsafe extern "C" fn(CUdeviceptr, *const c_void, usize) -> CUresult;
                type FnMemcpyDtoH =
                    unsafe extern "C" fn(*mut c_void, CUdeviceptr, usize) -> CUresult;
                type FnMemcpyDtoD =
                    unsafe extern "C" fn(CUdeviceptr, CUdeviceptr, usize) -> CUresult;
                type FnMemsetD8 = unsafe extern "C" fn(CUdeviceptr, c_uchar, usize) -> CUresult;
                type FnLaunchKernel = unsafe extern "C" fn(
                    CUfunction,
                    c_uint,
                    c_uint,
                    c_uint,
                    c_uint,
                    c_uint,
                    c_uint,
                    c_uint,
                    CUstream,
                    *mut *mut c_void,
                    *mut *mut c_void,
                ) -> CUresult;

                Some(CudaDriver {
                    cuInit: load_sym!(cuInit, FnInit),
                    cuDeviceGetCount: load_sym!(cuDeviceGetCount, FnDeviceGetCount),
                    cuDeviceGet: load_sym!(cuDeviceGet, FnDeviceGet),
                    cuDevicePrimaryCtxRetain: load_sym!(
                        cuDevicePrimaryCtxRetain,
                        FnPrimaryCtxRetain
                    ),
                    cuDevicePrimaryCtxRelease: load_sym!(
                        cuDevicePrimaryCtxRelease_v2,
                        FnPrimaryCtxRelease
                    ),
                    cuCtxSetCurrent: load_sym!(cuCtxSetCurrent, FnCtxSetCurrent),
                    cuCtxSynchronize: load_sym!(cuCtxSynchronize, FnCtxSync),
                    cuModuleLoad: load_sym!(cuModuleLoad, FnModuleLoad),
                    cuModuleUnload: load_sym!(cuModuleUnload, FnModuleUnload),
                    cuModuleGetFunction: load_sym!(cuModuleGetFunction, FnModuleGetFunction),
                    cuMemAlloc: load_sym!(cuMemAlloc_v2, FnMemAlloc),
                    cuMemFree: load_sym!(cuMemFree_v2, FnMemFree),
                    cuMemcpyHtoD: load_sym!(cuMemcpyHtoD_v2, FnMemcpyHtoD),
                    cuMemcpyDtoH: load_sym!(cuMemcpyDtoH_v2, FnMemcpyDtoH),
                    cuMemcpyDtoD: load_sym!(cuMemcpyDtoD_v2, FnMemcpyDtoD),
                    cuMemsetD8: load_sym!(cuMemsetD8_v2, FnMemsetD8),
                    cuLaunchKernel: load_sym!(cuLaunchKernel, FnLaunchKernel),
                })
            }
        }

        /// Check a CUDA result, recording it as the last driver status
        ///
        /// # Errors
        ///
        /// Returns `Err(GpuError::Driver)` if result is not CUDA_SUCCESS.
        pub fn check(result: CUresult) -> Result<(), GpuError> {
            record_status(result);
            if result == CUDA_SUCCESS {
                Ok(())
            } else {
                Err(GpuError::Driver(
                    cuda_error_string(result).to_string(),
                    result,
                ))
            }
        }
    }
}

#[cfg(not(feature = "cuda"))]
mod loading {
    use super::*;

    impl CudaDriver {
        /// CUDA not available without feature
        #[must_use]
        pub fn load() -> Option<&'static Self> {
            None
        }

        /// Check always fails without CUDA
        pub fn check(result: CUresult) -> Result<(), GpuError> {
            record_status(result);
            Err(GpuError::NotAvailable(
                "cuda feature not enabled".to_string(),
            ))
        }
    }
}

// ============================================================================
// Error String Conversion
// ============================================================================

/// Convert CUDA error code to human-readable string
#[must_use]
pub fn cuda_error_string(code: CUresult) -> &'static str {
    match code {
        CUDA_SUCCESS => "Success",
        CUDA_ERROR_INVALID_VALUE => "Invalid value",
        CUDA_ERROR_OUT_OF_MEMORY => "Out of memory",
        CUDA_ERROR_NOT_INITIALIZED => "API not initialized",
        CUDA_ERROR_DEINITIALIZED => "Driver is shutting down",
        CUDA_ERROR_NO_DEVICE => "No CUDA devices available",
        CUDA_ERROR_INVALID_DEVICE => "Invalid device ordinal",
        CUDA_ERROR_INVALID_IMAGE => "Invalid module image",
        CUDA_ERROR_INVALID_CONTEXT => "No context bound or invalid context",
        CUDA_ERROR_NO_BINARY_FOR_GPU => "No kernel image suitable for device",
        CUDA_ERROR_INVALID_SOURCE => "Invalid kernel source",
        CUDA_ERROR_FILE_NOT_FOUND => "File was not found",
        CUDA_ERROR_NOT_FOUND => "Symbol not found",
        CUDA_ERROR_LAUNCH_FAILED => "Kernel raised an exception",
        CUDA_ERROR_LAUNCH_OUT_OF_RESOURCES => "Not enough resources to launch kernel",
        CUDA_ERROR_LAUNCH_TIMEOUT => "Kernel took too long to execute",
        CUDA_ERROR_UNKNOWN => "Unknown internal error",
        _ => "Unknown error code",
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Property-Based Tests
// ============================================================================
