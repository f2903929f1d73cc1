//! CUDA Context Management
//!
//! Safe RAII wrapper over the Primary Context API. The backend acquires one
//! context per process and assumes a single logical thread drives all
//! allocation, build, and launch work; no internal locking is performed.

use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::sys::{CUcontext, CUdevice, CudaDriver, CUDA_SUCCESS};
use crate::GpuError;

/// Track whether cuInit has been called
static CUDA_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Get the CUDA driver, initializing if needed
///
/// # Errors
///
/// Returns `Err(GpuError::NotAvailable)` if the driver library is absent.
/// Returns `Err(GpuError::Driver)` if cuInit fails.
pub fn get_driver() -> Result<&'static CudaDriver, GpuError> {
    let driver = CudaDriver::load()
        .ok_or_else(|| GpuError::NotAvailable("CUDA driver not found".to_string()))?;

    if !CUDA_INITIALIZED.swap(true, Ordering::SeqCst) {
        // SAFETY: cuInit is safe to call multiple times, we just avoid redundant calls
        let result = unsafe { (driver.cuInit)(0) };
        if result != CUDA_SUCCESS {
            CUDA_INITIALIZED.store(false, Ordering::SeqCst);
            return Err(GpuError::Driver("cuInit failed".to_string(), result));
        }
        debug!("CUDA driver initialized");
    }

    Ok(driver)
}

/// CUDA context with RAII cleanup
///
/// Uses the Primary Context API so the context is shared with any other
/// driver user in the process and reference counted by the driver.
pub struct CudaContext {
    /// Device ordinal
    device: CUdevice,
    /// Primary context handle
    context: CUcontext,
}

// SAFETY: Primary context handles are process-wide driver state
unsafe impl Send for CudaContext {}
unsafe impl Sync for CudaContext {}

impl CudaContext {
    /// Acquire the compute context for the given device ordinal
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Value)` for an out-of-range ordinal.
    /// Returns `Err(GpuError::Driver)` if context acquisition fails.
    pub fn new(device_ordinal: i32) -> Result<Self, GpuError> {
        let driver = get_driver()?;

        let mut count: i32 = 0;
        // SAFETY: count is a valid pointer
        let result = unsafe { (driver.cuDeviceGetCount)(&mut count) };
        CudaDriver::check(result)?;

        if device_ordinal < 0 || device_ordinal >= count {
            return Err(GpuError::Value(format!(
                "device ordinal {device_ordinal} out of range (found {count})"
            )));
        }

        let mut device: CUdevice = 0;
        // SAFETY: device_ordinal is validated above
        let result = unsafe { (driver.cuDeviceGet)(&mut device, device_ordinal) };
        CudaDriver::check(result)?;

        let mut context: CUcontext = ptr::null_mut();
        // SAFETY: device is a valid handle from cuDeviceGet
        let result = unsafe { (driver.cuDevicePrimaryCtxRetain)(&mut context, device) };
        CudaDriver::check(result)?;

        // SAFETY: context is valid from cuDevicePrimaryCtxRetain
        let result = unsafe { (driver.cuCtxSetCurrent)(context) };
        if result != CUDA_SUCCESS {
            // SAFETY: release what we retained above
            unsafe { (driver.cuDevicePrimaryCtxRelease)(device) };
            return Err(GpuError::Driver(
                "cuCtxSetCurrent failed".to_string(),
                result,
            ));
        }

        debug!(device_ordinal, "CUDA context acquired");
        Ok(Self { device, context })
    }

    /// Get device ordinal
    #[must_use]
    pub fn device(&self) -> i32 {
        self.device
    }

    /// Get raw context handle
    ///
    /// # Safety
    ///
    /// The returned handle is only valid while this `CudaContext` is alive.
    #[must_use]
    pub fn raw(&self) -> CUcontext {
        self.context
    }

    /// Synchronize all work on this context
    ///
    /// Blocks until all preceding device commands have completed.
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Driver)` if synchronization fails.
    pub fn synchronize(&self) -> Result<(), GpuError> {
        let driver = get_driver()?;

        // SAFETY: context is current (set in constructor)
        let result = unsafe { (driver.cuCtxSynchronize)() };
        CudaDriver::check(result)
    }
}

impl Drop for CudaContext {
    fn drop(&mut self) {
        if let Ok(driver) = get_driver() {
            // SAFETY: device is valid from constructor
            unsafe {
                let _ = (driver.cuDevicePrimaryCtxRelease)(self.device);
            }
        }
    }
}

/// Check if a CUDA device is usable
///
/// Returns `true` if the driver loads and at least one device exists.
#[must_use]
pub fn cuda_available() -> bool {
    let Ok(driver) = get_driver() else {
        return false;
    };
    let mut count: i32 = 0;
    // SAFETY: count is a valid pointer
    let result = unsafe { (driver.cuDeviceGetCount)(&mut count) };
    result == CUDA_SUCCESS && count > 0
}
