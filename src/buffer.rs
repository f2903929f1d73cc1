//! Device Buffer Management
//!
//! Handles to contiguous device memory regions: owning allocations and
//! non-owning aliases (duplicates and offset sub-views). Dropping a handle
//! releases device memory only if the handle owns it, so a double free is
//! structurally impossible; keeping an alias alive past the allocation it
//! views remains the caller's responsibility.

use std::ffi::c_void;

use crate::driver::{get_driver, sys::CUdeviceptr, sys::CudaDriver, CudaContext};
use crate::error::{GpuError, Result};

/// Handle to a contiguous device memory region
///
/// Created either by [`DeviceBuffer::alloc`] (owning) or by
/// [`DeviceBuffer::duplicate`] / [`DeviceBuffer::offset`] (non-owning alias).
pub struct DeviceBuffer {
    /// Device address
    ptr: CUdeviceptr,
    /// Logical size in bytes
    size: usize,
    /// Whether drop releases the device memory
    owns: bool,
}

// SAFETY: device memory is accessible from any thread; call ordering is the
// caller's concern per the backend's sequential execution model
unsafe impl Send for DeviceBuffer {}
unsafe impl Sync for DeviceBuffer {}

impl DeviceBuffer {
    /// Allocate `size` bytes of device memory
    ///
    /// The returned buffer owns its allocation.
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Allocation)` if the device cannot satisfy the
    /// request.
    pub fn alloc(_ctx: &CudaContext, size: usize) -> Result<Self> {
        let driver = get_driver()?;

        let mut ptr: CUdeviceptr = 0;
        // SAFETY: ptr is a valid out-pointer
        let result = unsafe { (driver.cuMemAlloc)(&mut ptr, size) };
        CudaDriver::check(result).map_err(|e| GpuError::Allocation(e.to_string()))?;

        Ok(Self {
            ptr,
            size,
            owns: true,
        })
    }

    /// Create a non-owning handle over a raw device address range
    ///
    /// # Safety
    ///
    /// `ptr` must be a valid device address for `size` bytes, and the backing
    /// allocation must outlive the returned handle.
    #[must_use]
    pub unsafe fn from_raw_parts(ptr: CUdeviceptr, size: usize) -> Self {
        Self {
            ptr,
            size,
            owns: false,
        }
    }

    /// Produce a second, non-owning handle over the same address range
    ///
    /// The alias never frees the underlying memory; the original allocation
    /// must outlive it.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            ptr: self.ptr,
            size: self.size,
            owns: false,
        }
    }

    /// Device address
    #[must_use]
    pub fn as_ptr(&self) -> CUdeviceptr {
        self.ptr
    }

    /// Logical size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether this handle frees the device memory on drop
    #[must_use]
    pub fn is_owning(&self) -> bool {
        self.owns
    }

    /// Shrink this handle in place to a sub-view starting `delta` bytes in
    ///
    /// The view is non-owning regardless of the original flag: an offset
    /// view can never be responsible for freeing memory.
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Value)` if `delta` exceeds the logical size.
    pub fn offset(&mut self, delta: usize) -> Result<()> {
        if delta > self.size {
            return Err(GpuError::Value(format!(
                "offset {delta} outside buffer of {} bytes",
                self.size
            )));
        }
        self.ptr += delta as u64;
        self.size -= delta;
        self.owns = false;
        Ok(())
    }

    /// True iff the half-open address ranges of `self` and `other` intersect
    ///
    /// Used by upper layers to decide whether an operation may safely write
    /// in place.
    #[must_use]
    pub fn overlaps(&self, other: &DeviceBuffer) -> bool {
        self.ptr < other.ptr + other.size as u64 && other.ptr < self.ptr + self.size as u64
    }

    /// Device-to-device copy of `src` into this buffer
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Value)` if byte sizes differ, or
    /// `Err(GpuError::Transfer)` if the copy fails.
    pub fn copy_from(&mut self, src: &DeviceBuffer) -> Result<()> {
        if self.size != src.size {
            return Err(GpuError::Value(format!(
                "size mismatch: dst {} vs src {} bytes",
                self.size, src.size
            )));
        }

        let driver = get_driver()?;
        // SAFETY: both handles cover at least `size` bytes
        let result = unsafe { (driver.cuMemcpyDtoD)(self.ptr, src.ptr, self.size) };
        CudaDriver::check(result).map_err(|e| GpuError::Transfer(e.to_string()))
    }

    /// Copy the whole buffer to host memory
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Value)` unless `dst.len()` equals the logical
    /// size, or `Err(GpuError::Transfer)` if the copy fails.
    pub fn read(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() != self.size {
            return Err(GpuError::Value(format!(
                "size mismatch: host {} vs device {} bytes",
                dst.len(),
                self.size
            )));
        }

        let driver = get_driver()?;
        // SAFETY: dst is valid for `size` bytes, ptr is a valid device address
        let result =
            unsafe { (driver.cuMemcpyDtoH)(dst.as_mut_ptr() as *mut c_void, self.ptr, self.size) };
        CudaDriver::check(result).map_err(|e| GpuError::Transfer(e.to_string()))
    }

    /// Copy host memory into the whole buffer, then synchronize the context
    ///
    /// The synchronize guarantees the write is visible before any dependent
    /// launch.
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Value)` unless `src.len()` equals the logical
    /// size, or `Err(GpuError::Transfer)` if the copy or sync fails.
    pub fn write(&mut self, src: &[u8]) -> Result<()> {
        if src.len() != self.size {
            return Err(GpuError::Value(format!(
                "size mismatch: host {} vs device {} bytes",
                src.len(),
                self.size
            )));
        }

        let driver = get_driver()?;
        // SAFETY: src is valid for `size` bytes, ptr is a valid device address
        let result =
            unsafe { (driver.cuMemcpyHtoD)(self.ptr, src.as_ptr() as *const c_void, self.size) };
        CudaDriver::check(result).map_err(|e| GpuError::Transfer(e.to_string()))?;

        // SAFETY: context is current
        let result = unsafe { (driver.cuCtxSynchronize)() };
        CudaDriver::check(result).map_err(|e| GpuError::Transfer(e.to_string()))
    }

    /// Fill the buffer with a repeated byte value
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Transfer)` if the fill fails.
    pub fn memset(&mut self, value: u8) -> Result<()> {
        let driver = get_driver()?;
        // SAFETY: ptr is valid for `size` bytes
        let result = unsafe { (driver.cuMemsetD8)(self.ptr, value, self.size) };
        CudaDriver::check(result).map_err(|e| GpuError::Transfer(e.to_string()))
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if self.owns && self.ptr != 0 {
            if let Ok(driver) = get_driver() {
                // SAFETY: ptr is a live owning allocation from alloc()
                unsafe {
                    let _ = (driver.cuMemFree)(self.ptr);
                }
            }
        }
    }
}
