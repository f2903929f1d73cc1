//! Kernel Handles and Invocation
//!
//! A [`Kernel`] owns a loaded device module, one resolved entry function,
//! and a dense argument table. Arguments are either scalar byte blobs copied
//! by value or device buffer addresses; rebinding a slot drops the previous
//! binding. Launches run on the default stream and synchronize the whole
//! context before returning, so a launch error reliably names this kernel
//! rather than prior pending work.

use std::ffi::{c_void, CString};
use std::path::Path;
use std::ptr;

use crate::buffer::DeviceBuffer;
use crate::driver::{get_driver, CudaContext};
use crate::driver::sys::{CUdeviceptr, CUfunction, CUmodule, CudaDriver};
use crate::error::{GpuError, Result};

/// One bound kernel argument
pub enum KernelArg {
    /// Scalar bytes copied by value at bind time
    Scalar(Box<[u8]>),
    /// Device address of a buffer (pointer-width scalar)
    Buffer(CUdeviceptr),
}

/// Handle to a compiled, loaded unit of device code plus one entry point
pub struct Kernel {
    /// Loaded module
    module: CUmodule,
    /// Resolved entry function
    func: CUfunction,
    /// Dense argument table indexed by slot; unbound slots launch as null
    args: Vec<Option<KernelArg>>,
}

// SAFETY: module/function handles are process-wide driver state; the
// argument table is only mutated through &mut self
unsafe impl Send for Kernel {}

impl Kernel {
    /// Load a compiled artifact and resolve the entry function
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::ModuleLoad)` if the loader rejects the
    /// artifact, `Err(GpuError::FunctionNotFound)` if the entry symbol is
    /// absent.
    pub(crate) fn load(_ctx: &CudaContext, artifact: &Path, entry: &str) -> Result<Self> {
        let driver = get_driver()?;

        let path_str = artifact
            .to_str()
            .ok_or_else(|| GpuError::System("non-UTF-8 artifact path".to_string()))?;
        let path_c = CString::new(path_str)
            .map_err(|_| GpuError::System("artifact path contains null byte".to_string()))?;

        let mut module: CUmodule = ptr::null_mut();
        // SAFETY: path_c is a valid null-terminated string
        let result = unsafe { (driver.cuModuleLoad)(&mut module, path_c.as_ptr()) };
        CudaDriver::check(result).map_err(|e| GpuError::ModuleLoad(e.to_string()))?;

        let entry_c = CString::new(entry)
            .map_err(|_| GpuError::FunctionNotFound(entry.to_string()))?;
        let mut func: CUfunction = ptr::null_mut();
        // SAFETY: module is valid, entry_c is null-terminated
        let result = unsafe { (driver.cuModuleGetFunction)(&mut func, module, entry_c.as_ptr()) };
        if CudaDriver::check(result).is_err() {
            // SAFETY: module is valid from cuModuleLoad above
            unsafe {
                let _ = (driver.cuModuleUnload)(module);
            }
            return Err(GpuError::FunctionNotFound(entry.to_string()));
        }

        Ok(Self {
            module,
            func,
            args: Vec::new(),
        })
    }

    /// Bind raw scalar bytes to an argument slot, copied by value
    ///
    /// Binding past the current capacity grows the table; unbound lower
    /// slots stay in a defined null state. Rebinding a slot releases the
    /// previous value.
    pub fn set_arg(&mut self, slot: usize, bytes: &[u8]) {
        self.bind(slot, KernelArg::Scalar(bytes.to_vec().into_boxed_slice()));
    }

    /// Bind a buffer's device address to an argument slot
    pub fn set_arg_buffer(&mut self, slot: usize, buf: &DeviceBuffer) {
        self.bind(slot, KernelArg::Buffer(buf.as_ptr()));
    }

    fn bind(&mut self, slot: usize, arg: KernelArg) {
        if slot >= self.args.len() {
            self.args.resize_with(slot + 1, || None);
        }
        self.args[slot] = Some(arg);
    }

    /// Number of argument slots bound so far (dense table length)
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Whether a slot currently holds a binding
    #[must_use]
    pub fn arg_is_bound(&self, slot: usize) -> bool {
        matches!(self.args.get(slot), Some(Some(_)))
    }

    /// Launch the entry function over the given grid/block, then synchronize
    ///
    /// Grid/block dimensions must be positive; sizing them against hardware
    /// limits is the caller's policy.
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Value)` for a zero dimension, or
    /// `Err(GpuError::Launch)` if the launch or the following context
    /// synchronize fails.
    pub fn launch(&mut self, grid: (u32, u32, u32), block: (u32, u32, u32)) -> Result<()> {
        if grid.0 == 0 || grid.1 == 0 || grid.2 == 0 {
            return Err(GpuError::Value(format!("grid dimensions {grid:?} must be positive")));
        }
        if block.0 == 0 || block.1 == 0 || block.2 == 0 {
            return Err(GpuError::Value(format!(
                "block dimensions {block:?} must be positive"
            )));
        }

        let driver = get_driver()?;

        // cuLaunchKernel takes an array of pointers, one per parameter, each
        // pointing at that parameter's value. Buffer args point at the
        // stored device address; the table must not move during the call.
        let mut params: Vec<*mut c_void> = self
            .args
            .iter()
            .map(|slot| match slot {
                Some(KernelArg::Scalar(bytes)) => bytes.as_ptr() as *mut c_void,
                Some(KernelArg::Buffer(ptr)) => ptr as *const CUdeviceptr as *mut c_void,
                None => ptr::null_mut(),
            })
            .collect();

        // SAFETY: func is valid, params points at live bindings owned by
        // self.args for the duration of the call
        let result = unsafe {
            (driver.cuLaunchKernel)(
                self.func,
                grid.0,
                grid.1,
                grid.2,
                block.0,
                block.1,
                block.2,
                0,
                ptr::null_mut(),
                params.as_mut_ptr(),
                ptr::null_mut(),
            )
        };
        CudaDriver::check(result).map_err(|e| GpuError::Launch(e.to_string()))?;

        // SAFETY: context is current
        let result = unsafe { (driver.cuCtxSynchronize)() };
        CudaDriver::check(result).map_err(|e| GpuError::Launch(e.to_string()))
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        // Bound argument storage is released by the Vec; the module needs an
        // explicit unload.
        if !self.module.is_null() {
            if let Ok(driver) = get_driver() {
                // SAFETY: module is valid from load()
                unsafe {
                    let _ = (driver.cuModuleUnload)(self.module);
                }
            }
        }
    }
}
