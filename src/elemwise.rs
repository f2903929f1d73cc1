//! Elementwise Kernel Generation
//!
//! Turns two N-dimensional strided array descriptors and a scalar operator
//! into CUDA kernel source implementing `output = op(input)` element by
//! element, then compiles and launches it through the build pipeline.
//!
//! The generated kernel uses a grid-stride loop: each thread starts at its
//! global index and strides forward by the total thread count, so the kernel
//! is correct for any launch that does not exceed the element count -
//! including launches smaller than the problem size.

use crate::buffer::DeviceBuffer;
use crate::build::build_kernel;
use crate::driver::CudaContext;
use crate::error::{GpuError, Result};

/// Entry symbol of every generated elementwise kernel
const ELEMWISE_ENTRY: &str = "elemk";

/// Scalar element types the generator can address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl ScalarType {
    /// Device-side type name used in generated source
    #[must_use]
    pub fn device_name(self) -> &'static str {
        match self {
            Self::I8 => "signed char",
            Self::I16 => "short",
            Self::I32 => "int",
            Self::I64 => "long long",
            Self::U8 => "unsigned char",
            Self::U16 => "unsigned short",
            Self::U32 => "unsigned int",
            Self::U64 => "unsigned long long",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }

    /// Element size in bytes
    #[must_use]
    pub fn size_of(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

/// Infix operator applied between the output and input elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemOp {
    /// `b = a`
    Assign,
    /// `b += a`
    AddAssign,
    /// `b -= a`
    SubAssign,
    /// `b *= a`
    MulAssign,
    /// `b /= a`
    DivAssign,
}

impl ElemOp {
    /// Operator token emitted between the two computed addresses
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::AddAssign => "+=",
            Self::SubAssign => "-=",
            Self::MulAssign => "*=",
            Self::DivAssign => "/=",
        }
    }
}

/// Transient N-dimensional strided array descriptor
///
/// Strides are expressed in elements, are signed, may be non-monotonic, and
/// may encode broadcast via a zero stride. Exists only for the duration of
/// one generation call; no device state refers to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDesc {
    dims: Vec<usize>,
    strides: Vec<isize>,
}

impl ArrayDesc {
    /// Create a descriptor from per-dimension extents and element strides
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError::Value)` if the two sequences differ in length -
    /// the one shape property correct codegen depends on.
    pub fn new(dims: Vec<usize>, strides: Vec<isize>) -> Result<Self> {
        if dims.len() != strides.len() {
            return Err(GpuError::Value(format!(
                "{} extents vs {} strides",
                dims.len(),
                strides.len()
            )));
        }
        Ok(Self { dims, strides })
    }

    /// Dimension count
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of extents (1 for rank 0)
    #[must_use]
    pub fn total_elements(&self) -> usize {
        self.dims.iter().product()
    }
}

// ============================================================================
// Source Generation
// ============================================================================

/// Kernel signature and grid-stride loop opener.
fn emit_header(in_ty: ScalarType, out_ty: ScalarType, total: usize) -> String {
    format!(
        "#define DTYPEA {a}\n\
         #define DTYPEB {b}\n\
         __global__ void {entry}(const DTYPEA *a_data, DTYPEB *b_data) {{\
         const int idx = blockIdx.x * blockDim.x + threadIdx.x;\
         const int numThreads = blockDim.x * gridDim.x;\
         for (int i = idx; i < {total}; i += numThreads) {{\
         const DTYPEA *a = a_data;\
         DTYPEB *b = b_data;",
        a = in_ty.device_name(),
        b = out_ty.device_name(),
        entry = ELEMWISE_ENTRY,
    )
}

/// Per-dimension addressing: peel coordinates off the flat loop index from
/// the innermost dimension outward, advancing the typed pointer `id` by each
/// coordinate times its element stride.
fn emit_perdim(frags: &mut Vec<String>, desc: &ArrayDesc, id: &str) {
    let nd = desc.rank();
    if nd == 0 {
        return;
    }
    frags.push(format!("int {id}i = i;"));
    for d in (1..nd).rev() {
        frags.push(format!(
            "{id} += (({id}i % {dim}) * {stride});{id}i = {id}i / {dim};",
            dim = desc.dims[d],
            stride = desc.strides[d],
        ));
    }
    frags.push(format!("{id} += {id}i * {stride};", stride = desc.strides[0]));
}

/// Generate the complete fragment list for one elementwise application
///
/// The general strided path is always taken; a flat-index body for fully
/// contiguous descriptors is reserved for future optimization.
#[must_use]
pub fn elemwise_source(
    in_ty: ScalarType,
    out_ty: ScalarType,
    op: ElemOp,
    a_desc: &ArrayDesc,
    b_desc: &ArrayDesc,
) -> Vec<String> {
    let total = a_desc.total_elements();
    let mut frags = Vec::new();

    frags.push(emit_header(in_ty, out_ty, total));
    emit_perdim(&mut frags, a_desc, "a");
    emit_perdim(&mut frags, b_desc, "b");
    frags.push(format!("b[0] {} a[0];", op.token()));
    frags.push("}}\n".to_string());
    frags
}

// ============================================================================
// Launch Sizing
// ============================================================================

/// Occupancy policy for generated elementwise kernels
///
/// Returns `(grid_x, block_x)` for a 1-D launch. A placeholder heuristic,
/// not a hardware-derived optimum: block = min(32, total), grid =
/// min(ceil(total / block), 60), widening block up to 512 when the product
/// still undershoots `total`. The grid-stride loop keeps any undershoot
/// correct.
#[must_use]
pub fn launch_config(total: usize) -> (u32, u32) {
    if total == 0 {
        return (1, 1);
    }
    let mut block = total.min(32);
    let grid = (total / block + usize::from(total % block != 0)).min(60);
    if block * grid < total {
        block = (total / grid).min(512);
    }
    (grid as u32, block as u32)
}

// ============================================================================
// Driver
// ============================================================================

/// Apply `op` elementwise from `input` to `output`
///
/// Generates kernel source for the two descriptors, compiles it through the
/// build pipeline, binds the buffers to argument slots 0 and 1, launches
/// with [`launch_config`], and synchronizes. The kernel and all source
/// fragments are released on every exit path.
///
/// # Errors
///
/// Propagates the build pipeline and invocation taxonomies.
#[allow(clippy::too_many_arguments)]
pub fn elemwise(
    ctx: &CudaContext,
    input: &DeviceBuffer,
    output: &DeviceBuffer,
    in_ty: ScalarType,
    out_ty: ScalarType,
    op: ElemOp,
    a_desc: &ArrayDesc,
    b_desc: &ArrayDesc,
) -> Result<()> {
    let total = a_desc.total_elements();
    if total == 0 {
        return Ok(());
    }

    let frags = elemwise_source(in_ty, out_ty, op, a_desc, b_desc);
    let refs: Vec<&str> = frags.iter().map(String::as_str).collect();

    let mut kernel = build_kernel(ctx, &refs, ELEMWISE_ENTRY)?;
    kernel.set_arg_buffer(0, input);
    kernel.set_arg_buffer(1, output);

    let (grid, block) = launch_config(total);
    kernel.launch((grid, 1, 1), (block, 1, 1))
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The policy never exceeds its caps and never emits a zero dimension
        #[test]
        fn prop_launch_config_within_caps(total in 1usize..1_000_000) {
            let (grid, block) = launch_config(total);
            prop_assert!(grid >= 1 && grid <= 60);
            prop_assert!(block >= 1 && block <= 512);
        }

        /// Below the grid cap the launch covers every element exactly; any
        /// undershoot beyond that is absorbed by the grid-stride loop
        #[test]
        fn prop_launch_config_covers_uncapped_problems(total in 1usize..=1920) {
            let (grid, block) = launch_config(total);
            prop_assert!(grid as usize * block as usize >= total);
        }
    }
}
