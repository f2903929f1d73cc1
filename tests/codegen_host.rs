//! Codegen Validation Tests (No CUDA Required)
//!
//! Validate generated kernel source structure and the launch policy without
//! requiring CUDA hardware or the external compiler.

use ndcuda::elemwise::elemwise_source;
use ndcuda::{launch_config, ArrayDesc, DeviceBuffer, ElemOp, GpuError, ScalarType};

fn desc(dims: &[usize], strides: &[isize]) -> ArrayDesc {
    ArrayDesc::new(dims.to_vec(), strides.to_vec()).expect("valid descriptor")
}

// ============================================================================
// GENERATED SOURCE STRUCTURE
// ============================================================================

#[test]
fn contiguous_1d_assignment_source() {
    // The end-to-end example shape: 256 contiguous floats
    let d = desc(&[256], &[1]);
    let source = elemwise_source(ScalarType::F32, ScalarType::F32, ElemOp::Assign, &d, &d).concat();

    assert!(source.contains("#define DTYPEA float"));
    assert!(source.contains("#define DTYPEB float"));
    assert!(source.contains("for (int i = idx; i < 256; i += numThreads)"));
    assert!(source.contains("a += ai * 1;"));
    assert!(source.contains("b += bi * 1;"));
    assert!(source.contains("b[0] = a[0];"));
}

#[test]
fn broadcast_input_uses_zero_stride_term() {
    // Input broadcasts along the first dimension, output does not
    let a = desc(&[4, 8], &[0, 1]);
    let b = desc(&[4, 8], &[8, 1]);
    let source = elemwise_source(ScalarType::F32, ScalarType::F32, ElemOp::Assign, &a, &b).concat();

    assert!(source.contains("a += ai * 0;"));
    assert!(source.contains("b += bi * 8;"));
    // Loop bound follows the input shape
    assert!(source.contains("i < 32;"));
}

#[test]
fn rank_three_peels_dimensions_innermost_first() {
    let d = desc(&[2, 3, 4], &[12, 4, 1]);
    let source =
        elemwise_source(ScalarType::F64, ScalarType::F64, ElemOp::AddAssign, &d, &d).concat();

    // Innermost dimension (extent 4) is peeled before the middle (extent 3)
    let inner = source.find("((ai % 4) * 1)").expect("inner dim term");
    let middle = source.find("((ai % 3) * 4)").expect("middle dim term");
    assert!(inner < middle);
    assert!(source.contains("a += ai * 12;"));
    assert!(source.contains("b[0] += a[0];"));
}

#[test]
fn mixed_types_take_separate_defines() {
    let d = desc(&[16], &[1]);
    let source = elemwise_source(ScalarType::U8, ScalarType::I64, ElemOp::Assign, &d, &d).concat();
    assert!(source.contains("#define DTYPEA unsigned char"));
    assert!(source.contains("#define DTYPEB long long"));
}

// ============================================================================
// LAUNCH POLICY
// ============================================================================

#[test]
fn launch_policy_reference_points() {
    assert_eq!(launch_config(1), (1, 1));
    assert_eq!(launch_config(256), (8, 32));
    // Grid caps at 60 and the block widens to cover more of the problem
    assert_eq!(launch_config(10_000), (60, 166));
    // Block widening caps at 512
    assert_eq!(launch_config(1_000_000), (60, 512));
}

// ============================================================================
// DESCRIPTOR AND VIEW INVARIANTS
// ============================================================================

#[test]
fn descriptor_shape_mismatch_is_value_error() {
    let err = ArrayDesc::new(vec![2, 3], vec![6]).unwrap_err();
    assert!(matches!(err, GpuError::Value(_)));
}

#[test]
fn offset_view_invariants_without_device() {
    // SAFETY: fabricated address range, never dereferenced
    let parent = unsafe { DeviceBuffer::from_raw_parts(0x9000, 128) };

    let mut view = parent.duplicate();
    view.offset(96).expect("in-range offset");
    assert_eq!(view.size(), 32);
    assert!(!view.is_owning());
    assert!(parent.overlaps(&view));

    let mut bad = parent.duplicate();
    assert!(matches!(bad.offset(129), Err(GpuError::Value(_))));
}
