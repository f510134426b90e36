//! SSE4.1 matrix-vector kernel for int8 weights
//!
//! One output row at a time: an 8-wide int8 dot product built from
//! `_mm_cvtepi8_epi16` sign extension and `_mm_madd_epi16`, with a scalar
//! tail for the last `num_in % 8` entries. With all tiling granularities at
//! 1 the reshaped weight buffer is exactly the dense row-major matrix, so
//! the driver just steps `wi` by one row per output.

#![allow(clippy::cast_ptr_alignment)]
#![allow(unsafe_op_in_unsafe_fn)]

#[allow(clippy::wildcard_imports)]
use std::arch::x86_64::*;

use super::KernelDescriptor;

/// Descriptor for the SSE4.1 kernel
pub static DESCRIPTOR: KernelDescriptor = KernelDescriptor {
    name: "SSE4.1",
    matrix_dot_vector,
    num_outputs_per_register: 1,
    max_output_registers: 1,
    num_inputs_per_register: 1,
    num_inputs_per_group: 1,
};

/// Entry point matching [`super::MatrixDotVectorFn`]
///
/// # Safety
///
/// SSE4.1 must be available and the buffer preconditions of
/// [`super::MatrixDotVectorFn`] must hold.
unsafe fn matrix_dot_vector(
    dim1: usize,
    dim2: usize,
    wi: *const i8,
    scales: *const f32,
    u: *const i8,
    v: *mut f32,
) {
    matrix_dot_vector_sse(dim1, dim2, wi, scales, u, v);
}

/// Dot product of two int8 vectors of length `n`
#[target_feature(enable = "sse4.1")]
unsafe fn int_dot_product(u: *const i8, w: *const i8, n: usize) -> i32 {
    let mut offset = 0;
    let mut sum = _mm_setzero_si128();
    while offset + 8 <= n {
        // Sign-extend 8 bytes of each operand to 16 bits and multiply-add
        // adjacent pairs into 4x32-bit lanes.
        let packed_u = _mm_cvtepi8_epi16(_mm_loadl_epi64(u.add(offset).cast::<__m128i>()));
        let packed_w = _mm_cvtepi8_epi16(_mm_loadl_epi64(w.add(offset).cast::<__m128i>()));
        sum = _mm_add_epi32(sum, _mm_madd_epi16(packed_u, packed_w));
        offset += 8;
    }
    // Horizontal add of the 4 lanes.
    sum = _mm_add_epi32(sum, _mm_srli_si128::<8>(sum));
    sum = _mm_add_epi32(sum, _mm_srli_si128::<4>(sum));
    let mut result = _mm_cvtsi128_si32(sum);
    while offset < n {
        result += i32::from(*u.add(offset)) * i32::from(*w.add(offset));
        offset += 1;
    }
    result
}

/// Full matrix-vector product, one dense row per output
#[target_feature(enable = "sse4.1")]
unsafe fn matrix_dot_vector_sse(
    dim1: usize,
    dim2: usize,
    mut wi: *const i8,
    mut scales: *const f32,
    u: *const i8,
    mut v: *mut f32,
) {
    let num_in = dim2 - 1;
    for _ in 0..dim1 {
        let total = int_dot_product(u, wi, num_in);
        // Add in the bias and correct for integer values.
        let biased = total + i32::from(*wi.add(num_in)) * i32::from(i8::MAX);
        *v = biased as f32 * *scales;
        wi = wi.add(dim2);
        scales = scales.add(1);
        v = v.add(1);
    }
}
