//! AVX2 matrix-vector kernel for int8 weights
//!
//! Processes up to 64 outputs per pass using eight 256-bit accumulators of
//! 8x32-bit lanes each. Inputs are consumed one 32-byte registerful at a
//! time in groups of 4: each group is broadcast across the register and
//! multiplied against a contiguous 4x8 weight block, so one `maddubs` plus
//! one `madd` folds the 4-input dot product of 8 outputs into the 32-bit
//! lanes. `_mm256_maddubs_epi16` needs an unsigned first operand, so signs
//! are normalized onto the inputs first (`sign(u, w) * |w| == u * w`).
//!
//! The reshaped weight buffer (see [`KernelDescriptor::init`]) streams in
//! exactly this consumption order, with each register set's bias values
//! trailing its weight tiles.

#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::cast_possible_truncation)]
#![allow(unsafe_op_in_unsafe_fn)]

#[allow(clippy::wildcard_imports)]
use std::arch::x86_64::*;

use super::{round_up, KernelDescriptor};

/// Number of 32-bit outputs held in each register.
const NUM_OUTPUTS_PER_REGISTER: usize = 8;
/// Maximum number of registers that we will use.
const MAX_OUTPUT_REGISTERS: usize = 8;
/// Number of 8-bit inputs in the inputs register.
const NUM_INPUTS_PER_REGISTER: usize = 32;
/// Number of inputs in each weight group.
const NUM_INPUTS_PER_GROUP: usize = 4;
/// Number of groups of inputs to be broadcast.
const NUM_INPUT_GROUPS: usize = NUM_INPUTS_PER_REGISTER / NUM_INPUTS_PER_GROUP;

/// Descriptor for the AVX2 kernel
pub static DESCRIPTOR: KernelDescriptor = KernelDescriptor {
    name: "AVX2",
    matrix_dot_vector,
    num_outputs_per_register: NUM_OUTPUTS_PER_REGISTER,
    max_output_registers: MAX_OUTPUT_REGISTERS,
    num_inputs_per_register: NUM_INPUTS_PER_REGISTER,
    num_inputs_per_group: NUM_INPUTS_PER_GROUP,
};

/// Entry point matching [`super::MatrixDotVectorFn`]
///
/// # Safety
///
/// AVX2 must be available and the buffer preconditions of
/// [`super::MatrixDotVectorFn`] must hold.
unsafe fn matrix_dot_vector(
    dim1: usize,
    dim2: usize,
    wi: *const i8,
    scales: *const f32,
    u: *const i8,
    v: *mut f32,
) {
    matrix_dot_vector_avx2(dim1, dim2, wi, scales, u, v);
}

/// One 4x8 weight block times a broadcast input group, added to `result`
///
/// `wi` is advanced by the 32 weights consumed.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn multiply_group(
    rep_input: __m256i,
    ones: __m256i,
    wi: &mut *const i8,
    result: &mut __m256i,
) {
    // Load a 4x8 block of weights.
    let mut weights = _mm256_loadu_si256((*wi).cast::<__m256i>());
    *wi = wi.add(NUM_INPUTS_PER_REGISTER);
    // Normalize the signs on rep_input, weights, so weights is always +ve.
    let reps = _mm256_sign_epi8(rep_input, weights);
    weights = _mm256_sign_epi8(weights, weights);
    // 32x8-bit unsigned weights times 32x8-bit signed inputs, adjacent
    // pairs added, giving 16x16-bit products.
    weights = _mm256_maddubs_epi16(weights, reps);
    // Horizontal add of adjacent 16-bit pairs into 8x32-bit lanes. There is
    // no 16+16=32 horizontal add, so multiply by 16-bit ones instead.
    weights = _mm256_madd_epi16(weights, ones);
    *result = _mm256_add_epi32(*result, weights);
}

/// Dequantize 8 accumulated outputs: add bias*127, convert, scale, store
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn extract_results_8(result: __m256i, wi: *const i8, scales: *const f32, v: *mut f32) {
    // 8x8-bit bias values in the bottom of a 128-bit register.
    let w128 = _mm_set_epi64x(0, wi.cast::<i64>().read_unaligned());
    let w256 = _mm256_cvtepi8_epi32(w128);
    let bias_scale = _mm256_set1_epi32(i32::from(i8::MAX));
    let scale01234567 = _mm256_loadu_ps(scales);
    let biased = _mm256_add_epi32(result, _mm256_mullo_epi32(w256, bias_scale));
    let res01234567 = _mm256_mul_ps(_mm256_cvtepi32_ps(biased), scale01234567);
    _mm256_storeu_ps(v, res01234567);
}

/// Dequantize 16 accumulated outputs and advance the cursors
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn extract_results_16(
    result0: __m256i,
    result1: __m256i,
    wi: &mut *const i8,
    scales: &mut *const f32,
    v: &mut *mut f32,
) {
    // 16x8-bit bias values.
    let mut w8 = _mm_loadu_si128((*wi).cast::<__m128i>());
    let bias_scale = _mm256_set1_epi32(i32::from(i8::MAX));

    let w256 = _mm256_cvtepi8_epi32(w8);
    let scale01234567 = _mm256_loadu_ps(*scales);
    let biased0 = _mm256_add_epi32(result0, _mm256_mullo_epi32(w256, bias_scale));
    let res01234567 = _mm256_mul_ps(_mm256_cvtepi32_ps(biased0), scale01234567);
    _mm256_storeu_ps(*v, res01234567);

    // Shift the next 8 bias values down and repeat.
    w8 = _mm_shuffle_epi32::<{ 2 + (3 << 2) }>(w8);
    let w256 = _mm256_cvtepi8_epi32(w8);
    let scale89abcdef = _mm256_loadu_ps(scales.add(8));
    let biased1 = _mm256_add_epi32(result1, _mm256_mullo_epi32(w256, bias_scale));
    let res89abcdef = _mm256_mul_ps(_mm256_cvtepi32_ps(biased1), scale89abcdef);
    _mm256_storeu_ps(v.add(8), res89abcdef);

    *wi = wi.add(16);
    *scales = scales.add(16);
    *v = v.add(16);
}

/// Computes NR*8 results of v = Wu
///
/// The weights must be arranged so that consecutive reads from `wi` provide
/// (input groups of (NR*8 outputs of (4 inputs))), followed by NR*8 bias
/// values. `u` must be zero-padded to a multiple of 32 entries.
#[target_feature(enable = "avx2")]
unsafe fn partial_matrix_dot_vector<const NR: usize>(
    mut wi: *const i8,
    mut scales: *const f32,
    u: *const i8,
    num_in: usize,
    mut v: *mut f32,
) {
    // 16-bit ones for the horizontal add with 16->32 bit conversion.
    let ones = _mm256_set1_epi16(1);
    let shift_id = _mm256_set_epi32(0, 7, 6, 5, 4, 3, 2, 1);
    let mut result = [_mm256_setzero_si256(); NR];
    // Iterate over the input (u), one registerful at a time.
    let mut j = 0;
    while j < num_in {
        let mut inputs = _mm256_loadu_si256(u.add(j).cast::<__m256i>());
        let mut ig = 0;
        while ig < NUM_INPUT_GROUPS && j < num_in {
            // Replicate the low 32 bits (4 inputs) 8 times.
            let rep_input = _mm256_broadcastd_epi32(_mm256_castsi256_si128(inputs));
            // Rotate the inputs in groups of 4, so the next 4 are ready.
            inputs = _mm256_permutevar8x32_epi32(inputs, shift_id);
            for r in &mut result {
                multiply_group(rep_input, ones, &mut wi, r);
            }
            ig += 1;
            j += NUM_INPUTS_PER_GROUP;
        }
    }
    let mut k = 0;
    while k + 1 < NR {
        extract_results_16(result[k], result[k + 1], &mut wi, &mut scales, &mut v);
        k += 2;
    }
    if k < NR {
        extract_results_8(result[k], wi, scales, v);
    }
}

/// Full matrix-vector product over the reshaped weight buffer
///
/// Runs the largest register-set size until it would produce too much
/// output, then halves the set size, mirroring the reshaped buffer's
/// descending tile passes.
#[target_feature(enable = "avx2")]
unsafe fn matrix_dot_vector_avx2(
    dim1: usize,
    dim2: usize,
    mut wi: *const i8,
    mut scales: *const f32,
    u: *const i8,
    mut v: *mut f32,
) {
    let num_out = dim1;
    let num_in = dim2 - 1;
    let rounded_num_in = round_up(num_in, NUM_INPUTS_PER_GROUP);
    let rounded_num_out = round_up(num_out, NUM_OUTPUTS_PER_REGISTER);
    let mut group_size = NUM_OUTPUTS_PER_REGISTER * MAX_OUTPUT_REGISTERS;
    let mut w_step = (rounded_num_in + 1) * group_size;
    let mut output = 0;

    while output + group_size <= rounded_num_out {
        partial_matrix_dot_vector::<8>(wi, scales, u, rounded_num_in, v);
        wi = wi.add(w_step);
        scales = scales.add(group_size);
        v = v.add(group_size);
        output += group_size;
    }
    group_size /= 2;
    w_step /= 2;

    if output + group_size <= rounded_num_out {
        partial_matrix_dot_vector::<4>(wi, scales, u, rounded_num_in, v);
        wi = wi.add(w_step);
        scales = scales.add(group_size);
        v = v.add(group_size);
        output += group_size;
    }
    group_size /= 2;
    w_step /= 2;

    if output + group_size <= rounded_num_out {
        partial_matrix_dot_vector::<2>(wi, scales, u, rounded_num_in, v);
        wi = wi.add(w_step);
        scales = scales.add(group_size);
        v = v.add(group_size);
        output += group_size;
    }
    group_size /= 2;

    if output + group_size <= rounded_num_out {
        partial_matrix_dot_vector::<1>(wi, scales, u, rounded_num_in, v);
    }
}
