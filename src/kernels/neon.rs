//! NEON matrix-vector kernel for int8 weights
//!
//! Processes 8 outputs per pass with a single register set. Each step
//! consumes 8 inputs: one widening multiply per output row, then a pairwise
//! add tree folds the eight 16x8-bit product rows into two 32-bit
//! accumulators of 4 lanes each. The tail pass stores only the real output
//! lanes, so the output buffer needs no padding beyond `num_out`.

#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::cast_precision_loss)]
#![allow(unsafe_op_in_unsafe_fn)]

#[allow(clippy::wildcard_imports)]
use std::arch::aarch64::*;

use super::{round_up, KernelDescriptor};

/// Number of 32-bit outputs held in each register set.
const NUM_OUTPUTS_PER_REGISTER: usize = 8;
/// Maximum number of registers that we will use.
const MAX_OUTPUT_REGISTERS: usize = 1;
/// Number of 8-bit inputs in the inputs register.
const NUM_INPUTS_PER_REGISTER: usize = 8;
/// Number of inputs in each weight group.
const NUM_INPUTS_PER_GROUP: usize = 8;

/// Descriptor for the NEON kernel
pub static DESCRIPTOR: KernelDescriptor = KernelDescriptor {
    name: "NEON",
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
/// NEON must be available and the buffer preconditions of
/// [`super::MatrixDotVectorFn`] must hold.
unsafe fn matrix_dot_vector(
    dim1: usize,
    dim2: usize,
    wi: *const i8,
    scales: *const f32,
    u: *const i8,
    v: *mut f32,
) {
    matrix_dot_vector_neon(dim1, dim2, wi, scales, u, v);
}

/// Computes up to 8 results of v = Wu
///
/// `num_out` limits how many of the 8 lanes are stored; the accumulation
/// always runs the full register set over zero-padded weights.
#[target_feature(enable = "neon")]
unsafe fn partial_matrix_dot_vector_8(
    mut wi: *const i8,
    mut scales: *const f32,
    mut u: *const i8,
    num_in: usize,
    mut v: *mut f32,
    num_out: usize,
) {
    let mut result0123 = vdupq_n_s32(0);
    let mut result4567 = vdupq_n_s32(0);
    let bias_scale = vdup_n_s8(i8::MAX);
    // Iterate over the input (u), one registerful at a time.
    let mut j = 0;
    while j < num_in {
        let vu = vld1_s8(u);
        let vw01 = vld1q_s8(wi);
        let vw23 = vld1q_s8(wi.add(16));
        let vw45 = vld1q_s8(wi.add(32));
        let vw67 = vld1q_s8(wi.add(48));

        // Widening multiply per output row, then pairwise-add the 16-bit
        // products down to one 32-bit sum per row.
        let vrow0 = vpaddlq_s16(vmull_s8(vget_low_s8(vw01), vu));
        let vrow1 = vpaddlq_s16(vmull_s8(vget_high_s8(vw01), vu));
        let vrow2 = vpaddlq_s16(vmull_s8(vget_low_s8(vw23), vu));
        let vrow3 = vpaddlq_s16(vmull_s8(vget_high_s8(vw23), vu));
        let vrow4 = vpaddlq_s16(vmull_s8(vget_low_s8(vw45), vu));
        let vrow5 = vpaddlq_s16(vmull_s8(vget_high_s8(vw45), vu));
        let vrow6 = vpaddlq_s16(vmull_s8(vget_low_s8(vw67), vu));
        let vrow7 = vpaddlq_s16(vmull_s8(vget_high_s8(vw67), vu));

        let vrow01 = vpaddq_s32(vrow0, vrow1);
        let vrow23 = vpaddq_s32(vrow2, vrow3);
        let vrow45 = vpaddq_s32(vrow4, vrow5);
        let vrow67 = vpaddq_s32(vrow6, vrow7);

        result0123 = vaddq_s32(result0123, vpaddq_s32(vrow01, vrow23));
        result4567 = vaddq_s32(result4567, vpaddq_s32(vrow45, vrow67));
        u = u.add(NUM_INPUTS_PER_REGISTER);
        wi = wi.add(NUM_INPUTS_PER_REGISTER * NUM_OUTPUTS_PER_REGISTER);
        j += NUM_INPUTS_PER_GROUP;
    }
    // Add in the bias at natural magnitude times 127.
    let vbias = vmull_s8(vld1_s8(wi), bias_scale);
    result0123 = vaddq_s32(result0123, vmovl_s16(vget_low_s16(vbias)));
    result4567 = vaddq_s32(result4567, vmovl_s16(vget_high_s16(vbias)));

    let totals = [
        vgetq_lane_s32::<0>(result0123),
        vgetq_lane_s32::<1>(result0123),
        vgetq_lane_s32::<2>(result0123),
        vgetq_lane_s32::<3>(result0123),
        vgetq_lane_s32::<0>(result4567),
        vgetq_lane_s32::<1>(result4567),
        vgetq_lane_s32::<2>(result4567),
        vgetq_lane_s32::<3>(result4567),
    ];
    for &total in totals.iter().take(num_out.min(NUM_OUTPUTS_PER_REGISTER)) {
        *v = total as f32 * *scales;
        v = v.add(1);
        scales = scales.add(1);
    }
}

/// Full matrix-vector product over the reshaped weight buffer
#[target_feature(enable = "neon")]
unsafe fn matrix_dot_vector_neon(
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
    let group_size = NUM_OUTPUTS_PER_REGISTER * MAX_OUTPUT_REGISTERS;
    let w_step = (rounded_num_in + 1) * group_size;
    let mut output = 0;

    while output + group_size <= num_out {
        partial_matrix_dot_vector_8(wi, scales, u, rounded_num_in, v, group_size);
        wi = wi.add(w_step);
        scales = scales.add(group_size);
        v = v.add(group_size);
        output += group_size;
    }
    if output < num_out {
        partial_matrix_dot_vector_8(wi, scales, u, rounded_num_in, v, num_out - output);
    }
}
