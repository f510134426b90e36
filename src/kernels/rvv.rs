//! RISC-V Vector matrix-vector kernel for int8 weights
//!
//! Stable Rust has no RVV intrinsics, so the dot product is a strip-mined
//! inline-asm loop: `vsetvli` picks the chunk size for the hardware vector
//! length, `vwmul.vv` widens the int8 products to 16 bits and `vwredsum.vs`
//! reduces them into a 32-bit scalar. Tiling granularities are all 1, so
//! the reshaped weight buffer is the dense row-major matrix and the driver
//! steps one row per output.

#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::asm;

use super::KernelDescriptor;

/// Descriptor for the RVV kernel
pub static DESCRIPTOR: KernelDescriptor = KernelDescriptor {
    name: "RVV",
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
/// The buffer preconditions of [`super::MatrixDotVectorFn`] must hold. The
/// V extension is guaranteed by this module's compile gate.
unsafe fn matrix_dot_vector(
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

/// Dot product of two int8 vectors of length `n`
unsafe fn int_dot_product(mut u: *const i8, mut w: *const i8, mut n: usize) -> i32 {
    let mut total: i32 = 0;
    while n > 0 {
        let vl: usize;
        let partial: i32;
        asm!(
            // The reduction seed and the final read are 32-bit scalar
            // elements, so SEW must be 32 whenever v12[0] is written or
            // read; vsetivli carries its own AVL of 1.
            "vsetivli zero, 1, e32, m1, ta, ma",
            "vmv.s.x v12, zero",
            "vsetvli {vl}, {n}, e8, m1, ta, ma",
            "vle8.v v8, ({u})",
            "vle8.v v9, ({w})",
            // 16-bit products across a register pair.
            "vwmul.vv v10, v8, v9",
            "vsetvli zero, {vl}, e16, m2, ta, ma",
            // Widening reduction: 16-bit products into the 32-bit seed.
            "vwredsum.vs v12, v10, v12",
            "vsetivli zero, 1, e32, m1, ta, ma",
            "vmv.x.s {partial}, v12",
            vl = out(reg) vl,
            partial = out(reg) partial,
            n = in(reg) n,
            u = in(reg) u,
            w = in(reg) w,
            out("v8") _,
            out("v9") _,
            out("v10") _,
            out("v11") _,
            out("v12") _,
            options(nostack),
        );
        total += partial;
        u = u.add(vl);
        w = w.add(vl);
        n -= vl;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::matrix_dot_vector_generic;
    use crate::matrix::Matrix;

    #[test]
    fn test_rvv_matches_generic() {
        if !crate::simd::is_rvv_available() {
            return;
        }
        let (num_out, num_in) = (9, 37);
        let mut w = Matrix::zeros(num_out, num_in + 1);
        for i in 0..num_out {
            for j in 0..=num_in {
                let value = ((i * 43 + j * 11) % 255) as i32 - 127;
                w.put(i, j, value as i8);
            }
        }
        let scales: Vec<f32> = (0..num_out).map(|i| (i + 1) as f32 * 1e-3).collect();
        let u: Vec<i8> = (0..num_in)
            .map(|j| (((j * 31) % 255) as i32 - 127) as i8)
            .collect();

        let shaped = DESCRIPTOR.init(&w);
        let mut got = vec![0.0_f32; num_out];
        // SAFETY: module is compile-gated on the V extension; tiling
        // granularities are all 1 so no padding is needed.
        unsafe {
            (DESCRIPTOR.matrix_dot_vector)(
                num_out,
                num_in + 1,
                shaped.as_ptr(),
                scales.as_ptr(),
                u.as_ptr(),
                got.as_mut_ptr(),
            );
        }
        let mut expected = vec![0.0_f32; num_out];
        matrix_dot_vector_generic(&w, &scales, &u, &mut expected);
        for (a, b) in got.iter().zip(expected.iter()) {
            assert!((a - b).abs() <= 1e-4 * b.abs().max(1.0), "{a} vs {b}");
        }
    }

    #[test]
    fn test_rvv_cancelling_products() {
        if !crate::simd::is_rvv_available() {
            return;
        }
        // Alternating weights against a constant input cancel exactly, so
        // each output reduces to bias * 127 * scale. 300 inputs span
        // several strips on any vector length, and a zero total exposes
        // any bad per-strip accumulator seed.
        let (num_out, num_in) = (4, 300);
        let mut w = Matrix::zeros(num_out, num_in + 1);
        for i in 0..num_out {
            for j in 0..num_in {
                w.put(i, j, if j % 2 == 0 { 64 } else { -64 });
            }
            w.put(i, num_in, i as i8 + 1);
        }
        let scales = vec![1e-3_f32; num_out];
        let u = vec![5_i8; num_in];

        let shaped = DESCRIPTOR.init(&w);
        let mut got = vec![0.0_f32; num_out];
        // SAFETY: module is compile-gated on the V extension; tiling
        // granularities are all 1 so no padding is needed.
        unsafe {
            (DESCRIPTOR.matrix_dot_vector)(
                num_out,
                num_in + 1,
                shaped.as_ptr(),
                scales.as_ptr(),
                u.as_ptr(),
                got.as_mut_ptr(),
            );
        }
        for (i, &value) in got.iter().enumerate() {
            let expected = (i + 1) as f32 * 127.0 * 1e-3;
            assert!((value - expected).abs() < 1e-6, "output {i}: {value}");
        }
    }
}
