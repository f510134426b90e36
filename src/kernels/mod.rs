//! Matrix-vector product kernels over int8 quantized weights
//!
//! Every kernel computes `v = W * u` where `W` is an int8 weight matrix of
//! `dim1` output rows by `dim2` columns (the last column is the bias) and
//! `u` is an int8 input vector. Products are accumulated in wide integer
//! types, the bias is folded in at natural magnitude scaled by 127, and the
//! integer total is dequantized with one per-row float multiply:
//!
//! ```text
//! v[i] = (sum_j w[i][j] * u[j] + w[i][bias] * 127) * scales[i]
//! ```
//!
//! The scalar baseline [`matrix_dot_vector_generic`] defines the numeric
//! contract; every hardware kernel must match it to float rounding error
//! for all shapes. Hardware kernels do not read the dense matrix directly:
//! each [`KernelDescriptor`] carries tiling parameters, and
//! [`KernelDescriptor::init`] reshapes the dense matrix once into the flat
//! buffer that kernel streams through.
//!
//! ## Kernel dispatch
//!
//! ```text
//! Priority  Kernel   Tiling (out/reg, max regs, in/reg, in/group)  Platform
//! ────────  ───────  ────────────────────────────────────────────  ────────
//! 1         AVX2     (8, 8, 32, 4)                                 x86_64
//! 2         SSE4.1   (1, 1, 1, 1)                                  x86_64
//! 3         NEON     (8, 1, 8, 8)                                  aarch64
//! 4         RVV      (1, 1, 1, 1)                                  riscv64+v
//! 5         Generic  dense matrix, no reshape                      any
//! ```
//!
//! Selection is a one-time decision made when a weight matrix is quantized,
//! not a per-call branch.

use crate::matrix::Matrix;

#[cfg(target_arch = "x86_64")]
pub mod avx2;
#[cfg(target_arch = "aarch64")]
pub mod neon;
#[cfg(all(target_arch = "riscv64", target_feature = "v"))]
pub mod rvv;
#[cfg(target_arch = "x86_64")]
pub mod sse;

/// Signature shared by all hardware kernels
///
/// Arguments are `(dim1, dim2, reshaped_weights, scales, input, output)`.
/// `dim1`/`dim2` are the dense (un-padded) dimensions; the buffers carry the
/// padding described on [`KernelDescriptor`].
///
/// # Safety
///
/// Callers must guarantee the descriptor's instruction set is present on the
/// running CPU and that the buffer preconditions hold: `reshaped_weights`
/// produced by the matching [`KernelDescriptor::init`], `scales` of at least
/// `round_outputs(dim1)` entries, `input` of at least
/// `round_inputs(dim2 - 1)` entries, `output` with room for
/// `round_outputs(dim1)` entries.
pub type MatrixDotVectorFn = unsafe fn(
    dim1: usize,
    dim2: usize,
    wi: *const i8,
    scales: *const f32,
    u: *const i8,
    v: *mut f32,
);

/// One concrete SIMD kernel: its tiling granularities and core routine
///
/// A descriptor is immutable `'static` data; exactly one is bound to a
/// quantized weight matrix for the lifetime of that matrix.
#[derive(Debug, Clone, Copy)]
pub struct KernelDescriptor {
    /// Short name for diagnostics ("AVX2", "SSE4.1", ...)
    pub name: &'static str,
    /// The core matrix-vector routine
    pub matrix_dot_vector: MatrixDotVectorFn,
    /// Number of 32-bit outputs held in each register
    pub num_outputs_per_register: usize,
    /// Maximum number of registers used to hold outputs
    pub max_output_registers: usize,
    /// Number of 8-bit inputs in the inputs register
    pub num_inputs_per_register: usize,
    /// Number of inputs in each weight group
    pub num_inputs_per_group: usize,
}

impl KernelDescriptor {
    /// Input count rounded up to this kernel's register granularity
    ///
    /// Input vectors handed to the kernel must be zero-padded to this
    /// length; the padding multiplies against zero weight tiles.
    #[must_use]
    pub fn round_inputs(&self, size: usize) -> usize {
        round_up(size, self.num_inputs_per_register)
    }

    /// Output count rounded up to this kernel's register granularity
    ///
    /// The scale vector and the output buffer must cover this many entries;
    /// outputs past the real count are padding the caller discards.
    #[must_use]
    pub fn round_outputs(&self, size: usize) -> usize {
        round_up(size, self.num_outputs_per_register)
    }

    /// Reshape a dense int8 weight matrix into this kernel's tiled layout
    ///
    /// The buffer is partitioned into register-set passes of descending
    /// power-of-two register counts, from `max_output_registers` down to 1.
    /// Within a pass, every input group of `num_inputs_per_group` carries
    /// the weights for all outputs of the set, and the set's bias values
    /// follow the last input group. Weights outside the real matrix bounds
    /// are zero. Total size is
    /// `(round_up(num_in, group) + 1) * round_outputs(num_out)`.
    ///
    /// Deterministic: the same matrix and descriptor always produce a
    /// byte-identical buffer.
    #[must_use]
    pub fn init(&self, w: &Matrix<i8>) -> Vec<i8> {
        let num_out = w.dim1();
        let num_in = w.dim2().saturating_sub(1);
        let rounded_num_in = round_up(num_in, self.num_inputs_per_group);
        let rounded_num_out = self.round_outputs(num_out);
        let mut shaped = Vec::with_capacity((rounded_num_in + 1) * rounded_num_out);

        let mut output = 0;
        // Each number of registers needs a different format!
        let mut num_registers = self.max_output_registers;
        while num_registers >= 1 {
            let set_size = num_registers * self.num_outputs_per_register;
            // Consume outputs one register set at a time while they fit.
            while output + set_size <= rounded_num_out {
                // Copy the weights for one group of inputs for every output
                // in the set, walking all real inputs.
                let mut input = 0;
                while input < num_in {
                    for j in 0..set_size {
                        for i in 0..self.num_inputs_per_group {
                            let weight = if output + j < num_out && input + i < num_in {
                                w.get(output + j, input + i)
                            } else {
                                0
                            };
                            shaped.push(weight);
                        }
                    }
                    input += self.num_inputs_per_group;
                }
                // Append the bias weights for the register set.
                for j in 0..set_size {
                    let weight = if output + j < num_out {
                        w.get(output + j, num_in)
                    } else {
                        0
                    };
                    shaped.push(weight);
                }
                output += set_size;
            }
            num_registers /= 2;
        }
        debug_assert_eq!(shaped.len(), (rounded_num_in + 1) * rounded_num_out);
        shaped
    }
}

/// Round `input` up to the next multiple of `factor`
#[must_use]
pub fn round_up(input: usize, factor: usize) -> usize {
    (input + factor - 1) / factor * factor
}

/// Architecture-independent baseline kernel
///
/// Straightforward double loop over the dense matrix. This is both the
/// fallback when no SIMD kernel applies and the correctness reference the
/// hardware kernels are tested against.
///
/// # Panics
///
/// Panics if `w.dim2() == 0`, `scales`/`v` are shorter than `w.dim1()`, or
/// `u` is shorter than `w.dim2() - 1`.
pub fn matrix_dot_vector_generic(w: &Matrix<i8>, scales: &[f32], u: &[i8], v: &mut [f32]) {
    let num_out = w.dim1();
    assert!(w.dim2() >= 1, "weight matrix must carry a bias column");
    let num_in = w.dim2() - 1;
    assert!(scales.len() >= num_out, "scale vector too short");
    assert!(u.len() >= num_in, "input vector too short");
    assert!(v.len() >= num_out, "output vector too short");

    for i in 0..num_out {
        let wi = w.row(i);
        let mut total: i32 = 0;
        for j in 0..num_in {
            total += i32::from(wi[j]) * i32::from(u[j]);
        }
        // Add in the bias and correct for integer values.
        v[i] = (total + i32::from(wi[num_in]) * i32::from(i8::MAX)) as f32 * scales[i];
    }
}

/// All hardware kernels usable on this CPU, best first
///
/// Used by the cross-kernel equivalence tests to exercise every variant the
/// host supports against the generic baseline.
#[must_use]
pub fn all_available() -> Vec<&'static KernelDescriptor> {
    let mut kernels: Vec<&'static KernelDescriptor> = Vec::new();

    #[cfg(target_arch = "x86_64")]
    {
        if crate::simd::is_avx2_available() {
            kernels.push(&avx2::DESCRIPTOR);
        }
        if crate::simd::is_sse_available() {
            kernels.push(&sse::DESCRIPTOR);
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        if crate::simd::is_neon_available() {
            kernels.push(&neon::DESCRIPTOR);
        }
    }

    #[cfg(all(target_arch = "riscv64", target_feature = "v"))]
    {
        if crate::simd::is_rvv_available() {
            kernels.push(&rvv::DESCRIPTOR);
        }
    }

    kernels
}

/// The best hardware kernel for this CPU, or `None` for the generic path
#[must_use]
pub fn best_available() -> Option<&'static KernelDescriptor> {
    all_available().into_iter().next()
}
