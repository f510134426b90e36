//! Quantized weight matrices for inference
//!
//! A [`WeightMatrix`] starts life as float weights (one row per output, one
//! column per input plus a trailing bias column). [`WeightMatrix::convert_to_int`]
//! quantizes each row to int8 against the row's own maximum magnitude, binds
//! the best matrix-vector kernel for the running CPU and caches that kernel's
//! reshaped weight buffer. After conversion, [`WeightMatrix::matrix_dot_vector`]
//! computes `v = W * u` entirely in integers with one float multiply per
//! output.
//!
//! Quantization contract, per row `i`:
//!
//! ```text
//! scale     = max_abs(row) / 127
//! wi[i][j]  = round(wf[i][j] / scale)     (half away from zero)
//! scales[i] = scale / 127
//! ```
//!
//! The stored scale carries the extra `/ 127` so the kernels can fold the
//! bias in at `bias * 127` and still dequantize with a single multiply. An
//! all-zero row stores scale `0.0` and quantizes to zeros (the division
//! scale falls back to `1.0` to avoid `0 / 0`).

use crate::error::{ReconocerError, Result};
use crate::kernels::{self, matrix_dot_vector_generic, KernelDescriptor};
use crate::matrix::Matrix;

/// Weight matrix with float and int8 quantized forms
///
/// Shared read-only across threads once constructed: all state is owned and
/// immutable after [`convert_to_int`](Self::convert_to_int), and
/// [`matrix_dot_vector`](Self::matrix_dot_vector) takes `&self`. Conversion
/// itself takes `&mut self` and is not self-synchronizing.
#[derive(Debug, Clone)]
pub struct WeightMatrix {
    /// Float weights, retained for float-mode inference
    wf: Matrix<f32>,
    /// Quantized weights, valid in int mode
    wi: Matrix<i8>,
    /// Per-row dequantization scales, zero-padded to the kernel's
    /// output granularity
    scales: Vec<f32>,
    /// Reshaped weight buffer in the bound kernel's layout
    shaped: Vec<i8>,
    /// Kernel bound at conversion time; `None` runs the generic path
    kernel: Option<&'static KernelDescriptor>,
    /// Whether the quantized form is valid
    int_mode: bool,
}

impl WeightMatrix {
    /// Wrap trained float weights
    ///
    /// `wf` must carry at least the bias column.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `wf` has zero columns.
    pub fn from_float(wf: Matrix<f32>) -> Result<Self> {
        if wf.dim2() == 0 {
            return Err(ReconocerError::InvalidShape {
                reason: "weight matrix needs at least a bias column".to_string(),
            });
        }
        Ok(Self {
            wf,
            wi: Matrix::zeros(0, 0),
            scales: Vec::new(),
            shaped: Vec::new(),
            kernel: None,
            int_mode: false,
        })
    }

    /// Number of outputs (rows)
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.wf.dim1()
    }

    /// Number of real inputs, excluding the bias column
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.wf.dim2() - 1
    }

    /// The kernel bound at conversion time, if any
    #[must_use]
    pub fn kernel(&self) -> Option<&'static KernelDescriptor> {
        self.kernel
    }

    /// Whether the int8 form is active
    #[must_use]
    pub fn is_int_mode(&self) -> bool {
        self.int_mode
    }

    /// The quantized weights, empty before conversion
    #[must_use]
    pub fn int_weights(&self) -> &Matrix<i8> {
        &self.wi
    }

    /// Per-row dequantization scales, empty before conversion
    #[must_use]
    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    /// Input length callers must pad `u` to for [`Self::matrix_dot_vector`]
    #[must_use]
    pub fn round_inputs(&self) -> usize {
        match self.kernel {
            Some(kernel) => kernel.round_inputs(self.num_inputs()),
            None => self.num_inputs(),
        }
    }

    /// Output length callers must size `v` to for [`Self::matrix_dot_vector`]
    #[must_use]
    pub fn round_outputs(&self) -> usize {
        match self.kernel {
            Some(kernel) => kernel.round_outputs(self.num_outputs()),
            None => self.num_outputs(),
        }
    }

    /// Quantize to int8 and bind the best kernel for this CPU
    pub fn convert_to_int(&mut self) {
        self.convert_to_int_with_kernel(kernels::best_available());
    }

    /// Quantize to int8 with an explicit kernel choice
    ///
    /// `None` forces the generic path; the equivalence tests use this to run
    /// every kernel over identical quantized weights.
    pub fn convert_to_int_with_kernel(&mut self, kernel: Option<&'static KernelDescriptor>) {
        let num_out = self.wf.dim1();
        let dim2 = self.wf.dim2();
        let mut wi = Matrix::zeros(num_out, dim2);
        let mut scales = Vec::with_capacity(num_out);
        for i in 0..num_out {
            let row = self.wf.row(i);
            let mut max_abs: f64 = 0.0;
            for &value in row {
                max_abs = max_abs.max(f64::from(value).abs());
            }
            let mut scale = max_abs / f64::from(i8::MAX);
            scales.push((scale / f64::from(i8::MAX)) as f32);
            if scale == 0.0 {
                scale = 1.0;
            }
            for (j, &value) in row.iter().enumerate() {
                // Round half away from zero; |value / scale| <= 127.
                wi.put(i, j, (f64::from(value) / scale).round() as i8);
            }
        }
        self.kernel = kernel;
        if let Some(kernel) = kernel {
            scales.resize(kernel.round_outputs(num_out), 0.0);
            self.shaped = kernel.init(&wi);
        } else {
            self.shaped = Vec::new();
        }
        self.wi = wi;
        self.scales = scales;
        self.int_mode = true;
    }

    /// Compute `v = W * u` over the quantized weights
    ///
    /// # Panics
    ///
    /// Panics if the matrix is not in int mode, `u` is shorter than
    /// [`Self::round_inputs`], or `v` is shorter than [`Self::round_outputs`].
    /// Entries of `v` past [`Self::num_outputs`] are kernel padding.
    pub fn matrix_dot_vector(&self, u: &[i8], v: &mut [f32]) {
        assert!(self.int_mode, "convert_to_int must run first");
        match self.kernel {
            Some(kernel) => {
                assert!(u.len() >= self.round_inputs(), "input vector too short");
                assert!(v.len() >= self.round_outputs(), "output vector too short");
                // SAFETY: the bound kernel was selected from the CPU
                // capability snapshot, the reshaped buffer was produced by
                // this kernel's init, and the length asserts above cover the
                // padding preconditions.
                unsafe {
                    (kernel.matrix_dot_vector)(
                        self.wi.dim1(),
                        self.wi.dim2(),
                        self.shaped.as_ptr(),
                        self.scales.as_ptr(),
                        u.as_ptr(),
                        v.as_mut_ptr(),
                    );
                }
            }
            None => matrix_dot_vector_generic(&self.wi, &self.scales, u, v),
        }
    }

    /// Compute `v = W * u` over the float weights
    ///
    /// The bias column multiplies an implicit trailing input of 1.
    ///
    /// # Panics
    ///
    /// Panics if the matrix is in int mode or the buffers are shorter than
    /// [`Self::num_inputs`] / [`Self::num_outputs`].
    pub fn matrix_dot_vector_float(&self, u: &[f32], v: &mut [f32]) {
        assert!(!self.int_mode, "float weights are no longer authoritative");
        let num_in = self.num_inputs();
        assert!(u.len() >= num_in, "input vector too short");
        assert!(v.len() >= self.num_outputs(), "output vector too short");
        for i in 0..self.num_outputs() {
            let row = self.wf.row(i);
            let mut total = row[num_in];
            for j in 0..num_in {
                total += row[j] * u[j];
            }
            v[i] = total;
        }
    }
}
