//! # Reconocer
//!
//! Pure Rust integer SIMD matrix-vector core for neural text recognizers.
//!
//! Reconocer (Spanish: "to recognize") quantizes trained float weight
//! matrices to int8 and computes `v = W * u` with the fastest matrix-vector
//! kernel the running CPU supports, falling back to a portable scalar kernel
//! everywhere else. Every kernel produces the same numbers to float rounding
//! error, so recognition results do not depend on the host's instruction
//! set.
//!
//! ## Example
//!
//! ```rust
//! use reconocer::{Matrix, WeightMatrix};
//!
//! // One output row: weights [3, -2] and bias 1.
//! let wf = Matrix::from_vec(1, 3, vec![3.0_f32, -2.0, 1.0]).unwrap();
//! let mut w = WeightMatrix::from_float(wf).unwrap();
//!
//! // Quantize to int8 and bind the best kernel for this CPU.
//! w.convert_to_int();
//!
//! // Inputs are int8; pad to the kernel's input granularity.
//! let mut u = vec![2_i8, 5];
//! u.resize(w.round_inputs(), 0);
//! let mut v = vec![0.0_f32; w.round_outputs()];
//! w.matrix_dot_vector(&u, &mut v);
//!
//! assert!((v[0] - 0.96).abs() < 0.01);
//! ```
//!
//! ## Architecture
//!
//! - [`simd`] probes the CPU once for SSE4.1/AVX/AVX2/AVX-512/NEON/RVV.
//! - [`kernels`] holds one [`KernelDescriptor`] per instruction set, the
//!   weight reshaper and the scalar baseline kernel.
//! - [`weights`] owns quantization and the safe product entry points.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // i32 -> f32 totals stay well-conditioned
#![allow(clippy::cast_possible_truncation)] // quantized values are bounded
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::uninlined_format_args)] // Prefer explicit format args
#![allow(clippy::missing_panics_doc)] // Allow missing Panics doc sections
#![allow(clippy::float_cmp)] // Allow float comparisons in tests

pub mod error;
pub mod kernels;
pub mod matrix;
pub mod simd;
pub mod weights;

pub use error::{ReconocerError, Result};
pub use kernels::{
    all_available, best_available, matrix_dot_vector_generic, KernelDescriptor, MatrixDotVectorFn,
};
pub use matrix::Matrix;
pub use simd::{cpu_features, CpuFeatures};
pub use weights::WeightMatrix;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
