//! Cross-kernel numeric equivalence
//!
//! Every hardware kernel available on the host must produce the same output
//! vector as the scalar baseline, for every shape, to float rounding error.
//! The sweep covers all shapes from 1x1 up to 129x129 so every tile size,
//! partial tail and padding path of every kernel gets exercised.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reconocer::kernels::matrix_dot_vector_generic;
use reconocer::{all_available, Matrix, WeightMatrix};

/// Pools of random operands, sampled once and sliced per shape so the full
/// shape sweep stays fast.
struct Pools {
    weights: Vec<i8>,
    scales: Vec<f32>,
}

impl Pools {
    /// Quantized weights never reach -128: magnitudes are bounded by 127.
    fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            weights: (0..1 << 16).map(|_| rng.gen_range(-127..=127)).collect(),
            scales: (0..1 << 12).map(|_| rng.gen_range(1e-4..1e-2)).collect(),
        }
    }

    fn int_matrix(&self, offset: usize, num_out: usize, num_in: usize) -> Matrix<i8> {
        let data = (0..num_out * (num_in + 1))
            .map(|k| self.weights[(offset + k) % self.weights.len()])
            .collect();
        Matrix::from_vec(num_out, num_in + 1, data).unwrap()
    }

    fn input(&self, offset: usize, num_in: usize) -> Vec<i8> {
        (0..num_in)
            .map(|k| self.weights[(offset * 31 + k) % self.weights.len()])
            .collect()
    }

    fn scale_vec(&self, offset: usize, num_out: usize) -> Vec<f32> {
        (0..num_out)
            .map(|k| self.scales[(offset + k) % self.scales.len()])
            .collect()
    }
}

fn random_input(rng: &mut StdRng, num_in: usize) -> Vec<i8> {
    (0..num_in).map(|_| rng.gen_range(-127..=127)).collect()
}

/// Run one kernel over its reshaped buffer with padded operands.
fn run_kernel(
    kernel: &'static reconocer::KernelDescriptor,
    w: &Matrix<i8>,
    scales: &[f32],
    u: &[i8],
) -> Vec<f32> {
    let num_out = w.dim1();
    let num_in = w.dim2() - 1;
    let shaped = kernel.init(w);
    let mut padded_u = u.to_vec();
    padded_u.resize(kernel.round_inputs(num_in), 0);
    let mut padded_scales = scales.to_vec();
    padded_scales.resize(kernel.round_outputs(num_out), 0.0);
    let mut v = vec![0.0_f32; kernel.round_outputs(num_out)];
    // SAFETY: all_available() only returns kernels the CPU supports, and
    // the operands are padded to the descriptor's granularities above.
    unsafe {
        (kernel.matrix_dot_vector)(
            num_out,
            num_in + 1,
            shaped.as_ptr(),
            padded_scales.as_ptr(),
            padded_u.as_ptr(),
            v.as_mut_ptr(),
        );
    }
    v.truncate(num_out);
    v
}

fn assert_close(kernel_name: &str, num_out: usize, num_in: usize, got: &[f32], expected: &[f32]) {
    for (i, (a, b)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - b).abs() <= 1e-4 * b.abs().max(1.0),
            "{kernel_name} diverges at shape {num_out}x{num_in}, output {i}: {a} vs {b}"
        );
    }
}

#[test]
fn all_kernels_match_generic_across_shapes() {
    let kernels = all_available();
    let pools = Pools::new(42);
    for num_out in 1..130 {
        for num_in in 1..130 {
            let offset = num_out * 131 + num_in;
            let w = pools.int_matrix(offset, num_out, num_in);
            let scales = pools.scale_vec(offset, num_out);
            let u = pools.input(offset, num_in);

            let mut expected = vec![0.0_f32; num_out];
            matrix_dot_vector_generic(&w, &scales, &u, &mut expected);

            for &kernel in &kernels {
                let got = run_kernel(kernel, &w, &scales, &u);
                assert_close(kernel.name, num_out, num_in, &got, &expected);
            }
        }
    }
}

#[test]
fn all_kernels_match_generic_through_weight_matrix() {
    // Same check through the public quantization path, on shapes around
    // each kernel's tile boundaries.
    let mut rng = StdRng::seed_from_u64(7);
    for &(num_out, num_in) in &[(1, 1), (8, 32), (9, 33), (64, 64), (72, 100), (129, 129)] {
        let mut wf = Matrix::zeros(num_out, num_in + 1);
        for i in 0..num_out {
            for j in 0..=num_in {
                wf.put(i, j, rng.gen_range(-4.0_f32..4.0));
            }
        }
        let u = random_input(&mut rng, num_in);

        let mut generic = WeightMatrix::from_float(wf.clone()).unwrap();
        generic.convert_to_int_with_kernel(None);
        let mut expected = vec![0.0_f32; num_out];
        generic.matrix_dot_vector(&u, &mut expected);

        for kernel in all_available() {
            let mut w = WeightMatrix::from_float(wf.clone()).unwrap();
            w.convert_to_int_with_kernel(Some(kernel));
            let mut padded_u = u.clone();
            padded_u.resize(w.round_inputs(), 0);
            let mut v = vec![0.0_f32; w.round_outputs()];
            w.matrix_dot_vector(&padded_u, &mut v);
            assert_close(kernel.name, num_out, num_in, &v[..num_out], &expected);
        }
    }
}

#[test]
fn concrete_scenario_on_every_kernel() {
    // W = [[3, -2, 1]], u = [2, 5]: quantizes to [127, -85, 42] with stored
    // scale (3/127)/127, and every kernel must land on the same value.
    let wf = Matrix::from_vec(1, 3, vec![3.0_f32, -2.0, 1.0]).unwrap();
    let expected = (-171.0_f32 / 127.0 + 42.0) * (3.0 / 127.0);

    let mut generic = WeightMatrix::from_float(wf.clone()).unwrap();
    generic.convert_to_int_with_kernel(None);
    assert_eq!(generic.int_weights().row(0), &[127, -85, 42]);
    let mut v = [0.0_f32];
    generic.matrix_dot_vector(&[2, 5], &mut v);
    assert!((v[0] - expected).abs() < 1e-3, "generic got {}", v[0]);

    for kernel in all_available() {
        let mut w = WeightMatrix::from_float(wf.clone()).unwrap();
        w.convert_to_int_with_kernel(Some(kernel));
        let mut u = vec![2_i8, 5];
        u.resize(w.round_inputs(), 0);
        let mut v = vec![0.0_f32; w.round_outputs()];
        w.matrix_dot_vector(&u, &mut v);
        assert!(
            (v[0] - expected).abs() < 1e-3,
            "{} got {}",
            kernel.name,
            v[0]
        );
    }
}

#[test]
fn degenerate_shapes_on_every_kernel() {
    // Bias-only matrix: no inputs at all.
    let wf = Matrix::from_vec(2, 1, vec![1.0_f32, -0.5]).unwrap();
    let mut generic = WeightMatrix::from_float(wf.clone()).unwrap();
    generic.convert_to_int_with_kernel(None);
    let mut expected = vec![0.0_f32; 2];
    generic.matrix_dot_vector(&[], &mut expected);

    for kernel in all_available() {
        let mut w = WeightMatrix::from_float(wf.clone()).unwrap();
        w.convert_to_int_with_kernel(Some(kernel));
        let u = vec![0_i8; w.round_inputs()];
        let mut v = vec![0.0_f32; w.round_outputs()];
        w.matrix_dot_vector(&u, &mut v);
        assert_close(kernel.name, 2, 0, &v[..2], &expected);
    }
}
