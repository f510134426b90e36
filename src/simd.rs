//! Runtime CPU feature detection
//!
//! Queries the host CPU once for the SIMD instruction sets the matrix-vector
//! kernels can use and exposes the result as an immutable snapshot. x86_64
//! extensions are probed at runtime with `is_x86_feature_detected!`; NEON and
//! RVV are architecture-gated at compile time, so on those targets the flags
//! are constants. On any other architecture every flag is false.
//!
//! Detection never panics and never reports an extension that was not
//! actually observed: if a probe is unavailable the flag stays false and the
//! scalar path is used.

use std::fmt;
use std::sync::OnceLock;

/// Immutable snapshot of the SIMD capabilities detected on this CPU
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    /// SSE4.1 (128-bit, x86_64)
    pub sse4_1: bool,
    /// AVX (256-bit float, x86_64)
    pub avx: bool,
    /// AVX2 (256-bit integer, x86_64)
    pub avx2: bool,
    /// AVX-512 Foundation (x86_64)
    pub avx512f: bool,
    /// AVX-512 Byte and Word (x86_64)
    pub avx512bw: bool,
    /// ARM NEON (128-bit, aarch64)
    pub neon: bool,
    /// RISC-V Vector extension (riscv64, compile-time gated)
    pub rvv: bool,
}

impl CpuFeatures {
    /// Probe the host CPU for SIMD capabilities
    ///
    /// Called once per process through [`cpu_features`]; prefer that
    /// accessor over calling this directly.
    #[must_use]
    pub fn detect() -> Self {
        let mut features = Self::default();

        #[cfg(target_arch = "x86_64")]
        {
            features.sse4_1 = is_x86_feature_detected!("sse4.1");
            features.avx = is_x86_feature_detected!("avx");
            features.avx2 = is_x86_feature_detected!("avx2");
            features.avx512f = is_x86_feature_detected!("avx512f");
            features.avx512bw = is_x86_feature_detected!("avx512bw");
        }

        #[cfg(target_arch = "aarch64")]
        {
            features.neon = std::arch::is_aarch64_feature_detected!("neon");
        }

        #[cfg(all(target_arch = "riscv64", target_feature = "v"))]
        {
            features.rvv = true;
        }

        features
    }
}

impl fmt::Display for CpuFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = Vec::new();
        if self.sse4_1 {
            names.push("SSE4.1");
        }
        if self.avx {
            names.push("AVX");
        }
        if self.avx2 {
            names.push("AVX2");
        }
        if self.avx512f {
            names.push("AVX512F");
        }
        if self.avx512bw {
            names.push("AVX512BW");
        }
        if self.neon {
            names.push("NEON");
        }
        if self.rvv {
            names.push("RVV");
        }
        if names.is_empty() {
            write!(f, "scalar")
        } else {
            write!(f, "{}", names.join(" "))
        }
    }
}

static CPU_FEATURES: OnceLock<CpuFeatures> = OnceLock::new();

/// Process-wide capability snapshot, computed on first use
pub fn cpu_features() -> &'static CpuFeatures {
    CPU_FEATURES.get_or_init(CpuFeatures::detect)
}

/// Check if SSE4.1 is available on this CPU
#[must_use]
pub fn is_sse_available() -> bool {
    cpu_features().sse4_1
}

/// Check if AVX is available on this CPU
#[must_use]
pub fn is_avx_available() -> bool {
    cpu_features().avx
}

/// Check if AVX2 is available on this CPU
#[must_use]
pub fn is_avx2_available() -> bool {
    cpu_features().avx2
}

/// Check if AVX-512 Foundation is available on this CPU
#[must_use]
pub fn is_avx512f_available() -> bool {
    cpu_features().avx512f
}

/// Check if AVX-512 Byte/Word is available on this CPU
#[must_use]
pub fn is_avx512bw_available() -> bool {
    cpu_features().avx512bw
}

/// Check if NEON is available (aarch64 only, false elsewhere)
#[must_use]
pub fn is_neon_available() -> bool {
    cpu_features().neon
}

/// Check if the RISC-V Vector extension is compiled in
#[must_use]
pub fn is_rvv_available() -> bool {
    cpu_features().rvv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_stable() {
        // Two reads of the snapshot must agree; detection runs once.
        assert_eq!(*cpu_features(), *cpu_features());
        assert_eq!(CpuFeatures::detect(), *cpu_features());
    }

    #[test]
    fn test_flags_are_coherent() {
        let features = cpu_features();
        // AVX2 implies the older x86 extensions.
        if features.avx2 {
            assert!(features.avx);
            assert!(features.sse4_1);
        }
        if features.avx512bw {
            assert!(features.avx512f);
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            assert!(!features.sse4_1);
            assert!(!features.avx);
            assert!(!features.avx2);
            assert!(!features.avx512f);
            assert!(!features.avx512bw);
        }
        #[cfg(not(target_arch = "aarch64"))]
        assert!(!features.neon);
        #[cfg(not(target_arch = "riscv64"))]
        assert!(!features.rvv);
    }

    #[test]
    fn test_display_lists_detected_sets() {
        let rendered = cpu_features().to_string();
        assert!(!rendered.is_empty());
        let none = CpuFeatures::default();
        assert_eq!(none.to_string(), "scalar");
    }

    #[test]
    fn test_accessors_match_snapshot() {
        let features = cpu_features();
        assert_eq!(is_sse_available(), features.sse4_1);
        assert_eq!(is_avx_available(), features.avx);
        assert_eq!(is_avx2_available(), features.avx2);
        assert_eq!(is_avx512f_available(), features.avx512f);
        assert_eq!(is_avx512bw_available(), features.avx512bw);
        assert_eq!(is_neon_available(), features.neon);
        assert_eq!(is_rvv_available(), features.rvv);
    }
}
