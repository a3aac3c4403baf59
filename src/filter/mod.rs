// TTA DSP
// Copyright (c) 2026 The TTA DSP Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `filter` module implements the TTA hybrid prediction filter.
//!
//! Encoding turns a PCM sample into a small prediction residual; decoding reverses it exactly.
//! The scalar implementation is the numeric contract; the SSE2, SSE4.1, and NEON
//! implementations are bit-for-bit interchangeable with it. One implementation is bound per
//! process by [`active_kernel`], outside the per-sample hot path.

use lazy_static::lazy_static;
use log::debug;

mod scalar;

#[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
mod x86;

#[cfg(all(feature = "opt-simd-neon", target_arch = "aarch64"))]
mod aarch64;

#[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
cpufeatures::new!(cpuid_sse41, "sse4.1");
#[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
cpufeatures::new!(cpuid_sse2, "sse2");

/// Per-channel state of the hybrid filter.
///
/// One state exists per audio channel and lives for the duration of the channel's stream. It is
/// created zeroed with a fixed fixed-point shift, mutated exactly once per [`encode`] or
/// [`decode`] call, and never shared between channels. Calls within a channel must not be
/// skipped or reordered: each transition depends on the exact sequence of prior calls.
///
/// All arithmetic over the state wraps modulo 2^32. The wraparound is part of the stream
/// format, not an overflow to be widened or saturated away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterState {
    /// Prediction taps. Positions 0..3 hold aged history; positions 7 down to 4 hold the
    /// differencer ladder: the last raw sample and its 1st, 2nd, and 3rd discrete differences.
    history: [i32; 8],
    /// Adaptive weights, one per tap, updated by sign-sign LMS.
    weight: [i32; 8],
    /// Adaptation step per tap, re-derived each call from the differencer tap signs.
    step: [i32; 8],
    /// Residual produced or consumed by the previous call. Only its sign drives the weight
    /// adaptation; zero adapts nothing.
    error: i32,
    /// Log2 of the fixed-point scale applied to the prediction sum.
    shift: u32,
    /// Rounding bias added to the prediction sum before the shift.
    round: i32,
}

impl FilterState {
    /// Create a zeroed state with the given fixed-point shift.
    ///
    /// The rounding bias is fixed to half the scale factor, `1 << (shift - 1)`. Both constants
    /// remain unchanged for the lifetime of the state.
    pub fn new(shift: u32) -> FilterState {
        // The scale factor and rounding bias are only meaningful for shifts in [1, 31].
        assert!(shift >= 1 && shift <= 31);

        FilterState {
            history: [0; 8],
            weight: [0; 8],
            step: [0; 8],
            error: 0,
            shift,
            round: 1 << (shift - 1),
        }
    }

    /// Zero the adaptive state, keeping the configured shift and rounding bias.
    pub fn reset(&mut self) {
        self.history = [0; 8];
        self.weight = [0; 8];
        self.step = [0; 8];
        self.error = 0;
    }
}

/// One concrete implementation of the filter transition function.
///
/// Values should come from [`Kernel::detect`] or [`active_kernel`]: the vectorized variants
/// assume the matching CPU capability is present. Every variant produces identical output and
/// identical state transitions for identical input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kernel {
    /// Portable scalar implementation. Always available; defines the numeric contract.
    Scalar,
    /// x86/x86_64 implementation using the SSE2 multiply-low emulation.
    #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
    Sse2,
    /// x86/x86_64 implementation using the native SSE4.1 multiply-low.
    #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
    Sse41,
    /// AArch64 NEON implementation.
    #[cfg(all(feature = "opt-simd-neon", target_arch = "aarch64"))]
    Neon,
}

impl Kernel {
    /// Select the best implementation available on the running CPU.
    pub fn detect() -> Kernel {
        #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
        {
            if cpuid_sse41::get() {
                return Kernel::Sse41;
            }
            if cpuid_sse2::get() {
                return Kernel::Sse2;
            }
        }

        #[cfg(all(feature = "opt-simd-neon", target_arch = "aarch64"))]
        {
            return Kernel::Neon;
        }

        #[allow(unreachable_code)]
        Kernel::Scalar
    }

    /// The name of the implementation.
    pub fn name(self) -> &'static str {
        match self {
            Kernel::Scalar => "scalar",
            #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
            Kernel::Sse2 => "sse2",
            #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
            Kernel::Sse41 => "sse4.1",
            #[cfg(all(feature = "opt-simd-neon", target_arch = "aarch64"))]
            Kernel::Neon => "neon",
        }
    }

    /// Encode one sample against `state`, returning the prediction residual.
    #[inline]
    pub fn encode(self, state: &mut FilterState, sample: i32) -> i32 {
        match self {
            Kernel::Scalar => scalar::encode(state, sample),
            #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
            // SAFETY: detect() returns Sse2 only after confirming SSE2 support.
            Kernel::Sse2 => unsafe { x86::encode_sse2(state, sample) },
            #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
            // SAFETY: detect() returns Sse41 only after confirming SSE4.1 support.
            Kernel::Sse41 => unsafe { x86::encode_sse41(state, sample) },
            #[cfg(all(feature = "opt-simd-neon", target_arch = "aarch64"))]
            // SAFETY: NEON is always available on aarch64.
            Kernel::Neon => unsafe { aarch64::encode(state, sample) },
        }
    }

    /// Decode one residual against `state`, returning the reconstructed sample.
    #[inline]
    pub fn decode(self, state: &mut FilterState, residual: i32) -> i32 {
        match self {
            Kernel::Scalar => scalar::decode(state, residual),
            #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
            // SAFETY: detect() returns Sse2 only after confirming SSE2 support.
            Kernel::Sse2 => unsafe { x86::decode_sse2(state, residual) },
            #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
            // SAFETY: detect() returns Sse41 only after confirming SSE4.1 support.
            Kernel::Sse41 => unsafe { x86::decode_sse41(state, residual) },
            #[cfg(all(feature = "opt-simd-neon", target_arch = "aarch64"))]
            // SAFETY: NEON is always available on aarch64.
            Kernel::Neon => unsafe { aarch64::decode(state, residual) },
        }
    }
}

lazy_static! {
    static ref ACTIVE_KERNEL: Kernel = {
        let kernel = Kernel::detect();
        debug!("bound hybrid filter kernel: {}", kernel.name());
        kernel
    };
}

/// The implementation bound to this process.
///
/// The binding is resolved once, on first use, and never changes for the lifetime of the
/// process.
pub fn active_kernel() -> Kernel {
    *ACTIVE_KERNEL
}

/// Encode one sample with the process-wide kernel, returning the prediction residual.
#[inline]
pub fn encode(state: &mut FilterState, sample: i32) -> i32 {
    active_kernel().encode(state, sample)
}

/// Decode one residual with the process-wide kernel, returning the reconstructed sample.
#[inline]
pub fn decode(state: &mut FilterState, residual: i32) -> i32 {
    active_kernel().decode(state, residual)
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    /// All kernels available in this build, scalar first.
    fn all_kernels() -> Vec<Kernel> {
        let mut kernels = vec![Kernel::Scalar];

        let detected = Kernel::detect();
        if detected != Kernel::Scalar {
            kernels.push(detected);
        }

        // A machine with SSE4.1 can also run the SSE2 kernel.
        #[cfg(all(feature = "opt-simd-sse", any(target_arch = "x86", target_arch = "x86_64")))]
        if detected == Kernel::Sse41 {
            kernels.push(Kernel::Sse2);
        }

        kernels
    }

    /// One input mixing small amplitudes with full-range values that overflow the prediction
    /// arithmetic.
    fn random_sample(rng: &mut SmallRng) -> i32 {
        match rng.random_range(0..4) {
            0 => rng.random::<i32>(),
            1 => rng.random_range(-32_768..32_768),
            2 => i32::MAX - rng.random_range(0..4096),
            _ => i32::MIN + rng.random_range(0..4096),
        }
    }

    #[test]
    fn verify_round_trip() {
        let mut rng = SmallRng::seed_from_u64(0x5eed_0001);

        for kernel in all_kernels() {
            for &shift in &[1, 4, 10, 15, 31] {
                let samples: Vec<i32> = (0..512).map(|_| random_sample(&mut rng)).collect();

                let mut enc = FilterState::new(shift);
                let residuals: Vec<i32> =
                    samples.iter().map(|&s| kernel.encode(&mut enc, s)).collect();

                let mut dec = FilterState::new(shift);
                let decoded: Vec<i32> =
                    residuals.iter().map(|&r| kernel.decode(&mut dec, r)).collect();

                assert_eq!(decoded, samples, "{} round trip, shift {}", kernel.name(), shift);
                // The decoder must finish in the exact state the encoder finished in.
                assert_eq!(dec, enc);
            }
        }
    }

    #[test]
    fn verify_kernels_match_scalar() {
        for kernel in all_kernels() {
            if kernel == Kernel::Scalar {
                continue;
            }

            let mut rng = SmallRng::seed_from_u64(0x5eed_0002);

            for &shift in &[1, 10, 31] {
                let mut reference = FilterState::new(shift);
                let mut state = FilterState::new(shift);

                for _ in 0..10_000 {
                    let input = random_sample(&mut rng);

                    let (expected, actual) = if rng.random::<bool>() {
                        (
                            Kernel::Scalar.encode(&mut reference, input),
                            kernel.encode(&mut state, input),
                        )
                    }
                    else {
                        (
                            Kernel::Scalar.decode(&mut reference, input),
                            kernel.decode(&mut state, input),
                        )
                    };

                    assert_eq!(actual, expected, "{} output diverged", kernel.name());
                    assert_eq!(state, reference, "{} state diverged", kernel.name());
                }
            }
        }
    }

    #[test]
    fn verify_determinism() {
        let mut rng = SmallRng::seed_from_u64(0x5eed_0003);

        // Walk a state to an arbitrary point, then replay one call on two copies.
        for kernel in all_kernels() {
            let mut fs = FilterState::new(10);
            for _ in 0..257 {
                kernel.encode(&mut fs, random_sample(&mut rng));
            }

            let input = random_sample(&mut rng);

            let mut a = fs.clone();
            let mut b = fs.clone();
            assert_eq!(kernel.encode(&mut a, input), kernel.encode(&mut b, input));
            assert_eq!(a, b);

            let mut a = fs.clone();
            let mut b = fs.clone();
            assert_eq!(kernel.decode(&mut a, input), kernel.decode(&mut b, input));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn verify_overflow_state_equivalence() {
        let mut rng = SmallRng::seed_from_u64(0x5eed_0004);

        // Seed every tap and weight near +/-2^31: the prediction sum must wrap identically in
        // every implementation.
        let mut seed = FilterState::new(10);
        for i in 0..8 {
            seed.history[i] = if i % 2 == 0 {
                i32::MAX - rng.random_range(0..64)
            }
            else {
                i32::MIN + rng.random_range(0..64)
            };
            seed.weight[i] = if i % 3 == 0 {
                i32::MIN + rng.random_range(0..64)
            }
            else {
                i32::MAX - rng.random_range(0..64)
            };
            seed.step[i] = [1, 2, 2, 4][i % 4];
        }
        seed.error = -1;

        for kernel in all_kernels() {
            if kernel == Kernel::Scalar {
                continue;
            }

            let mut reference = seed.clone();
            let mut state = seed.clone();

            for _ in 0..64 {
                let input = random_sample(&mut rng);

                let (expected, actual) = if rng.random::<bool>() {
                    (
                        Kernel::Scalar.encode(&mut reference, input),
                        kernel.encode(&mut state, input),
                    )
                }
                else {
                    (
                        Kernel::Scalar.decode(&mut reference, input),
                        kernel.decode(&mut state, input),
                    )
                };

                assert_eq!(actual, expected, "{} output diverged", kernel.name());
                assert_eq!(state, reference, "{} state diverged", kernel.name());
            }
        }

        // Round-trip inversion holds from any identical starting state, including one on the
        // edge of overflow.
        let samples: Vec<i32> = (0..128).map(|_| random_sample(&mut rng)).collect();

        let mut enc = seed.clone();
        let residuals: Vec<i32> = samples.iter().map(|&s| encode(&mut enc, s)).collect();

        let mut dec = seed.clone();
        let decoded: Vec<i32> = residuals.iter().map(|&r| decode(&mut dec, r)).collect();

        assert_eq!(decoded, samples);
        assert_eq!(dec, enc);
    }

    #[test]
    fn verify_process_binding() {
        // The binding never changes once resolved.
        assert_eq!(active_kernel(), active_kernel());
        assert_eq!(active_kernel(), Kernel::detect());

        let mut rng = SmallRng::seed_from_u64(0x5eed_0005);
        let samples: Vec<i32> = (0..256).map(|_| random_sample(&mut rng)).collect();

        let mut enc = FilterState::new(12);
        let residuals: Vec<i32> = samples.iter().map(|&s| encode(&mut enc, s)).collect();

        let mut dec = FilterState::new(12);
        let decoded: Vec<i32> = residuals.iter().map(|&r| decode(&mut dec, r)).collect();

        assert_eq!(decoded, samples);
    }

    #[test]
    fn verify_reset() {
        let mut fs = FilterState::new(9);
        encode(&mut fs, 12345);
        assert_ne!(fs, FilterState::new(9));

        fs.reset();
        assert_eq!(fs, FilterState::new(9));
    }
}
