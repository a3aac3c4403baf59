// TTA DSP
// Copyright (c) 2026 The TTA DSP Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SSE2 and SSE4.1 implementations of the hybrid filter.
//!
//! The eight-lane state arrays are processed as two 128-bit halves. The two variants differ
//! only in the packed 32-bit multiply-low: SSE4.1 has it natively, SSE2 emulates it with the
//! widening unsigned multiply. Both are bit-for-bit equivalent to the scalar implementation.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::FilterState;

/// Lane-wise low 32 bits of the 32x32-bit products.
#[target_feature(enable = "sse4.1")]
#[inline]
unsafe fn mullo_epi32_sse41(a: __m128i, b: __m128i) -> __m128i {
    _mm_mullo_epi32(a, b)
}

/// Lane-wise low 32 bits of the 32x32-bit products.
///
/// SSE2 has no packed 32-bit multiply-low. The even and odd lanes are multiplied with the
/// widening unsigned multiply and the low product halves repacked; the low 32 bits of a
/// product do not depend on operand signedness.
#[target_feature(enable = "sse2")]
#[inline]
unsafe fn mullo_epi32_sse2(a: __m128i, b: __m128i) -> __m128i {
    let even = _mm_mul_epu32(a, b);
    let odd = _mm_mul_epu32(_mm_shuffle_epi32::<0xb1>(a), _mm_shuffle_epi32::<0xb1>(b));
    _mm_unpacklo_epi32(_mm_shuffle_epi32::<0xd8>(even), _mm_shuffle_epi32::<0xd8>(odd))
}

macro_rules! hybrid_filter {
    ($feature:literal, $mullo:ident, $encode:ident, $decode:ident) => {
        #[target_feature(enable = $feature)]
        pub unsafe fn $encode(fs: &mut FilterState, sample: i32) -> i32 {
            let ph = fs.history.as_mut_ptr();
            let pw = fs.weight.as_mut_ptr();
            let ps = fs.step.as_mut_ptr();

            let mut sum = fs.round;

            let mut ha = _mm_loadu_si128(ph as *const __m128i);
            let hb = _mm_loadu_si128(ph.add(4) as *const __m128i);
            let mut wa = _mm_loadu_si128(pw as *const __m128i);
            let mut wb = _mm_loadu_si128(pw.add(4) as *const __m128i);
            let mut sa = _mm_loadu_si128(ps as *const __m128i);
            let sb = _mm_loadu_si128(ps.add(4) as *const __m128i);

            if fs.error < 0 {
                wa = _mm_sub_epi32(wa, sa);
                wb = _mm_sub_epi32(wb, sb);
                _mm_storeu_si128(pw as *mut __m128i, wa);
                _mm_storeu_si128(pw.add(4) as *mut __m128i, wb);
            }
            else if fs.error > 0 {
                wa = _mm_add_epi32(wa, sa);
                wb = _mm_add_epi32(wb, sb);
                _mm_storeu_si128(pw as *mut __m128i, wa);
                _mm_storeu_si128(pw.add(4) as *mut __m128i, wb);
            }

            // Horizontal sum of the eight tap products. Modular addition commutes, so the
            // reduction order does not affect the wrapped result.
            let mut dp = _mm_add_epi32($mullo(ha, wa), $mullo(hb, wb));
            dp = _mm_add_epi32(dp, _mm_unpackhi_epi64(dp, dp));
            sum = sum
                .wrapping_add(_mm_cvtsi128_si32(dp))
                .wrapping_add(_mm_cvtsi128_si32(_mm_shuffle_epi32::<1>(dp)));

            // Age the step and history registers by one tap, then re-derive the steps from the
            // differencer tap signs, forced to the fixed magnitude pattern 1, 2, 2, 4.
            sa = _mm_or_si128(_mm_srli_si128::<4>(sa), _mm_slli_si128::<12>(sb));
            ha = _mm_or_si128(_mm_srli_si128::<4>(ha), _mm_slli_si128::<12>(hb));
            let sb = _mm_andnot_si128(
                _mm_setr_epi32(0, 1, 1, 3),
                _mm_or_si128(_mm_srai_epi32::<30>(hb), _mm_setr_epi32(1, 2, 2, 4)),
            );

            _mm_storeu_si128(ph as *mut __m128i, ha);
            _mm_storeu_si128(ps as *mut __m128i, sa);
            _mm_storeu_si128(ps.add(4) as *mut __m128i, sb);

            // Differencer ladder over the incoming sample:
            // [s - h5 - h6 - h7, s - h6 - h7, s - h7, s] refills history[4..7].
            let hb = _mm_sub_epi32(
                _mm_sub_epi32(
                    _mm_sub_epi32(_mm_set1_epi32(sample), _mm_srli_si128::<4>(hb)),
                    _mm_srli_si128::<8>(hb),
                ),
                _mm_srli_si128::<12>(hb),
            );
            _mm_storeu_si128(ph.add(4) as *mut __m128i, hb);

            let residual = sample.wrapping_sub(sum >> fs.shift);
            fs.error = residual;

            residual
        }

        #[target_feature(enable = $feature)]
        pub unsafe fn $decode(fs: &mut FilterState, residual: i32) -> i32 {
            let ph = fs.history.as_mut_ptr();
            let pw = fs.weight.as_mut_ptr();
            let ps = fs.step.as_mut_ptr();

            let mut sum = fs.round;

            let mut ha = _mm_loadu_si128(ph as *const __m128i);
            let hb = _mm_loadu_si128(ph.add(4) as *const __m128i);
            let mut wa = _mm_loadu_si128(pw as *const __m128i);
            let mut wb = _mm_loadu_si128(pw.add(4) as *const __m128i);
            let mut sa = _mm_loadu_si128(ps as *const __m128i);
            let sb = _mm_loadu_si128(ps.add(4) as *const __m128i);

            if fs.error < 0 {
                wa = _mm_sub_epi32(wa, sa);
                wb = _mm_sub_epi32(wb, sb);
                _mm_storeu_si128(pw as *mut __m128i, wa);
                _mm_storeu_si128(pw.add(4) as *mut __m128i, wb);
            }
            else if fs.error > 0 {
                wa = _mm_add_epi32(wa, sa);
                wb = _mm_add_epi32(wb, sb);
                _mm_storeu_si128(pw as *mut __m128i, wa);
                _mm_storeu_si128(pw.add(4) as *mut __m128i, wb);
            }

            // Horizontal sum of the eight tap products. Modular addition commutes, so the
            // reduction order does not affect the wrapped result.
            let mut dp = _mm_add_epi32($mullo(ha, wa), $mullo(hb, wb));
            dp = _mm_add_epi32(dp, _mm_unpackhi_epi64(dp, dp));
            sum = sum
                .wrapping_add(_mm_cvtsi128_si32(dp))
                .wrapping_add(_mm_cvtsi128_si32(_mm_shuffle_epi32::<1>(dp)));

            // Age the step and history registers by one tap, then re-derive the steps from the
            // differencer tap signs, forced to the fixed magnitude pattern 1, 2, 2, 4.
            sa = _mm_or_si128(_mm_srli_si128::<4>(sa), _mm_slli_si128::<12>(sb));
            ha = _mm_or_si128(_mm_srli_si128::<4>(ha), _mm_slli_si128::<12>(hb));
            let sb = _mm_andnot_si128(
                _mm_setr_epi32(0, 1, 1, 3),
                _mm_or_si128(_mm_srai_epi32::<30>(hb), _mm_setr_epi32(1, 2, 2, 4)),
            );

            _mm_storeu_si128(ph as *mut __m128i, ha);
            _mm_storeu_si128(ps as *mut __m128i, sa);
            _mm_storeu_si128(ps.add(4) as *mut __m128i, sb);

            fs.error = residual;
            let sample = residual.wrapping_add(sum >> fs.shift);

            // Differencer ladder over the reconstructed sample:
            // [s - h5 - h6 - h7, s - h6 - h7, s - h7, s] refills history[4..7].
            let hb = _mm_sub_epi32(
                _mm_sub_epi32(
                    _mm_sub_epi32(_mm_set1_epi32(sample), _mm_srli_si128::<4>(hb)),
                    _mm_srli_si128::<8>(hb),
                ),
                _mm_srli_si128::<12>(hb),
            );
            _mm_storeu_si128(ph.add(4) as *mut __m128i, hb);

            sample
        }
    };
}

hybrid_filter!("sse2", mullo_epi32_sse2, encode_sse2, decode_sse2);
hybrid_filter!("sse4.1", mullo_epi32_sse41, encode_sse41, decode_sse41);
