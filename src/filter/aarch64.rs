// TTA DSP
// Copyright (c) 2026 The TTA DSP Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NEON implementation of the hybrid filter.
//!
//! AArch64 guarantees NEON, so this implementation needs no runtime probe. The eight-lane
//! state arrays are processed as two 128-bit halves, bit-for-bit equivalent to the scalar
//! implementation.

use std::arch::aarch64::*;

use super::FilterState;

/// Per-lane seed magnitudes for the step derivation.
const STEP_SEED: [i32; 4] = [1, 2, 2, 4];
/// Per-lane masks forcing the even step magnitudes.
const STEP_MASK: [i32; 4] = [!0, !1, !1, !3];

#[target_feature(enable = "neon")]
pub unsafe fn encode(fs: &mut FilterState, sample: i32) -> i32 {
    let ph = fs.history.as_mut_ptr();
    let pw = fs.weight.as_mut_ptr();
    let ps = fs.step.as_mut_ptr();

    let mut sum = fs.round;

    let mut ha = vld1q_s32(ph);
    let hb = vld1q_s32(ph.add(4));
    let mut wa = vld1q_s32(pw);
    let mut wb = vld1q_s32(pw.add(4));
    let mut sa = vld1q_s32(ps);
    let sb = vld1q_s32(ps.add(4));

    if fs.error < 0 {
        wa = vsubq_s32(wa, sa);
        wb = vsubq_s32(wb, sb);
        vst1q_s32(pw, wa);
        vst1q_s32(pw.add(4), wb);
    }
    else if fs.error > 0 {
        wa = vaddq_s32(wa, sa);
        wb = vaddq_s32(wb, sb);
        vst1q_s32(pw, wa);
        vst1q_s32(pw.add(4), wb);
    }

    // Horizontal sum of the eight tap products. Modular addition commutes, so the reduction
    // order does not affect the wrapped result.
    let dp = vaddq_s32(vmulq_s32(ha, wa), vmulq_s32(hb, wb));
    sum = sum.wrapping_add(vaddvq_s32(dp));

    // Age the step and history registers by one tap, then re-derive the steps from the
    // differencer tap signs, forced to the fixed magnitude pattern 1, 2, 2, 4.
    sa = vextq_s32::<1>(sa, sb);
    ha = vextq_s32::<1>(ha, hb);
    let sb = vandq_s32(
        vorrq_s32(vshrq_n_s32::<30>(hb), vld1q_s32(STEP_SEED.as_ptr())),
        vld1q_s32(STEP_MASK.as_ptr()),
    );

    vst1q_s32(ph, ha);
    vst1q_s32(ps, sa);
    vst1q_s32(ps.add(4), sb);

    // Differencer ladder over the incoming sample:
    // [s - h5 - h6 - h7, s - h6 - h7, s - h7, s] refills history[4..7].
    let zero = vdupq_n_s32(0);
    let mut d = vdupq_n_s32(sample);
    d = vsubq_s32(d, vextq_s32::<1>(hb, zero));
    d = vsubq_s32(d, vextq_s32::<2>(hb, zero));
    d = vsubq_s32(d, vextq_s32::<3>(hb, zero));
    vst1q_s32(ph.add(4), d);

    let residual = sample.wrapping_sub(sum >> fs.shift);
    fs.error = residual;

    residual
}

#[target_feature(enable = "neon")]
pub unsafe fn decode(fs: &mut FilterState, residual: i32) -> i32 {
    let ph = fs.history.as_mut_ptr();
    let pw = fs.weight.as_mut_ptr();
    let ps = fs.step.as_mut_ptr();

    let mut sum = fs.round;

    let mut ha = vld1q_s32(ph);
    let hb = vld1q_s32(ph.add(4));
    let mut wa = vld1q_s32(pw);
    let mut wb = vld1q_s32(pw.add(4));
    let mut sa = vld1q_s32(ps);
    let sb = vld1q_s32(ps.add(4));

    if fs.error < 0 {
        wa = vsubq_s32(wa, sa);
        wb = vsubq_s32(wb, sb);
        vst1q_s32(pw, wa);
        vst1q_s32(pw.add(4), wb);
    }
    else if fs.error > 0 {
        wa = vaddq_s32(wa, sa);
        wb = vaddq_s32(wb, sb);
        vst1q_s32(pw, wa);
        vst1q_s32(pw.add(4), wb);
    }

    // Horizontal sum of the eight tap products. Modular addition commutes, so the reduction
    // order does not affect the wrapped result.
    let dp = vaddq_s32(vmulq_s32(ha, wa), vmulq_s32(hb, wb));
    sum = sum.wrapping_add(vaddvq_s32(dp));

    // Age the step and history registers by one tap, then re-derive the steps from the
    // differencer tap signs, forced to the fixed magnitude pattern 1, 2, 2, 4.
    sa = vextq_s32::<1>(sa, sb);
    ha = vextq_s32::<1>(ha, hb);
    let sb = vandq_s32(
        vorrq_s32(vshrq_n_s32::<30>(hb), vld1q_s32(STEP_SEED.as_ptr())),
        vld1q_s32(STEP_MASK.as_ptr()),
    );

    vst1q_s32(ph, ha);
    vst1q_s32(ps, sa);
    vst1q_s32(ps.add(4), sb);

    fs.error = residual;
    let sample = residual.wrapping_add(sum >> fs.shift);

    // Differencer ladder over the reconstructed sample:
    // [s - h5 - h6 - h7, s - h6 - h7, s - h7, s] refills history[4..7].
    let zero = vdupq_n_s32(0);
    let mut d = vdupq_n_s32(sample);
    d = vsubq_s32(d, vextq_s32::<1>(hb, zero));
    d = vsubq_s32(d, vextq_s32::<2>(hb, zero));
    d = vsubq_s32(d, vextq_s32::<3>(hb, zero));
    vst1q_s32(ph.add(4), d);

    sample
}
