// TTA DSP
// Copyright (c) 2026 The TTA DSP Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Portable scalar implementation of the hybrid filter.
//!
//! This implementation defines the numeric contract: every vectorized implementation must
//! reproduce its output and state transitions bit for bit. All arithmetic wraps modulo 2^32,
//! with no widening or saturation.

use super::FilterState;

/// Nudge each weight by its step in the direction of the previous call's residual. A zero
/// residual leaves the weights untouched.
#[inline(always)]
fn adapt_weights(fs: &mut FilterState) {
    if fs.error < 0 {
        for (w, s) in fs.weight.iter_mut().zip(&fs.step) {
            *w = w.wrapping_sub(*s);
        }
    }
    else if fs.error > 0 {
        for (w, s) in fs.weight.iter_mut().zip(&fs.step) {
            *w = w.wrapping_add(*s);
        }
    }
}

/// The fixed-point prediction: the rounding bias plus the history-weight dot product,
/// accumulated modulo 2^32.
#[inline(always)]
fn predict(fs: &FilterState) -> i32 {
    let mut sum = fs.round;
    for (h, w) in fs.history.iter().zip(&fs.weight) {
        sum = sum.wrapping_add(h.wrapping_mul(*w));
    }
    sum
}

/// Age the step and history registers by one tap, then re-derive the step magnitudes from the
/// signs of the differencer taps left by the previous call.
#[inline(always)]
fn age_registers(fs: &mut FilterState) {
    fs.step.copy_within(1..5, 0);
    fs.history.copy_within(1..5, 0);

    // Sign of each differencer tap, forced to the fixed magnitude pattern 1, 2, 2, 4.
    fs.step[4] = (fs.history[4] >> 30) | 1;
    fs.step[5] = ((fs.history[5] >> 30) | 2) & !1;
    fs.step[6] = ((fs.history[6] >> 30) | 2) & !1;
    fs.step[7] = ((fs.history[7] >> 30) | 4) & !3;
}

/// Update the differencer ladder with a new sample: positions 7 down to 4 receive the raw
/// sample and its 1st, 2nd, and 3rd discrete differences.
#[inline(always)]
fn update_differencer(fs: &mut FilterState, sample: i32) {
    fs.history[4] = fs.history[5].wrapping_neg();
    fs.history[5] = fs.history[6].wrapping_neg();
    fs.history[6] = sample.wrapping_sub(fs.history[7]);
    fs.history[7] = sample;
    fs.history[5] = fs.history[5].wrapping_add(fs.history[6]);
    fs.history[4] = fs.history[4].wrapping_add(fs.history[5]);
}

/// Encode one sample, returning the prediction residual.
///
/// The transition runs in a fixed order: weight adaptation driven by the previous residual's
/// sign, prediction, register aging, differencer update over the original sample, and finally
/// the residual itself. Reordering any of these changes the residual stream.
#[inline]
pub fn encode(fs: &mut FilterState, sample: i32) -> i32 {
    adapt_weights(fs);
    let sum = predict(fs);
    age_registers(fs);
    update_differencer(fs, sample);

    let residual = sample.wrapping_sub(sum >> fs.shift);
    fs.error = residual;

    residual
}

/// Decode one residual, returning the reconstructed sample.
///
/// The mirror image of [`encode`]: the stored residual is the input itself, and the differencer
/// consumes the reconstructed sample, which equals the sample the encoder saw.
#[inline]
pub fn decode(fs: &mut FilterState, residual: i32) -> i32 {
    adapt_weights(fs);
    let sum = predict(fs);
    age_registers(fs);

    fs.error = residual;
    let sample = residual.wrapping_add(sum >> fs.shift);

    update_differencer(fs, sample);

    sample
}
