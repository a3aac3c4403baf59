// TTA DSP
// Copyright (c) 2026 The TTA DSP Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The hybrid prediction filter at the core of the True Audio (TTA) lossless codec.
//!
//! The filter predicts each PCM sample from recent history and emits only the prediction
//! residual; the inverse operation reconstructs the sample from the residual, bit-exactly. One
//! portable scalar implementation defines the numeric contract, and SSE2, SSE4.1, and NEON
//! implementations reproduce it bit-for-bit. All filter arithmetic wraps modulo 2^32 by design:
//! the overflow behaviour is part of the stream format, not an accident.

pub mod filter;

pub use filter::{active_kernel, decode, encode, FilterState, Kernel};
