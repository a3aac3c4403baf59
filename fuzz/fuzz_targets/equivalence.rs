#![no_main]

use libfuzzer_sys::fuzz_target;

use tta_dsp::{FilterState, Kernel};

fuzz_target!(|data: Vec<i32>| {
    if data.is_empty() {
        return;
    }

    let shift = 1 + (data[0].unsigned_abs() % 31);
    let samples = &data[1..];

    let kernel = Kernel::detect();

    let mut reference = FilterState::new(shift);
    let mut state = FilterState::new(shift);
    for &sample in samples {
        let expected = Kernel::Scalar.encode(&mut reference, sample);
        let actual = kernel.encode(&mut state, sample);
        assert_eq!(actual, expected);
        assert_eq!(state, reference);
    }

    let mut reference = FilterState::new(shift);
    let mut state = FilterState::new(shift);
    for &residual in samples {
        let expected = Kernel::Scalar.decode(&mut reference, residual);
        let actual = kernel.decode(&mut state, residual);
        assert_eq!(actual, expected);
        assert_eq!(state, reference);
    }
});
