#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use modship_retry::{BackoffConfig, BackoffStrategy, backoff_delay, total_backoff};

fuzz_target!(|data: (u32, u8, u64, Option<u64>, u8)| {
    let (attempt, strategy_byte, base_ms, max_ms, jitter_byte) = data;

    let strategy = match strategy_byte % 3 {
        0 => BackoffStrategy::Immediate,
        1 => BackoffStrategy::Exponential,
        _ => BackoffStrategy::Constant,
    };
    let config = BackoffConfig {
        strategy,
        max_attempts: 50,
        base_delay: Duration::from_millis(base_ms % 600_000),
        max_delay: max_ms.map(|ms| Duration::from_millis(ms % 3_600_000)),
        jitter: f64::from(jitter_byte) / 255.0,
    };

    let delay = backoff_delay(&config, attempt % 64);

    if strategy == BackoffStrategy::Immediate {
        assert_eq!(delay, Duration::ZERO);
    }
    if config.jitter == 0.0
        && let Some(max) = config.max_delay
    {
        assert!(delay <= max);
    }

    // Summing the schedule must saturate rather than overflow.
    let _ = total_backoff(&config, attempt % 1000);
});
