#![no_main]

use libfuzzer_sys::fuzz_target;
use modship::version::bump;

fuzz_target!(|input: &str| {
    let next = bump(input);

    assert_ne!(next, input.trim());
    // Everything before the last dot survives a bump.
    if let Some((prefix, _)) = input.trim().rsplit_once('.') {
        assert!(next.starts_with(prefix));
    }
});
