#![no_main]

use libfuzzer_sys::fuzz_target;
use modship::classify::{ResponseClassifier, classify};
use modship_types::{UploadResponse, Verdict};

fuzz_target!(|data: (u16, &[u8], bool)| {
    let (status, raw, fail_fast) = data;
    let body = String::from_utf8_lossy(raw);

    let verdict = classify(status, &body);

    let lower = body.to_lowercase();
    let conflict = lower.contains("already exists") || lower.contains("duplicate");

    match status {
        401 | 403 => assert_eq!(verdict, Verdict::AuthFailure),
        409 => assert_eq!(verdict, Verdict::BumpVersion),
        _ if conflict => assert_eq!(verdict, Verdict::BumpVersion),
        0 | 500..=599 => assert_eq!(verdict, Verdict::Retry),
        _ => assert_eq!(verdict, Verdict::Fatal),
    }

    // Real HTTP answers never hit the missing-credentials policy.
    if status != 0 {
        let response = UploadResponse::from_http(status, body.to_string());
        assert_eq!(ResponseClassifier::new(fail_fast).classify(&response), verdict);
    }

    let missing = ResponseClassifier::new(fail_fast).classify(&UploadResponse::missing_credentials());
    if fail_fast {
        assert_eq!(missing, Verdict::ConfigurationMissing);
    } else {
        assert_eq!(missing, Verdict::Retry);
    }
});
