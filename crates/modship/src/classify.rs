use modship_types::{NO_RESPONSE, UploadResponse, Verdict};

/// Judge a failed upload by its status code and body. First match wins:
///
/// 1. 401 or 403 is an authentication failure, whatever the body says.
/// 2. 409, or a body mentioning "already exists" or "duplicate" (any case),
///    is a naming conflict.
/// 3. No response at all (status 0) is transient.
/// 4. Any 5xx is transient.
/// 5. Everything else is fatal.
///
/// The same rules apply to both platforms.
pub fn classify(status: u16, body: &str) -> Verdict {
    if status == 401 || status == 403 {
        return Verdict::AuthFailure;
    }

    if status == 409 || mentions_conflict(body) {
        return Verdict::BumpVersion;
    }

    if status == NO_RESPONSE || (500..600).contains(&status) {
        return Verdict::Retry;
    }

    Verdict::Fatal
}

fn mentions_conflict(body: &str) -> bool {
    let hay = body.to_lowercase();
    hay.contains("already exists") || hay.contains("duplicate")
}

/// [`classify`] plus the missing-credentials policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseClassifier {
    /// Report absent credentials as [`Verdict::ConfigurationMissing`] instead
    /// of letting them fall through to [`Verdict::Retry`].
    pub fail_fast_on_missing_credentials: bool,
}

impl ResponseClassifier {
    pub fn new(fail_fast_on_missing_credentials: bool) -> Self {
        Self {
            fail_fast_on_missing_credentials,
        }
    }

    pub fn classify(&self, response: &UploadResponse) -> Verdict {
        if self.fail_fast_on_missing_credentials && response.is_missing_credentials() {
            return Verdict::ConfigurationMissing;
        }
        classify(response.status, &response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn documented_examples() {
        assert_eq!(classify(409, ""), Verdict::BumpVersion);
        assert_eq!(classify(0, ""), Verdict::Retry);
        assert_eq!(classify(502, ""), Verdict::Retry);
        assert_eq!(classify(418, "teapot"), Verdict::Fatal);
        assert_eq!(classify(401, ""), Verdict::AuthFailure);
        assert_eq!(classify(403, "duplicate"), Verdict::AuthFailure);
    }

    #[test]
    fn conflict_wording_is_case_insensitive() {
        assert_eq!(
            classify(400, r#"{"description":"Version ALREADY EXISTS"}"#),
            Verdict::BumpVersion
        );
        assert_eq!(classify(422, "Duplicate file name"), Verdict::BumpVersion);
        assert_eq!(classify(500, "duplicate"), Verdict::BumpVersion);
        assert_eq!(classify(0, "duplicate"), Verdict::BumpVersion);
    }

    #[test]
    fn boundaries_of_the_server_error_range() {
        assert_eq!(classify(499, ""), Verdict::Fatal);
        assert_eq!(classify(500, ""), Verdict::Retry);
        assert_eq!(classify(599, ""), Verdict::Retry);
        assert_eq!(classify(600, ""), Verdict::Fatal);
        assert_eq!(classify(404, "not found"), Verdict::Fatal);
    }

    #[test]
    fn missing_credentials_retry_by_default() {
        let classifier = ResponseClassifier::default();
        assert_eq!(
            classifier.classify(&UploadResponse::missing_credentials()),
            Verdict::Retry
        );
    }

    #[test]
    fn missing_credentials_fail_fast_when_enabled() {
        let classifier = ResponseClassifier::new(true);
        assert_eq!(
            classifier.classify(&UploadResponse::missing_credentials()),
            Verdict::ConfigurationMissing
        );
        assert_eq!(
            classifier.classify(&UploadResponse::transport("connection reset")),
            Verdict::Retry
        );
        assert_eq!(
            classifier.classify(&UploadResponse::from_http(401, "")),
            Verdict::AuthFailure
        );
    }

    proptest! {
        #[test]
        fn auth_statuses_ignore_body(status in prop::sample::select(vec![401u16, 403]), body in ".*") {
            prop_assert_eq!(classify(status, &body), Verdict::AuthFailure);
        }

        #[test]
        fn conflict_words_force_bump(
            status in (0u16..1000).prop_filter("not auth", |s| *s != 401 && *s != 403),
            prefix in "[a-z ]{0,8}",
            word in prop::sample::select(vec!["duplicate", "DUPLICATE", "Already Exists", "already exists"]),
        ) {
            let body = format!("{prefix}{word}");
            prop_assert_eq!(classify(status, &body), Verdict::BumpVersion);
        }

        #[test]
        fn classification_is_idempotent(status in 0u16..1000, body in ".{0,40}") {
            prop_assert_eq!(classify(status, &body), classify(status, &body));
        }
    }
}
