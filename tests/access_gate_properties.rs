use std::time::Duration;

use assert_matches::assert_matches;
use proptest::prelude::*;
use uplift_gateway::access::{AccessGate, FetchOutcome, FetchPolicy};

fn url() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("http"), Just("https")],
        "[a-z]{1,12}",
        prop_oneof![Just("org"), Just("com"), Just("net")],
        "[a-z0-9/._-]{0,24}",
    )
        .prop_map(|(scheme, host, tld, path)| format!("{scheme}://{host}.{tld}/{path}"))
}

proptest! {
    #[test]
    fn disabled_policy_allows_nothing(url in url()) {
        prop_assert!(!FetchPolicy::Disabled.allows(&url));
    }

    #[test]
    fn open_policy_allows_everything(url in url()) {
        prop_assert!(FetchPolicy::Open.allows(&url));
    }

    #[test]
    fn escaped_literal_pattern_matches_only_itself(url in url(), suffix in "[a-z]{1,4}") {
        let policy = FetchPolicy::patterns([regex::escape(&url)]).unwrap();
        prop_assert!(policy.allows(&url));
        let longer = format!("{url}{suffix}");
        prop_assert!(!policy.allows(&longer));
        let prefixed = format!("https://evil.example/{url}");
        prop_assert!(!policy.allows(&prefixed));
    }

    #[test]
    fn whitelist_is_exact(url in url()) {
        let policy = FetchPolicy::Whitelist(vec![url.clone()]);
        prop_assert!(policy.allows(&url));
        let upper = url.to_uppercase();
        prop_assert_eq!(policy.allows(&upper), upper == url);
    }
}

#[tokio::test]
async fn denied_fetch_makes_no_request() {
    // nothing listens on this port; a real request would fail with a connection error
    let gate = AccessGate::new(
        FetchPolicy::patterns([r"https://allowed\.example/.*"]).unwrap(),
        Duration::from_secs(1),
    )
    .unwrap();
    let outcome = gate.fetch("http://127.0.0.1:9/doc.json").await.unwrap();
    assert_matches!(outcome, FetchOutcome::Forbidden);
}

#[tokio::test]
async fn allowed_but_unreachable_url_is_a_generic_error() {
    let gate = AccessGate::new(FetchPolicy::Open, Duration::from_secs(1)).unwrap();
    let error = gate.fetch("http://127.0.0.1:9/doc.json").await.unwrap_err();
    assert_eq!(error.kind.type_name(), "ConnectionError");
}
