//! Remote fetch access control.
//!
//! Two policies exist per process: one gates the document/context fetches the
//! gateway performs itself ([`AccessGate`]), the other is handed to the
//! transformation engine for dereferencing remote JSON-LD contexts. Both are
//! normalized at startup into a single [`FetchPolicy`] value.

use crate::error::ApiError;
use crate::log_security_event;
use crate::metrics::METRICS;
use anyhow::{Context, Result, bail};
use axum::body::Bytes;
use regex::Regex;
use serde_json::{Value, json};
use std::time::Duration;

/// A pattern accepted by [`FetchPolicy::Patterns`], kept with its source text.
#[derive(Debug, Clone)]
pub struct AllowPattern {
    source: String,
    regex: Regex,
}

impl AllowPattern {
    pub fn new(source: &str) -> Result<Self> {
        // Anchored so that only a full match of the URL counts.
        let regex = Regex::new(&format!("^(?:{source})$"))
            .with_context(|| format!("invalid fetch pattern {source:?}"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn full_match(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

/// Which remote URLs may be fetched.
#[derive(Debug, Clone, Default)]
pub enum FetchPolicy {
    /// Any URL
    Open,
    /// No URL
    #[default]
    Disabled,
    /// URLs fully matching at least one pattern
    Patterns(Vec<AllowPattern>),
    /// URLs equal to one of the listed literals
    Whitelist(Vec<String>),
}

impl FetchPolicy {
    /// Build a pattern policy; an empty list denies everything.
    pub fn patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let compiled = patterns
            .into_iter()
            .map(|p| AllowPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if compiled.is_empty() {
            Ok(FetchPolicy::Disabled)
        } else {
            Ok(FetchPolicy::Patterns(compiled))
        }
    }

    /// Parse the service-level allow setting.
    ///
    /// Empty means disabled. JSON text may be a single pattern string or an
    /// array of them; anything that is not JSON is taken as one raw pattern.
    pub fn from_allow_setting(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(FetchPolicy::Disabled);
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_allow_value(&value),
            Err(_) => Self::patterns([raw]),
        }
    }

    pub fn from_allow_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(pattern) if pattern.trim().is_empty() => Ok(FetchPolicy::Disabled),
            Value::String(pattern) => Self::patterns([pattern.as_str()]),
            Value::Array(items) => {
                let patterns = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.as_str()),
                        other => bail!("fetch patterns must be strings, got {other}"),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::patterns(patterns)
            }
            other => bail!("unparseable remote fetch allow setting: {other}"),
        }
    }

    /// Parse the engine-level context fetch whitelist setting.
    ///
    /// Unset or empty means open. A JSON array lists literal URLs (empty
    /// entries are dropped); an array left empty, or `false`, disables fetching.
    pub fn from_context_setting(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(FetchPolicy::Open);
        }
        let value: Value = serde_json::from_str(raw)
            .with_context(|| format!("context fetch whitelist is not valid JSON: {raw}"))?;
        Self::from_context_value(&value)
    }

    pub fn from_context_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(FetchPolicy::Open),
            Value::Bool(false) => Ok(FetchPolicy::Disabled),
            Value::String(url) if url.is_empty() => Ok(FetchPolicy::Disabled),
            Value::String(url) => Ok(FetchPolicy::Whitelist(vec![url.clone()])),
            Value::Array(items) => {
                let mut urls = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) if s.is_empty() => {}
                        Value::String(s) => urls.push(s.clone()),
                        Value::Null => {}
                        other => bail!("context whitelist entries must be strings, got {other}"),
                    }
                }
                if urls.is_empty() {
                    Ok(FetchPolicy::Disabled)
                } else {
                    Ok(FetchPolicy::Whitelist(urls))
                }
            }
            other => bail!("unparseable context fetch whitelist: {other}"),
        }
    }

    pub fn allows(&self, url: &str) -> bool {
        match self {
            FetchPolicy::Open => true,
            FetchPolicy::Disabled => false,
            FetchPolicy::Patterns(patterns) => patterns.iter().any(|p| p.full_match(url)),
            FetchPolicy::Whitelist(urls) => urls.iter().any(|u| u == url),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, FetchPolicy::Disabled)
    }

    /// Short name used in status responses and logs
    pub fn type_name(&self) -> &'static str {
        match self {
            FetchPolicy::Open => "open",
            FetchPolicy::Disabled => "disabled",
            FetchPolicy::Patterns(_) => "patterns",
            FetchPolicy::Whitelist(_) => "whitelist",
        }
    }
}

/// Status object describing both fetch policies.
pub fn policy_status(service: &FetchPolicy, context: &FetchPolicy) -> Value {
    let mut status = json!({ "enabled": service.is_enabled() });
    match service {
        FetchPolicy::Patterns(patterns) => {
            let regex: Vec<&str> = patterns.iter().map(AllowPattern::source).collect();
            status["regex"] = json!(regex);
        }
        FetchPolicy::Open => {
            status["regex"] = json!([".*"]);
        }
        FetchPolicy::Whitelist(urls) => {
            let regex: Vec<String> = urls.iter().map(|u| regex::escape(u)).collect();
            status["regex"] = json!(regex);
        }
        FetchPolicy::Disabled => {}
    }

    status["context"] = match context {
        FetchPolicy::Open => json!({ "type": "open" }),
        FetchPolicy::Disabled => json!({ "type": "disabled" }),
        FetchPolicy::Whitelist(urls) => json!({ "type": "whitelist", "whitelist": urls }),
        FetchPolicy::Patterns(patterns) => {
            let whitelist: Vec<&str> = patterns.iter().map(AllowPattern::source).collect();
            json!({ "type": "whitelist", "whitelist": whitelist })
        }
    };
    status
}

/// Result of a gated fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(Bytes),
    /// The policy denied the URL or a redirect target; nothing was fetched from it
    Forbidden,
}

/// Gate for the gateway's own outbound fetches.
#[derive(Debug, Clone)]
pub struct AccessGate {
    policy: FetchPolicy,
    client: reqwest::Client,
}

/// Raised from the redirect policy when a hop leaves the allowed URLs.
#[derive(Debug, thiserror::Error)]
#[error("redirect to {0} is not allowed")]
struct RedirectDenied(String);

const MAX_REDIRECTS: usize = 10;

/// Follow a redirect only while every hop is allowed by `policy`.
fn redirect_policy(policy: FetchPolicy) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if policy.allows(attempt.url().as_str()) {
            attempt.follow()
        } else {
            let target = attempt.url().to_string();
            attempt.error(RedirectDenied(target))
        }
    })
}

fn denied_redirect(error: &reqwest::Error) -> Option<&RedirectDenied> {
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        if let Some(denied) = inner.downcast_ref::<RedirectDenied>() {
            return Some(denied);
        }
        source = inner.source();
    }
    None
}

impl AccessGate {
    pub fn new(policy: FetchPolicy, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect_policy(policy.clone()))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { policy, client })
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        self.policy.allows(url)
    }

    /// Fetch `url` if the policy allows it.
    ///
    /// A denied URL yields [`FetchOutcome::Forbidden`] rather than an error.
    /// Transport failures and non-success statuses are reported as generic errors.
    pub async fn fetch(&self, url: &str) -> Result<FetchOutcome, ApiError> {
        if !self.is_allowed(url) {
            log_security_event!("fetch_denied", url = %url, "remote fetch not allowed");
            METRICS.record_fetch("denied");
            return Ok(FetchOutcome::Forbidden);
        }

        tracing::info!(url = %url, "remote fetching");
        METRICS.record_fetch("allowed");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                if let Some(denied) = denied_redirect(&e) {
                    log_security_event!("fetch_denied", url = %url, redirect = %denied.0, "redirect target not allowed");
                    METRICS.record_fetch("denied");
                    return Ok(FetchOutcome::Forbidden);
                }
                return Err(ApiError::generic("ConnectionError", e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::generic(
                "HTTPError",
                format!("{status} for url: {url}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::generic("ConnectionError", e.to_string()))?;
        Ok(FetchOutcome::Fetched(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_setting_disables_fetching() {
        let policy = FetchPolicy::from_allow_setting("   ").unwrap();
        assert!(!policy.is_enabled());
        assert!(!policy.allows("https://example.com/doc.json"));
    }

    #[test]
    fn raw_allow_setting_is_a_single_pattern() {
        let policy = FetchPolicy::from_allow_setting(r"https://a\.com/.*").unwrap();
        assert!(policy.allows("https://a.com/x"));
        assert!(!policy.allows("https://evil.com/https://a.com/x"));
        assert!(!policy.allows("https://a.com"));
    }

    #[test]
    fn json_allow_setting_accepts_string_and_array() {
        let single = FetchPolicy::from_allow_setting(r#""https://a\\.com/.*""#).unwrap();
        assert!(single.allows("https://a.com/doc"));

        let many =
            FetchPolicy::from_allow_setting(r#"["https://a\\.com/.*", "https://b\\.org/x"]"#)
                .unwrap();
        assert!(many.allows("https://b.org/x"));
        assert!(!many.allows("https://b.org/xy"));
        assert!(many.allows("https://a.com/"));
    }

    #[test]
    fn json_allow_setting_rejects_other_shapes() {
        assert!(FetchPolicy::from_allow_setting("{\"a\": 1}").is_err());
        assert!(FetchPolicy::from_allow_setting("[1, 2]").is_err());
    }

    #[test]
    fn empty_allow_array_disables_fetching() {
        let policy = FetchPolicy::from_allow_setting("[]").unwrap();
        assert!(matches!(policy, FetchPolicy::Disabled));
    }

    #[test]
    fn invalid_regex_is_a_configuration_error() {
        assert!(FetchPolicy::from_allow_setting("[\"(unclosed\"]").is_err());
    }

    #[test]
    fn context_setting_normalization() {
        assert!(matches!(
            FetchPolicy::from_context_setting("").unwrap(),
            FetchPolicy::Open
        ));
        assert!(matches!(
            FetchPolicy::from_context_setting("[]").unwrap(),
            FetchPolicy::Disabled
        ));
        assert!(matches!(
            FetchPolicy::from_context_setting("[\"\", \"\"]").unwrap(),
            FetchPolicy::Disabled
        ));
        assert!(matches!(
            FetchPolicy::from_context_setting("false").unwrap(),
            FetchPolicy::Disabled
        ));

        let policy =
            FetchPolicy::from_context_setting(r#"["https://schema.org/ctx.jsonld", ""]"#).unwrap();
        assert!(policy.allows("https://schema.org/ctx.jsonld"));
        assert!(!policy.allows("https://schema.org/ctx.jsonld?x=1"));
        assert!(FetchPolicy::from_context_setting("not json").is_err());
    }

    #[test]
    fn status_reports_both_policies() {
        let service = FetchPolicy::patterns(["https://a\\.com/.*"]).unwrap();
        let context = FetchPolicy::Whitelist(vec!["https://ctx.example/c.jsonld".into()]);
        let status = policy_status(&service, &context);

        assert_eq!(status["enabled"], true);
        assert_eq!(status["regex"], json!(["https://a\\.com/.*"]));
        assert_eq!(status["context"]["type"], "whitelist");
        assert_eq!(
            status["context"]["whitelist"],
            json!(["https://ctx.example/c.jsonld"])
        );

        let status = policy_status(&FetchPolicy::Disabled, &FetchPolicy::Open);
        assert_eq!(status["enabled"], false);
        assert!(status.get("regex").is_none());
        assert_eq!(status["context"], json!({ "type": "open" }));
    }

    #[tokio::test]
    async fn denied_fetch_returns_forbidden_without_error() {
        let gate = AccessGate::new(FetchPolicy::Disabled, Duration::from_secs(1)).unwrap();
        let outcome = gate.fetch("https://example.com/doc.json").await.unwrap();
        assert_eq!(outcome, FetchOutcome::Forbidden);
    }
}
