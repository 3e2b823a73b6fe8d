//! Remote JSON-LD context loading.
//!
//! Context URLs are discovered and fetched up front so that expansion itself
//! stays synchronous.

use super::EngineError;
use crate::access::FetchPolicy;
use crate::log_security_event;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

const MAX_REMOTE_CONTEXTS: usize = 32;

/// Remote context documents keyed by URL; values are the documents' `@context` entries.
#[derive(Debug, Clone, Default)]
pub struct RemoteContexts {
    loaded: HashMap<String, Value>,
}

impl RemoteContexts {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&Value> {
        self.loaded.get(url)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    pub fn insert(&mut self, url: impl Into<String>, context: Value) {
        self.loaded.insert(url.into(), context);
    }

    /// Fetch every context URL referenced by `document`, and transitively by
    /// the fetched contexts, under `policy`.
    pub async fn collect(
        client: &reqwest::Client,
        document: &Value,
        policy: &FetchPolicy,
    ) -> Result<Self, EngineError> {
        let mut remote = Self::default();
        let mut pending = VecDeque::new();
        find_context_urls(document, &mut pending);

        while let Some(url) = pending.pop_front() {
            if remote.loaded.contains_key(&url) {
                continue;
            }
            if remote.loaded.len() >= MAX_REMOTE_CONTEXTS {
                return Err(EngineError::InvalidJsonLd(format!(
                    "Too many remote contexts (limit {MAX_REMOTE_CONTEXTS})"
                )));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(EngineError::ContextFetch {
                    url,
                    reason: "only absolute http(s) context URLs can be loaded".into(),
                });
            }
            if !policy.allows(&url) {
                log_security_event!("context_fetch_denied", url = %url, "remote context fetch not allowed");
                return Err(EngineError::ContextFetchForbidden(url));
            }

            let context = fetch_context(client, &url, policy).await?;
            let mut nested = VecDeque::new();
            collect_from_context(&context, &mut nested);
            pending.extend(nested);
            remote.loaded.insert(url, context);
        }

        Ok(remote)
    }
}

async fn fetch_context(
    client: &reqwest::Client,
    url: &str,
    policy: &FetchPolicy,
) -> Result<Value, EngineError> {
    tracing::info!(url = %url, "fetching remote context");
    let failed = |reason: String| EngineError::ContextFetch {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/ld+json, application/json")
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;
    let landed = response.url().as_str();
    if landed != url && !policy.allows(landed) {
        log_security_event!("context_fetch_denied", url = %url, redirect = %landed, "context redirect target not allowed");
        return Err(EngineError::ContextFetchForbidden(landed.to_string()));
    }
    if !response.status().is_success() {
        return Err(failed(response.status().to_string()));
    }
    let document: Value = response.json().await.map_err(|e| failed(e.to_string()))?;

    match document {
        Value::Object(mut map) => map
            .remove("@context")
            .ok_or_else(|| failed("document has no @context".into())),
        _ => Err(failed("document is not a JSON object".into())),
    }
}

fn find_context_urls(value: &Value, out: &mut VecDeque<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == "@context" {
                    collect_from_context(child, out);
                } else {
                    find_context_urls(child, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| find_context_urls(item, out)),
        _ => {}
    }
}

/// URLs referenced from a context value, including term-scoped contexts.
fn collect_from_context(context: &Value, out: &mut VecDeque<String>) {
    match context {
        Value::String(url) => out.push_back(url.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_from_context(item, out)),
        Value::Object(map) => {
            for definition in map.values() {
                if let Some(scoped) = definition.get("@context") {
                    collect_from_context(scoped, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_urls_in_document_and_scoped_contexts() {
        let doc = json!({
            "@context": ["https://a.example/ctx", {"p": {"@id": "http://x/p", "@context": "https://b.example/ctx"}}],
            "child": {"@context": "https://c.example/ctx"}
        });
        let mut urls = VecDeque::new();
        find_context_urls(&doc, &mut urls);
        let urls: Vec<_> = urls.into_iter().collect();
        assert!(urls.contains(&"https://a.example/ctx".to_string()));
        assert!(urls.contains(&"https://b.example/ctx".to_string()));
        assert!(urls.contains(&"https://c.example/ctx".to_string()));
    }

    #[tokio::test]
    async fn denied_context_is_an_error() {
        let doc = json!({"@context": "https://a.example/ctx", "a": 1});
        let err = RemoteContexts::collect(&reqwest::Client::new(), &doc, &FetchPolicy::Disabled)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ContextFetchForbidden(url) if url == "https://a.example/ctx"));
    }

    #[tokio::test]
    async fn no_urls_means_no_fetches() {
        let doc = json!({"@context": {"a": "http://example.org/a"}, "a": 1});
        let remote = RemoteContexts::collect(&reqwest::Client::new(), &doc, &FetchPolicy::Disabled)
            .await
            .unwrap();
        assert!(remote.is_empty());
    }
}
