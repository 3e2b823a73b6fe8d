//! Input resolution for uplift requests.
//!
//! Each input may arrive inline or as a URL. Inline content wins when it is
//! non-empty; URLs are only fetched through the [`AccessGate`].

use crate::access::{AccessGate, FetchOutcome};
use crate::error::ApiError;
use crate::uplift::UpliftRequest;
use axum::body::Bytes;
use serde_json::Value;

/// Inputs ready for the transformation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInputs {
    /// Raw context definition; validation is left to the engine
    pub context: Option<String>,
    pub document: Value,
}

pub struct InputResolver<'a> {
    gate: &'a AccessGate,
}

fn non_empty(bytes: &Option<Bytes>) -> Option<&Bytes> {
    bytes.as_ref().filter(|b| !b.is_empty())
}

fn non_blank(url: &Option<String>) -> Option<&str> {
    url.as_deref().map(str::trim).filter(|u| !u.is_empty())
}

impl<'a> InputResolver<'a> {
    pub fn new(gate: &'a AccessGate) -> Self {
        Self { gate }
    }

    pub async fn resolve(&self, request: &UpliftRequest) -> Result<ResolvedInputs, ApiError> {
        let document = self.document(request).await?;
        let context = self.context(request).await?;
        Ok(ResolvedInputs { context, document })
    }

    /// A forbidden context URL resolves to no context at all.
    async fn context(&self, request: &UpliftRequest) -> Result<Option<String>, ApiError> {
        let bytes = match non_empty(&request.context) {
            Some(inline) => inline.clone(),
            None => match non_blank(&request.context_url) {
                Some(url) => match self.gate.fetch(url).await? {
                    FetchOutcome::Fetched(body) => body,
                    FetchOutcome::Forbidden => return Ok(None),
                },
                None => return Ok(None),
            },
        };

        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| ApiError::generic("UnicodeDecodeError", e.to_string()))?;
        Ok(Some(text))
    }

    async fn document(&self, request: &UpliftRequest) -> Result<Value, ApiError> {
        let bytes = match non_empty(&request.document) {
            Some(inline) => inline.clone(),
            None => {
                let url = non_blank(&request.document_url).ok_or_else(ApiError::no_json_source)?;
                match self.gate.fetch(url).await? {
                    FetchOutcome::Fetched(body) => body,
                    FetchOutcome::Forbidden => return Err(ApiError::fetch_forbidden()),
                }
            }
        };
        parse_document(&bytes)
    }
}

/// Parse document bytes as JSON, falling back to YAML.
pub fn parse_document(bytes: &[u8]) -> Result<Value, ApiError> {
    let parsed = match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => value,
        Err(json_error) => serde_yaml::from_slice::<Value>(bytes).map_err(|yaml_error| {
            tracing::debug!(%json_error, %yaml_error, "document is neither JSON nor YAML");
            ApiError::json_decode()
        })?,
    };
    if parsed.is_null() {
        return Err(ApiError::json_decode());
    }
    Ok(parsed)
}
