//! Transformation engine boundary.
//!
//! The orchestrator only talks to [`UpliftEngine`]. The built-in
//! [`ContextUplifter`] annotates a JSON document with JSON-LD contexts and
//! types selected by path, expands it and converts the expansion to RDF.

pub mod context;
pub mod expand;
pub mod graph;
pub mod remote;

use crate::access::FetchPolicy;
use crate::error::{ApiError, ErrorKind};
use async_trait::async_trait;
use oxigraph::store::Store;
use serde_json::Value;
use std::time::Duration;

pub use context::{PathSelector, UpliftContext};
pub use expand::{ExpandOptions, expand_document};
pub use graph::expanded_to_store;
pub use remote::RemoteContexts;

/// Structured failure raised while validating a context definition or a document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{msg}")]
pub struct ValidationError {
    pub msg: String,
    /// Position inside a list-valued property, when the failure is in one entry
    pub index: Option<usize>,
    pub property: Option<String>,
    pub value: Option<Value>,
    /// Underlying error formatted as `Type|message`
    pub cause: Option<String>,
}

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            index: None,
            property: None,
            value: None,
            cause: None,
        }
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn cause(mut self, type_name: &str, message: impl std::fmt::Display) -> Self {
        self.cause = Some(format!("{type_name}|{message}"));
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Fetching remote context {0} is not allowed")]
    ContextFetchForbidden(String),
    #[error("Could not load remote context {url}: {reason}")]
    ContextFetch { url: String, reason: String },
    #[error("{0}")]
    InvalidJsonLd(String),
    #[error("Invalid IRI {0}")]
    InvalidIri(String),
    #[error("{0}")]
    Storage(String),
}

impl EngineError {
    pub fn type_name(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "ValidationError",
            EngineError::ContextFetchForbidden(_) => "ContextFetchForbidden",
            EngineError::ContextFetch { .. } => "JsonLdError",
            EngineError::InvalidJsonLd(_) => "JsonLdError",
            EngineError::InvalidIri(_) => "IriParseError",
            EngineError::Storage(_) => "StorageError",
        }
    }

    pub(crate) fn storage(error: impl std::fmt::Display) -> Self {
        EngineError::Storage(error.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Validation(v) => ApiError::new(ErrorKind::Validation, v.msg)
                .with_field("index", v.index)
                .with_field("property", v.property)
                .with_field("value", v.value)
                .with_field("cause", v.cause),
            other => ApiError::generic(other.type_name(), other.to_string()),
        }
    }
}

/// Everything one engine run produces.
#[derive(Debug, Clone)]
pub struct UpliftOutput {
    pub graph: Store,
    pub expanded: Value,
    pub uplifted: Value,
}

#[async_trait]
pub trait UpliftEngine: Send + Sync {
    /// Validate and normalize a context definition; `None` or blank text is an empty definition.
    fn validate_context(&self, text: Option<&str>) -> Result<UpliftContext, EngineError>;

    /// Uplift `document`. Remote JSON-LD contexts are only dereferenced when
    /// `whitelist` allows them.
    async fn generate(
        &self,
        document: &Value,
        context: &UpliftContext,
        base: Option<&str>,
        whitelist: &FetchPolicy,
    ) -> Result<UpliftOutput, EngineError>;
}

/// Built-in engine.
#[derive(Debug, Clone)]
pub struct ContextUplifter {
    client: reqwest::Client,
}

impl ContextUplifter {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpliftEngine for ContextUplifter {
    fn validate_context(&self, text: Option<&str>) -> Result<UpliftContext, EngineError> {
        Ok(UpliftContext::parse(text)?)
    }

    async fn generate(
        &self,
        document: &Value,
        context: &UpliftContext,
        base: Option<&str>,
        whitelist: &FetchPolicy,
    ) -> Result<UpliftOutput, EngineError> {
        let uplifted = context.apply(document);
        let base = base
            .filter(|b| !b.is_empty())
            .or(context.base_uri.as_deref());

        let remote = RemoteContexts::collect(&self.client, &uplifted, whitelist).await?;
        let options = ExpandOptions {
            base: base.map(str::to_string),
            remote: &remote,
        };
        let expanded = expand_document(&uplifted, &options)?;
        let graph = expanded_to_store(&expanded)?;

        Ok(UpliftOutput {
            graph,
            expanded,
            uplifted,
        })
    }
}
