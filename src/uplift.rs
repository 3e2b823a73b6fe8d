//! Uplift orchestration: resolve inputs, run the engine, render the requested output.

use crate::access::{AccessGate, FetchPolicy};
use crate::archive::{ZIP_MEDIA_TYPE, zip_entries};
use crate::engine::{UpliftEngine, UpliftOutput};
use crate::error::ApiError;
use crate::provenance::{FileProvenance, ProvenanceMetadata, SELF_URI};
use crate::rdf;
use crate::resolve::InputResolver;
use axum::body::Bytes;
use chrono::Utc;
use serde_json::Value;
use std::str::FromStr;

pub const TURTLE_MEDIA_TYPE: &str = "text/turtle";
pub const JSONLD_MEDIA_TYPE: &str = "application/ld+json";
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Entry names of the `all` archive.
pub const ALL_TURTLE_ENTRY: &str = "ttl.ttl";
pub const ALL_EXPANDED_ENTRY: &str = "expanded.jsonld";
pub const ALL_UPLIFTED_ENTRY: &str = "uplifted.jsonld";

/// Requested response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Uplifted,
    All,
    Expanded,
    #[strum(serialize = "ttl")]
    Turtle,
}

impl FromStr for OutputKind {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "uplifted" => Ok(OutputKind::Uplifted),
            "all" => Ok(OutputKind::All),
            "expanded" => Ok(OutputKind::Expanded),
            "ttl" | "turtle" => Ok(OutputKind::Turtle),
            other => Err(ApiError::invalid_parameter(format!(
                "Unknown output type {other:?}; expected one of uplifted, all, expanded, ttl"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpliftRequest {
    pub context: Option<Bytes>,
    pub context_url: Option<String>,
    pub document: Option<Bytes>,
    pub document_url: Option<String>,
    pub output: OutputKind,
    pub base: Option<String>,
    pub provenance: bool,
}

impl Default for UpliftRequest {
    fn default() -> Self {
        Self {
            context: None,
            context_url: None,
            document: None,
            document_url: None,
            output: OutputKind::default(),
            base: None,
            provenance: true,
        }
    }
}

/// A rendered uplift result.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputBundle {
    Json(Value),
    Turtle(String),
    Archive(Vec<u8>),
}

impl OutputBundle {
    pub fn media_type(&self) -> &'static str {
        match self {
            OutputBundle::Json(_) => JSON_MEDIA_TYPE,
            OutputBundle::Turtle(_) => TURTLE_MEDIA_TYPE,
            OutputBundle::Archive(_) => ZIP_MEDIA_TYPE,
        }
    }
}

pub struct UpliftOrchestrator<'a> {
    gate: &'a AccessGate,
    engine: &'a dyn UpliftEngine,
    context_policy: &'a FetchPolicy,
}

impl<'a> UpliftOrchestrator<'a> {
    pub fn new(gate: &'a AccessGate, engine: &'a dyn UpliftEngine, context_policy: &'a FetchPolicy) -> Self {
        Self {
            gate,
            engine,
            context_policy,
        }
    }

    #[tracing::instrument(skip_all, fields(output = %request.output))]
    pub async fn uplift(&self, request: &UpliftRequest) -> Result<OutputBundle, ApiError> {
        let start = Utc::now();
        let inputs = InputResolver::new(self.gate).resolve(request).await?;

        let context = self.engine.validate_context(inputs.context.as_deref())?;
        let output = self
            .engine
            .generate(
                &inputs.document,
                &context,
                request.base.as_deref(),
                self.context_policy,
            )
            .await?;

        let provenance = request.provenance.then(|| {
            ProvenanceMetadata::for_uplift(
                start,
                request.context_url.as_deref(),
                request.document_url.as_deref(),
            )
        });

        render(request.output, output, provenance)
            .map_err(|e| ApiError::unexpected("json_uplift", &e))
    }
}

fn render(
    kind: OutputKind,
    output: UpliftOutput,
    mut provenance: Option<ProvenanceMetadata>,
) -> anyhow::Result<OutputBundle> {
    let UpliftOutput {
        graph,
        expanded,
        uplifted,
    } = output;

    match kind {
        OutputKind::Uplifted => Ok(OutputBundle::Json(uplifted)),
        OutputKind::Turtle => Ok(OutputBundle::Turtle(render_turtle(&graph, provenance.as_mut())?)),
        OutputKind::Expanded => Ok(OutputBundle::Json(render_expanded(expanded, provenance.as_mut()))),
        OutputKind::All => {
            let turtle = render_turtle(&graph, provenance.as_mut())?;
            let expanded = render_expanded(expanded, provenance.as_mut());
            let expanded = serde_json::to_string_pretty(&expanded)?;
            let uplifted = serde_json::to_string_pretty(&uplifted)?;
            let archive = zip_entries([
                (ALL_TURTLE_ENTRY, turtle.as_bytes()),
                (ALL_EXPANDED_ENTRY, expanded.as_bytes()),
                (ALL_UPLIFTED_ENTRY, uplifted.as_bytes()),
            ])?;
            Ok(OutputBundle::Archive(archive))
        }
    }
}

fn render_turtle(
    graph: &oxigraph::store::Store,
    provenance: Option<&mut ProvenanceMetadata>,
) -> anyhow::Result<String> {
    match provenance {
        Some(meta) => {
            meta.set_output(FileProvenance::new(Some(SELF_URI), TURTLE_MEDIA_TYPE, None));
            // decorate a copy so the engine's graph stays untouched
            let decorated = rdf::copy_graph(graph)?;
            meta.add_to_graph(&decorated)?;
            rdf::to_turtle(&decorated)
        }
        None => rdf::to_turtle(graph),
    }
}

fn render_expanded(mut expanded: Value, provenance: Option<&mut ProvenanceMetadata>) -> Value {
    if let Some(meta) = provenance {
        meta.set_output(FileProvenance::new(Some(SELF_URI), JSONLD_MEDIA_TYPE, None));
        meta.add_to_jsonld(&mut expanded);
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ContextUplifter;
    use crate::error::ErrorKind;
    use std::io::{Cursor, Read};
    use std::time::Duration;

    const CONTEXT: &str = "context:\n  a: http://example.org/a\n";

    fn request(output: OutputKind, provenance: bool) -> UpliftRequest {
        UpliftRequest {
            context: Some(Bytes::from_static(CONTEXT.as_bytes())),
            document: Some(Bytes::from_static(br#"{"a": 1}"#)),
            output,
            provenance,
            ..UpliftRequest::default()
        }
    }

    async fn run(request: &UpliftRequest) -> Result<OutputBundle, ApiError> {
        let gate = AccessGate::new(FetchPolicy::Disabled, Duration::from_secs(1)).unwrap();
        let engine = ContextUplifter::new(Duration::from_secs(1)).unwrap();
        let policy = FetchPolicy::Open;
        UpliftOrchestrator::new(&gate, &engine, &policy)
            .uplift(request)
            .await
    }

    #[test]
    fn output_kinds_parse_strictly() {
        assert_eq!("ttl".parse::<OutputKind>().unwrap(), OutputKind::Turtle);
        assert_eq!("turtle".parse::<OutputKind>().unwrap(), OutputKind::Turtle);
        assert_eq!("".parse::<OutputKind>().unwrap(), OutputKind::Uplifted);
        let err = "xml".parse::<OutputKind>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
        assert_eq!(OutputKind::Turtle.to_string(), "ttl");
    }

    #[tokio::test]
    async fn uplifted_output_never_has_provenance() {
        let OutputBundle::Json(doc) = run(&request(OutputKind::Uplifted, true)).await.unwrap() else {
            panic!("expected JSON");
        };
        assert_eq!(doc["a"], 1);
        assert!(!doc.to_string().contains("prov#"));
    }

    #[tokio::test]
    async fn turtle_without_provenance_has_one_statement() {
        let bundle = run(&request(OutputKind::Turtle, false)).await.unwrap();
        assert_eq!(bundle.media_type(), "text/turtle");
        let OutputBundle::Turtle(text) = bundle else {
            panic!("expected Turtle");
        };
        let graph = rdf::parse_graph(rdf::GraphSyntax::Turtle, text.as_bytes(), None).unwrap();
        assert_eq!(graph.len().unwrap(), 1);
        assert!(!text.contains("wasGeneratedBy"));
    }

    #[tokio::test]
    async fn expanded_with_provenance_is_decorated() {
        let OutputBundle::Json(doc) = run(&request(OutputKind::Expanded, true)).await.unwrap() else {
            panic!("expected JSON");
        };
        assert!(doc.to_string().contains("http://www.w3.org/ns/prov#wasGeneratedBy"));

        let OutputBundle::Json(plain) = run(&request(OutputKind::Expanded, false)).await.unwrap() else {
            panic!("expected JSON");
        };
        assert_eq!(plain, serde_json::json!([{"http://example.org/a": [{"@value": 1}]}]));
    }

    #[tokio::test]
    async fn all_archive_has_fixed_entries() {
        let OutputBundle::Archive(bytes) = run(&request(OutputKind::All, true)).await.unwrap() else {
            panic!("expected archive");
        };
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<_> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec![ALL_TURTLE_ENTRY, ALL_EXPANDED_ENTRY, ALL_UPLIFTED_ENTRY]);

        let mut uplifted = String::new();
        archive
            .by_name(ALL_UPLIFTED_ENTRY)
            .unwrap()
            .read_to_string(&mut uplifted)
            .unwrap();
        assert!(!uplifted.contains("prov#"));
        assert!(uplifted.contains("\n  \"a\": 1"));
    }
}
