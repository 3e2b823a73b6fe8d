//! PROV-O provenance for uplift outputs.
//!
//! One [`ProvenanceMetadata`] is created per request. Its end time is fixed
//! the first time any rendering asks for it, so every output of the request
//! describes the same activity.

use crate::rdf::{DCT_NS, PROV_NS, RDFS_NS};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use oxigraph::model::vocab::{rdf, rdfs, xsd};
use oxigraph::model::{BlankNode, GraphNameRef, Literal, NamedNode, NamedOrBlankNode, Quad, Term};
use oxigraph::store::Store;
use serde_json::{Map, Value, json};
use std::sync::OnceLock;

const AGENT_LABEL: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// URI of the document being generated; relative to wherever it is stored.
pub const SELF_URI: &str = "#";

/// A file used or generated by the uplift activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProvenance {
    /// Unset for inline inputs
    pub uri: Option<String>,
    pub media_type: String,
    pub label: Option<String>,
}

impl FileProvenance {
    pub fn new(uri: Option<&str>, media_type: &str, label: Option<&str>) -> Self {
        Self {
            uri: uri.filter(|u| !u.is_empty()).map(str::to_string),
            media_type: media_type.to_string(),
            label: label.map(str::to_string),
        }
    }
}

#[derive(Debug)]
pub struct ProvenanceMetadata {
    start: DateTime<Utc>,
    end: OnceLock<DateTime<Utc>>,
    used: Vec<FileProvenance>,
    output: Option<FileProvenance>,
}

fn prov(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{PROV_NS}{local}"))
}

fn dct(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{DCT_NS}{local}"))
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ProvenanceMetadata {
    pub fn new(start: DateTime<Utc>, used: Vec<FileProvenance>) -> Self {
        Self {
            start,
            end: OnceLock::new(),
            used,
            output: None,
        }
    }

    /// Provenance for an uplift of a context definition and a JSON document.
    pub fn for_uplift(start: DateTime<Utc>, context_url: Option<&str>, document_url: Option<&str>) -> Self {
        Self::new(
            start,
            vec![
                FileProvenance::new(context_url, "text/yaml", Some("Context definition")),
                FileProvenance::new(document_url, "application/json", Some("JSON document")),
            ],
        )
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the activity, fixed on first call.
    pub fn end(&self) -> DateTime<Utc> {
        *self.end.get_or_init(Utc::now)
    }

    pub fn used(&self) -> &[FileProvenance] {
        &self.used
    }

    pub fn set_output(&mut self, output: FileProvenance) {
        self.output = Some(output);
    }

    /// Add the provenance statements to the default graph of `store`.
    pub fn add_to_graph(&self, store: &Store) -> Result<()> {
        let mut quads = Vec::new();
        let mut add = |s: NamedOrBlankNode, p: NamedNode, o: Term| {
            quads.push(Quad::new(s, p, o, GraphNameRef::DefaultGraph));
        };

        let activity: NamedOrBlankNode = BlankNode::default().into();
        let agent: NamedOrBlankNode = BlankNode::default().into();
        let date = |at: &DateTime<Utc>| -> Term {
            Literal::new_typed_literal(timestamp(at), xsd::DATE_TIME).into()
        };

        add(activity.clone(), rdf::TYPE.into_owned(), prov("Activity").into());
        add(activity.clone(), prov("startedAtTime"), date(&self.start));
        add(activity.clone(), prov("endedAtTime"), date(&self.end()));
        add(activity.clone(), prov("wasAssociatedWith"), agent.clone().into());
        add(agent.clone(), rdf::TYPE.into_owned(), prov("SoftwareAgent").into());
        add(
            agent,
            rdfs::LABEL.into_owned(),
            Literal::new_simple_literal(AGENT_LABEL).into(),
        );

        for file in &self.used {
            let entity = file_node(file);
            add(activity.clone(), prov("used"), entity.clone().into());
            describe_file(&mut add, &entity, file);
        }

        if let Some(output) = &self.output {
            let entity = file_node(output);
            describe_file(&mut add, &entity, output);
            add(entity, prov("wasGeneratedBy"), activity.clone().into());
        }

        for quad in &quads {
            store.insert(quad)?;
        }
        Ok(())
    }

    /// Append the provenance nodes, in expanded JSON-LD form, to `expanded`.
    ///
    /// An expanded array gets new node objects; an object with `@graph` gets
    /// them in its graph; any other object is wrapped in an array first.
    pub fn add_to_jsonld(&self, expanded: &mut Value) {
        let nodes = self.jsonld_nodes();
        match expanded {
            Value::Array(items) => items.extend(nodes),
            Value::Object(map) if map.contains_key("@graph") => {
                if let Some(Value::Array(graph)) = map.get_mut("@graph") {
                    graph.extend(nodes);
                }
            }
            other => {
                let mut items = vec![other.take()];
                items.extend(nodes);
                *other = Value::Array(items);
            }
        }
    }

    fn jsonld_nodes(&self) -> Vec<Value> {
        let typed_date = |at: &DateTime<Utc>| {
            json!([{ "@value": timestamp(at), "@type": xsd::DATE_TIME.as_str() }])
        };
        let activity_id = "_:uplift-prov-activity";
        let agent_id = "_:uplift-prov-agent";

        let mut nodes = Vec::new();
        let mut used_refs = Vec::new();
        for (i, file) in self.used.iter().enumerate() {
            let id = file_iri(file)
                .map(NamedNode::into_string)
                .unwrap_or_else(|| format!("_:uplift-prov-used-{i}"));
            used_refs.push(json!({ "@id": id }));
            nodes.push(file_jsonld(&id, file));
        }

        let mut activity = Map::new();
        activity.insert("@id".into(), json!(activity_id));
        activity.insert("@type".into(), json!([format!("{PROV_NS}Activity")]));
        activity.insert(format!("{PROV_NS}startedAtTime"), typed_date(&self.start));
        activity.insert(format!("{PROV_NS}endedAtTime"), typed_date(&self.end()));
        activity.insert(
            format!("{PROV_NS}wasAssociatedWith"),
            json!([{ "@id": agent_id }]),
        );
        if !used_refs.is_empty() {
            activity.insert(format!("{PROV_NS}used"), Value::Array(used_refs));
        }
        nodes.insert(0, Value::Object(activity));
        nodes.insert(
            1,
            json!({
                "@id": agent_id,
                "@type": [format!("{PROV_NS}SoftwareAgent")],
                format!("{RDFS_NS}label"): [{ "@value": AGENT_LABEL }],
            }),
        );

        if let Some(output) = &self.output {
            let id = output.uri.clone().unwrap_or_else(|| SELF_URI.to_string());
            let mut node = file_jsonld(&id, output);
            if let Value::Object(map) = &mut node {
                map.insert(
                    format!("{PROV_NS}wasGeneratedBy"),
                    json!([{ "@id": activity_id }]),
                );
            }
            nodes.push(node);
        }
        nodes
    }
}

/// The file's IRI, or `None` for a missing or malformed one. The
/// self-reference `#` is kept as is and resolves against the output's base.
fn file_iri(file: &FileProvenance) -> Option<NamedNode> {
    match file.uri.as_deref()? {
        SELF_URI => Some(NamedNode::new_unchecked(SELF_URI)),
        uri => NamedNode::new(uri).ok(),
    }
}

fn file_node(file: &FileProvenance) -> NamedOrBlankNode {
    match file_iri(file) {
        Some(iri) => iri.into(),
        None => BlankNode::default().into(),
    }
}

fn describe_file(
    add: &mut impl FnMut(NamedOrBlankNode, NamedNode, Term),
    entity: &NamedOrBlankNode,
    file: &FileProvenance,
) {
    add(entity.clone(), rdf::TYPE.into_owned(), prov("Entity").into());
    add(
        entity.clone(),
        dct("format"),
        Literal::new_simple_literal(&file.media_type).into(),
    );
    if let Some(label) = &file.label {
        add(
            entity.clone(),
            rdfs::LABEL.into_owned(),
            Literal::new_simple_literal(label).into(),
        );
    }
}

fn file_jsonld(id: &str, file: &FileProvenance) -> Value {
    let mut node = Map::new();
    node.insert("@id".into(), json!(id));
    node.insert("@type".into(), json!([format!("{PROV_NS}Entity")]));
    node.insert(
        format!("{DCT_NS}format"),
        json!([{ "@value": file.media_type }]),
    );
    if let Some(label) = &file.label {
        node.insert(format!("{RDFS_NS}label"), json!([{ "@value": label }]));
    }
    Value::Object(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ProvenanceMetadata {
        ProvenanceMetadata::for_uplift(Utc::now(), None, Some("https://example.org/doc.json"))
    }

    #[test]
    fn end_is_frozen_after_first_read() {
        let meta = metadata();
        let first = meta.end();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(meta.end(), first);
        assert!(meta.start() <= first);
    }

    #[test]
    fn graph_output_is_self_referential() {
        let mut meta = metadata();
        meta.set_output(FileProvenance::new(Some(SELF_URI), "text/turtle", None));
        let store = Store::new().unwrap();
        meta.add_to_graph(&store).unwrap();

        let output = NamedNode::new_unchecked(SELF_URI);
        let generated: Vec<_> = store
            .quads_for_pattern(
                Some(output.as_ref().into()),
                Some(prov("wasGeneratedBy").as_ref()),
                None,
                None,
            )
            .collect();
        assert_eq!(generated.len(), 1);

        let used_doc = NamedNode::new("https://example.org/doc.json").unwrap();
        let used: Vec<_> = store
            .quads_for_pattern(None, Some(prov("used").as_ref()), Some(used_doc.as_ref().into()), None)
            .collect();
        assert_eq!(used.len(), 1);
    }

    #[test]
    fn jsonld_nodes_are_appended() {
        let mut meta = metadata();
        meta.set_output(FileProvenance::new(Some(SELF_URI), "application/ld+json", None));
        let mut expanded = json!([{"http://example.org/a": [{"@value": 1}]}]);
        meta.add_to_jsonld(&mut expanded);

        let nodes = expanded.as_array().unwrap();
        assert_eq!(nodes[0], json!({"http://example.org/a": [{"@value": 1}]}));
        assert!(nodes.iter().any(|n| n["@id"] == "#"));
        assert!(nodes.iter().any(|n| n["@id"] == "https://example.org/doc.json"));

        let mut single = json!({"@id": "http://x/1"});
        meta.add_to_jsonld(&mut single);
        assert!(single.is_array());
        assert_eq!(single[0]["@id"], "http://x/1");
    }

    #[test]
    fn malformed_source_urls_become_blank_nodes() {
        let meta = ProvenanceMetadata::for_uplift(Utc::now(), Some("not a uri"), Some("https://example.org/doc.json"));
        let store = Store::new().unwrap();
        meta.add_to_graph(&store).unwrap();

        let used: Vec<_> = store
            .quads_for_pattern(None, Some(prov("used").as_ref()), None, None)
            .map(|q| q.unwrap().object)
            .collect();
        assert_eq!(used.len(), 2);
        assert!(used.iter().any(|o| matches!(o, Term::BlankNode(_))));
        assert!(used.iter().any(|o| matches!(o, Term::NamedNode(n) if n.as_str() == "https://example.org/doc.json")));

        let mut expanded = json!([]);
        meta.add_to_jsonld(&mut expanded);
        let ids: Vec<_> = expanded
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|n| n["@id"].as_str())
            .collect();
        assert!(!ids.contains(&"not a uri"));
        assert!(ids.contains(&"_:uplift-prov-used-0"));
    }

    #[test]
    fn renderings_share_timestamps() {
        let mut meta = metadata();
        meta.set_output(FileProvenance::new(Some(SELF_URI), "text/turtle", None));
        let store = Store::new().unwrap();
        meta.add_to_graph(&store).unwrap();
        meta.set_output(FileProvenance::new(Some(SELF_URI), "application/ld+json", None));
        let mut expanded = json!([]);
        meta.add_to_jsonld(&mut expanded);

        let end = timestamp(&meta.end());
        let ended_literal = Literal::new_typed_literal(end.clone(), xsd::DATE_TIME);
        assert_eq!(
            store
                .quads_for_pattern(None, Some(prov("endedAtTime").as_ref()), Some(ended_literal.as_ref().into()), None)
                .count(),
            1
        );
        let activity = &expanded[0];
        assert_eq!(activity[format!("{PROV_NS}endedAtTime")][0]["@value"], end);
    }
}
