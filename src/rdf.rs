//! RDF parsing and Turtle serialization helpers.

use crate::engine::{ExpandOptions, RemoteContexts, expand_document, expanded_to_store};
use anyhow::{Context, Result};
use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::vocab::rdf;
use oxigraph::model::{GraphNameRef, NamedNodeRef, NamedOrBlankNode, NamedOrBlankNodeRef, Term, TermRef};
use oxigraph::store::Store;
use std::collections::HashSet;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
pub const SH_NS: &str = "http://www.w3.org/ns/shacl#";
pub const PROV_NS: &str = "http://www.w3.org/ns/prov#";
pub const DCT_NS: &str = "http://purl.org/dc/terms/";
pub const PROF_NS: &str = "http://www.w3.org/ns/dx/prof/";
pub const SKOS_NS: &str = "http://www.w3.org/2004/02/skos/core#";

const PREFIXES: &[(&str, &str)] = &[
    ("rdf", RDF_NS),
    ("rdfs", RDFS_NS),
    ("xsd", XSD_NS),
    ("sh", SH_NS),
    ("prov", PROV_NS),
    ("dct", DCT_NS),
    ("prof", PROF_NS),
    ("skos", SKOS_NS),
];

/// Serialization formats a graph document can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphSyntax {
    Turtle,
    NTriples,
    RdfXml,
    JsonLd,
}

impl GraphSyntax {
    /// Guess the syntax of `bytes` from their first significant characters.
    pub fn sniff(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if text.starts_with('{') || text.starts_with('[') {
            GraphSyntax::JsonLd
        } else if text.starts_with("<?xml") || text.starts_with("<rdf:RDF") {
            GraphSyntax::RdfXml
        } else {
            GraphSyntax::Turtle
        }
    }

    /// Syntax implied by a file name or URL path.
    pub fn from_extension(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "ttl" => Some(GraphSyntax::Turtle),
            "nt" => Some(GraphSyntax::NTriples),
            "rdf" | "owl" | "xml" => Some(GraphSyntax::RdfXml),
            "jsonld" | "json" => Some(GraphSyntax::JsonLd),
            _ => None,
        }
    }

    fn oxigraph_format(self) -> Option<RdfFormat> {
        match self {
            GraphSyntax::Turtle => Some(RdfFormat::Turtle),
            GraphSyntax::NTriples => Some(RdfFormat::NTriples),
            GraphSyntax::RdfXml => Some(RdfFormat::RdfXml),
            GraphSyntax::JsonLd => None,
        }
    }
}

/// Load Turtle, N-Triples or RDF/XML `bytes` into `store`.
///
/// JSON-LD must go through the engine's expansion instead; it is rejected here.
pub fn load_into(store: &Store, syntax: GraphSyntax, bytes: &[u8], base: Option<&str>) -> Result<()> {
    let format = syntax
        .oxigraph_format()
        .context("JSON-LD documents must be expanded before loading")?;
    let mut parser = RdfParser::from_format(format).without_named_graphs();
    if let Some(base) = base {
        parser = parser
            .with_base_iri(base)
            .with_context(|| format!("invalid base IRI {base}"))?;
    }
    store
        .load_from_reader(parser, bytes)
        .context("failed to parse RDF document")?;
    Ok(())
}

pub fn parse_graph(syntax: GraphSyntax, bytes: &[u8], base: Option<&str>) -> Result<Store> {
    let store = Store::new()?;
    load_into(&store, syntax, bytes, base)?;
    Ok(store)
}

/// Parse a graph document in any supported syntax.
///
/// JSON-LD is expanded by the built-in engine without dereferencing remote
/// contexts.
pub fn parse_any(syntax: GraphSyntax, bytes: &[u8], base: Option<&str>) -> Result<Store> {
    if syntax != GraphSyntax::JsonLd {
        return parse_graph(syntax, bytes, base);
    }
    let document: serde_json::Value =
        serde_json::from_slice(bytes).context("invalid JSON-LD document")?;
    let remote = RemoteContexts::empty();
    let options = ExpandOptions {
        base: base.map(str::to_string),
        remote: &remote,
    };
    let expanded = expand_document(&document, &options)?;
    Ok(expanded_to_store(&expanded)?)
}

/// The term as a statement subject, if it can be one.
pub fn as_subject(term: &Term) -> Option<NamedOrBlankNodeRef<'_>> {
    match term {
        Term::NamedNode(node) => Some(node.as_ref().into()),
        Term::BlankNode(node) => Some(node.as_ref().into()),
        _ => None,
    }
}

/// Objects of `(subject, predicate, ?)` in the default graph, in store order.
pub fn objects(store: &Store, subject: NamedOrBlankNodeRef<'_>, predicate: NamedNodeRef<'_>) -> Result<Vec<Term>> {
    store
        .quads_for_pattern(
            Some(subject),
            Some(predicate),
            None,
            Some(GraphNameRef::DefaultGraph),
        )
        .map(|quad| quad.map(|q| q.object))
        .collect::<Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Subjects of `(?, predicate, object)` in the default graph.
pub fn subjects(store: &Store, predicate: NamedNodeRef<'_>, object: Option<TermRef<'_>>) -> Result<Vec<NamedOrBlankNode>> {
    store
        .quads_for_pattern(None, Some(predicate), object, Some(GraphNameRef::DefaultGraph))
        .map(|quad| quad.map(|q| q.subject))
        .collect::<Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Members of the RDF collection starting at `head`; malformed lists end early.
pub fn collection(store: &Store, head: &Term) -> Result<Vec<Term>> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut current = head.clone();
    while let Some(cell) = as_subject(&current) {
        if current == Term::from(rdf::NIL.into_owned()) || !seen.insert(current.clone()) {
            break;
        }
        if let Some(first) = objects(store, cell, rdf::FIRST)?.into_iter().next() {
            items.push(first);
        }
        match objects(store, cell, rdf::REST)?.into_iter().next() {
            Some(rest) => current = rest,
            None => break,
        }
    }
    Ok(items)
}

/// Copy the default graph of `source` into a new store.
pub fn copy_graph(source: &Store) -> Result<Store> {
    let target = Store::new()?;
    for quad in source.quads_for_pattern(None, None, None, Some(GraphNameRef::DefaultGraph)) {
        target.insert(&quad?)?;
    }
    Ok(target)
}

/// Serialize the default graph as Turtle with the common prefixes declared.
pub fn to_turtle(store: &Store) -> Result<String> {
    let mut serializer = RdfSerializer::from_format(RdfFormat::Turtle);
    for (prefix, namespace) in PREFIXES {
        serializer = serializer.with_prefix(*prefix, *namespace)?;
    }
    let bytes = store
        .dump_graph_to_writer(GraphNameRef::DefaultGraph, serializer, Vec::new())
        .context("failed to serialize graph as Turtle")?;
    String::from_utf8(bytes).context("Turtle output is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{BlankNode, Literal, NamedNode, Quad};

    #[test]
    fn sniffs_syntaxes() {
        assert_eq!(GraphSyntax::sniff(b"  {\"@id\": 1}"), GraphSyntax::JsonLd);
        assert_eq!(GraphSyntax::sniff(b"<?xml version=\"1.0\"?>"), GraphSyntax::RdfXml);
        assert_eq!(GraphSyntax::sniff(b"@prefix ex: <http://x/> ."), GraphSyntax::Turtle);
        assert_eq!(GraphSyntax::from_extension("shapes.TTL"), Some(GraphSyntax::Turtle));
        assert_eq!(GraphSyntax::from_extension("rules.rq"), None);
    }

    #[test]
    fn turtle_round_trip_keeps_triples() {
        let store = Store::new().unwrap();
        let s = NamedNode::new("http://example.org/s").unwrap();
        let b = BlankNode::default();
        store
            .insert(&Quad::new(
                s.clone(),
                NamedNode::new("http://example.org/p").unwrap(),
                b.clone(),
                GraphNameRef::DefaultGraph,
            ))
            .unwrap();
        store
            .insert(&Quad::new(
                b,
                NamedNode::new("http://www.w3.org/2000/01/rdf-schema#label").unwrap(),
                Literal::new_language_tagged_literal("hello", "en").unwrap(),
                GraphNameRef::DefaultGraph,
            ))
            .unwrap();

        let turtle = to_turtle(&store).unwrap();
        assert!(turtle.contains("@prefix rdfs:"));

        let reparsed = parse_graph(GraphSyntax::Turtle, turtle.as_bytes(), None).unwrap();
        assert_eq!(reparsed.len().unwrap(), 2);
        let subjects: Vec<_> = reparsed
            .quads_for_pattern(Some(s.as_ref().into()), None, None, None)
            .collect();
        assert_eq!(subjects.len(), 1);
    }

    #[test]
    fn json_ld_goes_through_expansion() {
        let doc = br#"{"@context": {"@vocab": "http://example.org/"}, "@id": "http://example.org/s", "name": "x"}"#;
        let store = parse_any(GraphSyntax::sniff(doc), doc, None).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(parse_any(GraphSyntax::JsonLd, b"{not json", None).is_err());
    }

    #[test]
    fn collections_are_read_in_order() {
        let store = parse_graph(
            GraphSyntax::Turtle,
            b"<http://x/s> <http://x/p> ( 1 2 3 ) .",
            None,
        )
        .unwrap();
        let head = objects(
            &store,
            NamedNode::new("http://x/s").unwrap().as_ref().into(),
            NamedNode::new("http://x/p").unwrap().as_ref(),
        )
        .unwrap();
        let items: Vec<String> = collection(&store, &head[0])
            .unwrap()
            .into_iter()
            .map(|t| match t {
                Term::Literal(l) => l.value().to_string(),
                other => other.to_string(),
            })
            .collect();
        assert_eq!(items, vec!["1", "2", "3"]);
    }

    #[test]
    fn rejects_invalid_turtle() {
        assert!(parse_graph(GraphSyntax::Turtle, b"this is not turtle", None).is_err());
    }
}
