//! Expanded JSON-LD to RDF.

use super::EngineError;
use super::expand::is_absolute_iri;
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{BlankNode, GraphName, Literal, NamedNode, NamedOrBlankNode, Term, Triple};
use oxigraph::store::Store;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// Build a graph from an expanded JSON-LD document.
///
/// Named graphs are merged into the default graph. Statements whose subject,
/// predicate or object is a relative IRI are dropped.
pub fn expanded_to_store(expanded: &Value) -> Result<Store, EngineError> {
    let store = Store::new().map_err(EngineError::storage)?;
    let mut builder = GraphBuilder {
        triples: Vec::new(),
        blank_nodes: HashMap::new(),
    };

    if let Value::Array(nodes) = expanded {
        for node in nodes {
            if let Value::Object(node) = node {
                builder.top_level(node);
            }
        }
    }

    for triple in builder.triples {
        store
            .insert(&triple.in_graph(GraphName::DefaultGraph))
            .map_err(EngineError::storage)?;
    }
    Ok(store)
}

struct GraphBuilder {
    triples: Vec<Triple>,
    blank_nodes: HashMap<String, BlankNode>,
}

impl GraphBuilder {
    fn top_level(&mut self, node: &Map<String, Value>) {
        if node.contains_key("@value") || node.contains_key("@list") {
            return;
        }
        if let Some(Value::Array(graph)) = node.get("@graph") {
            for inner in graph {
                if let Value::Object(inner) = inner {
                    self.top_level(inner);
                }
            }
            let has_statements = node
                .keys()
                .any(|k| k != "@graph" && k != "@id");
            if !has_statements {
                return;
            }
        }
        self.node(node);
    }

    fn blank(&mut self, label: &str) -> BlankNode {
        self.blank_nodes
            .entry(label.to_string())
            .or_default()
            .clone()
    }

    fn resource(&mut self, id: &str) -> Option<NamedOrBlankNode> {
        if let Some(label) = id.strip_prefix("_:") {
            return Some(self.blank(label).into());
        }
        named_node(id).map(Into::into)
    }

    /// Emit the statements of a node object and return its subject.
    fn node(&mut self, node: &Map<String, Value>) -> Option<NamedOrBlankNode> {
        let subject = match node.get("@id") {
            Some(Value::String(id)) => self.resource(id)?,
            _ => BlankNode::default().into(),
        };

        for (key, values) in node {
            let Value::Array(values) = values else {
                continue;
            };
            match key.as_str() {
                "@type" => {
                    for t in values.iter().filter_map(Value::as_str) {
                        let Some(class) = self.resource(t) else {
                            continue;
                        };
                        let object: Term = class.into();
                        self.push(subject.clone(), rdf::TYPE.into_owned(), object);
                    }
                }
                k if k.starts_with('@') => {}
                predicate => {
                    let Some(predicate) = named_node(predicate) else {
                        continue;
                    };
                    for value in values {
                        if let Some(object) = self.object(value) {
                            self.push(subject.clone(), predicate.clone(), object);
                        }
                    }
                }
            }
        }
        Some(subject)
    }

    fn object(&mut self, value: &Value) -> Option<Term> {
        let Value::Object(map) = value else {
            return None;
        };
        if let Some(literal) = map.get("@value") {
            return literal_term(literal, map).map(Term::from);
        }
        if let Some(Value::Array(items)) = map.get("@list") {
            return Some(self.list(items));
        }
        self.node(map).map(Term::from)
    }

    fn list(&mut self, items: &[Value]) -> Term {
        let terms: Vec<Term> = items.iter().filter_map(|item| self.object(item)).collect();
        let mut tail: Term = rdf::NIL.into_owned().into();
        for term in terms.into_iter().rev() {
            let cell = BlankNode::default();
            self.push(cell.clone().into(), rdf::FIRST.into_owned(), term);
            self.push(cell.clone().into(), rdf::REST.into_owned(), tail);
            tail = cell.into();
        }
        tail
    }

    fn push(&mut self, subject: NamedOrBlankNode, predicate: NamedNode, object: Term) {
        self.triples.push(Triple::new(subject, predicate, object));
    }
}

fn named_node(iri: &str) -> Option<NamedNode> {
    if !is_absolute_iri(iri) {
        tracing::debug!(iri, "dropping statement with relative IRI");
        return None;
    }
    NamedNode::new(iri).ok()
}

fn number_lexical(number: &Number, datatype: &str) -> String {
    if datatype == xsd::DOUBLE.as_str() {
        if let Some(f) = number.as_f64() {
            return format!("{f:E}");
        }
    }
    number.to_string()
}

fn literal_term(value: &Value, object: &Map<String, Value>) -> Option<Literal> {
    let datatype = object.get("@type").and_then(Value::as_str);
    let language = object.get("@language").and_then(Value::as_str);

    match value {
        Value::String(s) => match (datatype, language) {
            (Some(dt), _) => Some(Literal::new_typed_literal(s.as_str(), named_node(dt)?)),
            (None, Some(lang)) => Some(
                Literal::new_language_tagged_literal(s.as_str(), lang)
                    .unwrap_or_else(|_| Literal::new_simple_literal(s.as_str())),
            ),
            (None, None) => Some(Literal::new_simple_literal(s.as_str())),
        },
        Value::Bool(b) => {
            let dt = match datatype {
                Some(dt) => named_node(dt)?,
                None => xsd::BOOLEAN.into_owned(),
            };
            Some(Literal::new_typed_literal(b.to_string(), dt))
        }
        Value::Number(n) => {
            let is_integral = n.is_i64()
                || n.is_u64()
                || n.as_f64().is_some_and(|f| f.fract() == 0.0 && f.abs() < 1e21);
            let dt = match datatype {
                Some(dt) => named_node(dt)?,
                None if is_integral => xsd::INTEGER.into_owned(),
                None => xsd::DOUBLE.into_owned(),
            };
            let lexical = if datatype.is_none() && is_integral && !(n.is_i64() || n.is_u64()) {
                n.as_f64().map(|f| format!("{f:.0}")).unwrap_or_else(|| n.to_string())
            } else {
                number_lexical(n, dt.as_str())
            };
            Some(Literal::new_typed_literal(lexical, dt))
        }
        _ => None,
    }
}
