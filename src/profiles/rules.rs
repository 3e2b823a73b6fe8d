//! Entailment rules: SHACL SPARQL rules and plain CONSTRUCT queries.

use super::shacl::Targets;
use crate::rdf::{self, SH_NS};
use anyhow::{Context, Result, bail};
use oxigraph::model::vocab::rdf as rdf_vocab;
use oxigraph::model::{GraphName, NamedNode, NamedOrBlankNode, Term, Triple};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use std::collections::HashSet;

const MAX_ITERATIONS: usize = 8;

fn sh(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{SH_NS}{local}"))
}

#[derive(Debug, Clone)]
struct Rule {
    label: String,
    order: f64,
    query: String,
    /// Shape targets binding `$this`; plain CONSTRUCT rules have none
    targets: Option<Targets>,
}

/// An ordered set of CONSTRUCT rules applied until nothing new is derived.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the `sh:rule` SPARQL rules declared by the shapes in `shapes`.
    pub fn from_shapes(shapes: &Store) -> Result<Self> {
        let mut rules = Vec::new();
        let mut seen = HashSet::new();
        for shape in rdf::subjects(shapes, sh("rule").as_ref(), None)? {
            if !seen.insert(shape.clone()) || is_true(shapes, &shape, "deactivated")? {
                continue;
            }
            let targets = Targets::of_shape(shapes, &shape)?;
            for rule in rdf::objects(shapes, shape.as_ref(), sh("rule").as_ref())? {
                let Some(rule_node) = rdf::as_subject(&rule) else {
                    continue;
                };
                let rule_node = rule_node.into_owned();
                let types = rdf::objects(shapes, rule_node.as_ref(), rdf_vocab::TYPE)?;
                if !types.contains(&sh("SPARQLRule").into()) {
                    tracing::debug!(shape = %shape, rule = %rule_node, "skipping non-SPARQL rule");
                    continue;
                }
                if is_true(shapes, &rule_node, "deactivated")? {
                    continue;
                }
                let Some(construct) = literal(shapes, &rule_node, "construct")? else {
                    tracing::warn!(shape = %shape, rule = %rule_node, "SPARQL rule without sh:construct");
                    continue;
                };
                let order = literal(shapes, &rule_node, "order")?
                    .and_then(|o| o.parse().ok())
                    .unwrap_or(0.0);
                let prefixes = prefix_declarations(shapes, &rule_node)?;
                rules.push(Rule {
                    label: rule_node.to_string(),
                    order,
                    query: format!("{prefixes}{construct}"),
                    targets: Some(targets.clone()),
                });
            }
        }
        rules.sort_by(|a, b| a.order.total_cmp(&b.order));
        Ok(Self { rules })
    }

    /// A rule set made of one CONSTRUCT query.
    pub fn from_construct(label: &str, query: &str) -> Self {
        Self {
            rules: vec![Rule {
                label: label.to_string(),
                order: 0.0,
                query: query.to_string(),
                targets: None,
            }],
        }
    }

    pub fn extend(&mut self, other: RuleSet) {
        self.rules.extend(other.rules);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule to `data` until a fixpoint, adding the derived
    /// triples to its default graph. Returns the number of triples added.
    pub fn apply(&self, data: &Store) -> Result<usize> {
        let mut added = 0;
        for iteration in 0..MAX_ITERATIONS {
            let mut derived = Vec::new();
            for rule in &self.rules {
                derived.extend(rule.derive(data)?);
            }

            let mut new = 0;
            for triple in derived {
                if data.insert(&triple.in_graph(GraphName::DefaultGraph))? {
                    new += 1;
                }
            }
            added += new;
            tracing::debug!(iteration, new, "entailment iteration");
            if new == 0 {
                return Ok(added);
            }
        }
        tracing::warn!(max = MAX_ITERATIONS, "entailment stopped before reaching a fixpoint");
        Ok(added)
    }
}

impl Rule {
    fn derive(&self, data: &Store) -> Result<Vec<Triple>> {
        let Some(targets) = &self.targets else {
            return construct(data, &self.query).with_context(|| format!("rule {} failed", self.label));
        };

        let mut triples = Vec::new();
        for focus in targets.focus_nodes(data)? {
            let Term::NamedNode(node) = &focus else {
                tracing::debug!(rule = %self.label, focus = %focus, "cannot bind $this to a non-IRI node");
                continue;
            };
            let query = bind_this(&self.query, &node.to_string());
            triples.extend(
                construct(data, &query).with_context(|| format!("rule {} failed for {node}", self.label))?,
            );
        }
        Ok(triples)
    }
}

/// Replace the `$this` variable, but not longer names such as `$thisOne`.
fn bind_this(query: &str, iri: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut rest = query;
    while let Some(pos) = rest.find("$this") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + "$this".len()..];
        if after.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            out.push_str("$this");
        } else {
            out.push_str(iri);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

#[allow(deprecated)]
fn construct(data: &Store, query: &str) -> Result<Vec<Triple>> {
    match data.query(query)? {
        QueryResults::Graph(triples) => triples
            .map(|t| t.map_err(anyhow::Error::from))
            .collect(),
        _ => bail!("entailment query is not a CONSTRUCT query"),
    }
}

fn literal(store: &Store, node: &NamedOrBlankNode, local: &str) -> Result<Option<String>> {
    Ok(rdf::objects(store, node.as_ref(), sh(local).as_ref())?
        .into_iter()
        .find_map(|term| match term {
            Term::Literal(literal) => Some(literal.value().to_string()),
            _ => None,
        }))
}

fn is_true(store: &Store, node: &NamedOrBlankNode, local: &str) -> Result<bool> {
    Ok(matches!(literal(store, node, local)?.as_deref(), Some("true" | "1")))
}

/// `PREFIX` lines from the `sh:declare` entries reachable through `sh:prefixes`.
fn prefix_declarations(store: &Store, rule: &NamedOrBlankNode) -> Result<String> {
    let mut out = String::new();
    for owner in rdf::objects(store, rule.as_ref(), sh("prefixes").as_ref())? {
        let Some(owner) = rdf::as_subject(&owner) else {
            continue;
        };
        for declaration in rdf::objects(store, owner, sh("declare").as_ref())? {
            let Some(declaration) = rdf::as_subject(&declaration) else {
                continue;
            };
            let declaration = declaration.into_owned();
            let prefix = literal(store, &declaration, "prefix")?;
            let namespace = rdf::objects(store, declaration.as_ref(), sh("namespace").as_ref())?
                .into_iter()
                .find_map(|term| match term {
                    Term::Literal(l) => Some(l.value().to_string()),
                    Term::NamedNode(n) => Some(n.into_string()),
                    _ => None,
                });
            if let (Some(prefix), Some(namespace)) = (prefix, namespace) {
                out.push_str(&format!("PREFIX {prefix}: <{namespace}>\n"));
            }
        }
    }
    Ok(out)
}
