//! SHACL core validation
//!
//! Validates a data graph against the node shapes found in a shapes graph and
//! produces a [`ValidationReport`] that renders both as text and as an
//! `sh:ValidationReport` graph.
//!
//! # Components
//!
//! - **ShapeDiscovery**: reads node and property shapes from a shapes graph
//! - **ConstraintChecker**: evaluates the constraints of one shape on its value nodes
//! - **ShapeValidator**: resolves targets and runs every shape over a data graph

use crate::rdf::{self, SH_NS};
use anyhow::Result;
use oxigraph::model::vocab::{rdf as rdf_vocab, rdfs, xsd};
use oxigraph::model::*;
use oxigraph::store::Store;
use regex::{Regex, RegexBuilder};
use std::collections::{HashSet, VecDeque};
use std::fmt::Write as _;

fn sh(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{SH_NS}{local}"))
}

// =============================================================================
// Severity Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Violation,
}

impl Severity {
    pub fn from_iri(iri: NamedNodeRef<'_>) -> Self {
        match iri.as_str().strip_prefix(SH_NS) {
            Some("Info") => Severity::Info,
            Some("Warning") => Severity::Warning,
            _ => Severity::Violation,
        }
    }

    pub fn local_name(self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Violation => "Violation",
        }
    }

    pub fn to_iri(self) -> NamedNode {
        sh(self.local_name())
    }
}

// =============================================================================
// Validation Result
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    focus_node: Term,
    result_path: Option<NamedNode>,
    value: Option<Term>,
    message: String,
    severity: Severity,
    source_shape: NamedOrBlankNode,
    /// Constraint component, e.g. `sh:MinCountConstraintComponent`
    source_constraint: NamedNode,
}

impl ValidationResult {
    pub fn focus_node(&self) -> &Term {
        &self.focus_node
    }

    pub fn result_path(&self) -> Option<&NamedNode> {
        self.result_path.as_ref()
    }

    pub fn value(&self) -> Option<&Term> {
        self.value.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn source_shape(&self) -> &NamedOrBlankNode {
        &self.source_shape
    }

    pub fn source_constraint(&self) -> &NamedNode {
        &self.source_constraint
    }
}

// =============================================================================
// Validation Report
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    results: Vec<ValidationResult>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: ValidationResult) {
        self.results.push(result);
    }

    /// A graph conforms when validation produced no results at all.
    pub fn conforms(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    pub fn violation_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.severity == Severity::Violation)
            .count()
    }

    /// Human-readable summary.
    pub fn text(&self) -> String {
        let mut out = String::from("Validation Report\n");
        let _ = writeln!(out, "Conforms: {}", if self.conforms() { "True" } else { "False" });
        if self.conforms() {
            return out;
        }
        let _ = writeln!(out, "Results ({}):", self.results.len());
        for result in &self.results {
            let component = result.source_constraint.as_str();
            let short = component.strip_prefix(SH_NS).unwrap_or(component);
            let _ = writeln!(
                out,
                "Constraint {} in {short} ({component}):",
                result.severity.local_name()
            );
            let _ = writeln!(out, "\tSeverity: sh:{}", result.severity.local_name());
            let _ = writeln!(out, "\tSource Shape: {}", result.source_shape);
            let _ = writeln!(out, "\tFocus Node: {}", result.focus_node);
            if let Some(value) = &result.value {
                let _ = writeln!(out, "\tValue Node: {value}");
            }
            if let Some(path) = &result.result_path {
                let _ = writeln!(out, "\tResult Path: {path}");
            }
            let _ = writeln!(out, "\tMessage: {}", result.message);
        }
        out
    }

    /// The report as an `sh:ValidationReport` graph.
    pub fn to_graph(&self) -> Result<Store> {
        let store = Store::new()?;
        let report = BlankNode::default();
        let report_node: NamedOrBlankNodeRef<'_> = report.as_ref().into();

        insert(&store, report_node, rdf_vocab::TYPE, sh("ValidationReport").as_ref().into())?;
        let conforms = Literal::new_typed_literal(self.conforms().to_string(), xsd::BOOLEAN);
        insert(&store, report_node, sh("conforms").as_ref(), conforms.as_ref().into())?;

        for result in &self.results {
            let node = BlankNode::default();
            let subject: NamedOrBlankNodeRef<'_> = node.as_ref().into();
            insert(&store, report_node, sh("result").as_ref(), node.as_ref().into())?;
            insert(&store, subject, rdf_vocab::TYPE, sh("ValidationResult").as_ref().into())?;
            insert(&store, subject, sh("focusNode").as_ref(), result.focus_node.as_ref())?;
            if let Some(path) = &result.result_path {
                insert(&store, subject, sh("resultPath").as_ref(), path.as_ref().into())?;
            }
            if let Some(value) = &result.value {
                insert(&store, subject, sh("value").as_ref(), value.as_ref())?;
            }
            let severity = result.severity.to_iri();
            insert(&store, subject, sh("resultSeverity").as_ref(), severity.as_ref().into())?;
            insert(&store, subject, sh("sourceShape").as_ref(), result.source_shape.as_ref().into())?;
            insert(
                &store,
                subject,
                sh("sourceConstraintComponent").as_ref(),
                result.source_constraint.as_ref().into(),
            )?;
            let message = Literal::new_simple_literal(&result.message);
            insert(&store, subject, sh("resultMessage").as_ref(), message.as_ref().into())?;
        }
        Ok(store)
    }
}

fn insert(store: &Store, s: NamedOrBlankNodeRef<'_>, p: NamedNodeRef<'_>, o: TermRef<'_>) -> Result<()> {
    store.insert(QuadRef::new(s, p, o, GraphNameRef::DefaultGraph))?;
    Ok(())
}

// =============================================================================
// Shapes
// =============================================================================

#[derive(Debug, Clone, Default)]
struct Constraints {
    datatype: Option<NamedNode>,
    classes: Vec<NamedNode>,
    node_kind: Option<NamedNode>,
    min_count: Option<usize>,
    max_count: Option<usize>,
    pattern: Option<Regex>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min_inclusive: Option<Literal>,
    max_inclusive: Option<Literal>,
    min_exclusive: Option<Literal>,
    max_exclusive: Option<Literal>,
    in_values: Option<Vec<Term>>,
    has_values: Vec<Term>,
    unique_lang: bool,
}

#[derive(Debug, Clone)]
struct Shape {
    id: NamedOrBlankNode,
    /// Set for property shapes
    path: Option<NamedNode>,
    severity: Severity,
    message: Option<String>,
    constraints: Constraints,
    properties: Vec<Shape>,
}

/// Target declarations of a shape.
#[derive(Debug, Clone, Default)]
pub(crate) struct Targets {
    classes: Vec<NamedNode>,
    nodes: Vec<Term>,
    subjects_of: Vec<NamedNode>,
    objects_of: Vec<NamedNode>,
}

impl Targets {
    pub(crate) fn of_shape(shapes: &Store, id: &NamedOrBlankNode) -> Result<Self> {
        ShapeDiscovery::new(shapes).load_targets(id)
    }

    pub(crate) fn focus_nodes(&self, data: &Store) -> Result<Vec<Term>> {
        ConstraintChecker::new(data).focus_nodes(self)
    }
}

#[derive(Debug, Clone)]
struct NodeShape {
    shape: Shape,
    targets: Targets,
}

// =============================================================================
// Shape Discovery
// =============================================================================

pub struct ShapeDiscovery<'a> {
    shapes: &'a Store,
}

impl<'a> ShapeDiscovery<'a> {
    pub fn new(shapes: &'a Store) -> Self {
        Self { shapes }
    }

    fn node_shapes(&self) -> Result<Vec<NodeShape>> {
        let mut candidates = Vec::new();
        let node_shape = sh("NodeShape");
        candidates.extend(rdf::subjects(
            self.shapes,
            rdf_vocab::TYPE,
            Some(node_shape.as_ref().into()),
        )?);
        for target in ["targetClass", "targetNode", "targetSubjectsOf", "targetObjectsOf"] {
            candidates.extend(rdf::subjects(self.shapes, sh(target).as_ref(), None)?);
        }

        let mut seen = HashSet::new();
        let mut shapes = Vec::new();
        for id in candidates {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(shape) = self.load_shape(&id, false, 0)? else {
                continue;
            };
            let targets = self.load_targets(&id)?;
            shapes.push(NodeShape { shape, targets });
        }
        Ok(shapes)
    }

    fn load_targets(&self, id: &NamedOrBlankNode) -> Result<Targets> {
        let mut targets = Targets {
            classes: self.named(id, "targetClass")?,
            nodes: self.objects(id, "targetNode")?,
            subjects_of: self.named(id, "targetSubjectsOf")?,
            objects_of: self.named(id, "targetObjectsOf")?,
        };
        // implicit class target
        if let NamedOrBlankNode::NamedNode(iri) = id {
            let types = rdf::objects(self.shapes, id.as_ref(), rdf_vocab::TYPE)?;
            if types.contains(&rdfs::CLASS.into_owned().into()) {
                targets.classes.push(iri.clone());
            }
        }
        Ok(targets)
    }

    fn load_shape(&self, id: &NamedOrBlankNode, is_property: bool, depth: usize) -> Result<Option<Shape>> {
        if depth > 8 || self.boolean(id, "deactivated")? {
            return Ok(None);
        }

        let path = if is_property {
            match self.objects(id, "path")?.into_iter().next() {
                Some(Term::NamedNode(path)) => Some(path),
                other => {
                    tracing::warn!(shape = %id, path = ?other, "skipping property shape without a predicate path");
                    return Ok(None);
                }
            }
        } else {
            None
        };

        let severity = self
            .named(id, "severity")?
            .first()
            .map(|iri| Severity::from_iri(iri.as_ref()))
            .unwrap_or(Severity::Violation);

        let mut properties = Vec::new();
        for property in self.objects(id, "property")? {
            let Some(property_id) = rdf::as_subject(&property) else {
                continue;
            };
            if let Some(shape) = self.load_shape(&property_id.into_owned(), true, depth + 1)? {
                properties.push(shape);
            }
        }

        Ok(Some(Shape {
            id: id.clone(),
            path,
            severity,
            message: self.text(id, "message")?,
            constraints: self.load_constraints(id)?,
            properties,
        }))
    }

    fn load_constraints(&self, id: &NamedOrBlankNode) -> Result<Constraints> {
        let pattern = match self.text(id, "pattern")? {
            Some(source) => {
                let flags = self.text(id, "flags")?.unwrap_or_default();
                match RegexBuilder::new(&source)
                    .case_insensitive(flags.contains('i'))
                    .multi_line(flags.contains('m'))
                    .dot_matches_new_line(flags.contains('s'))
                    .build()
                {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        tracing::warn!(shape = %id, pattern = %source, error = %e, "ignoring invalid sh:pattern");
                        None
                    }
                }
            }
            None => None,
        };

        let in_values = match self.objects(id, "in")?.into_iter().next() {
            Some(head) => Some(rdf::collection(self.shapes, &head)?),
            None => None,
        };

        Ok(Constraints {
            datatype: self.named(id, "datatype")?.into_iter().next(),
            classes: self.named(id, "class")?,
            node_kind: self.named(id, "nodeKind")?.into_iter().next(),
            min_count: self.integer(id, "minCount")?,
            max_count: self.integer(id, "maxCount")?,
            pattern,
            min_length: self.integer(id, "minLength")?,
            max_length: self.integer(id, "maxLength")?,
            min_inclusive: self.literal(id, "minInclusive")?,
            max_inclusive: self.literal(id, "maxInclusive")?,
            min_exclusive: self.literal(id, "minExclusive")?,
            max_exclusive: self.literal(id, "maxExclusive")?,
            in_values,
            has_values: self.objects(id, "hasValue")?,
            unique_lang: self.boolean(id, "uniqueLang")?,
        })
    }

    fn objects(&self, id: &NamedOrBlankNode, local: &str) -> Result<Vec<Term>> {
        rdf::objects(self.shapes, id.as_ref(), sh(local).as_ref())
    }

    fn named(&self, id: &NamedOrBlankNode, local: &str) -> Result<Vec<NamedNode>> {
        Ok(self
            .objects(id, local)?
            .into_iter()
            .filter_map(|term| match term {
                Term::NamedNode(node) => Some(node),
                _ => None,
            })
            .collect())
    }

    fn literal(&self, id: &NamedOrBlankNode, local: &str) -> Result<Option<Literal>> {
        Ok(self.objects(id, local)?.into_iter().find_map(|term| match term {
            Term::Literal(literal) => Some(literal),
            _ => None,
        }))
    }

    fn text(&self, id: &NamedOrBlankNode, local: &str) -> Result<Option<String>> {
        Ok(self.literal(id, local)?.map(|l| l.value().to_string()))
    }

    fn integer(&self, id: &NamedOrBlankNode, local: &str) -> Result<Option<usize>> {
        Ok(self.text(id, local)?.and_then(|s| s.trim().parse().ok()))
    }

    fn boolean(&self, id: &NamedOrBlankNode, local: &str) -> Result<bool> {
        Ok(matches!(self.text(id, local)?.as_deref(), Some("true" | "1")))
    }
}

// =============================================================================
// Constraint Checker
// =============================================================================

pub struct ConstraintChecker<'a> {
    data: &'a Store,
}

impl<'a> ConstraintChecker<'a> {
    pub fn new(data: &'a Store) -> Self {
        Self { data }
    }

    fn check(&self, shape: &Shape, focus: &Term, values: &[Term], report: &mut ValidationReport) -> Result<()> {
        let c = &shape.constraints;
        let mut fail = |component: &str, value: Option<&Term>, default: String| {
            report.add_result(ValidationResult {
                focus_node: focus.clone(),
                result_path: shape.path.clone(),
                value: value.cloned(),
                message: shape.message.clone().unwrap_or(default),
                severity: shape.severity,
                source_shape: shape.id.clone(),
                source_constraint: sh(&format!("{component}ConstraintComponent")),
            });
        };

        if let Some(min) = c.min_count {
            if values.len() < min {
                fail("MinCount", None, format!("Less than {min} values on {}", describe_path(shape)));
            }
        }
        if let Some(max) = c.max_count {
            if values.len() > max {
                fail("MaxCount", None, format!("More than {max} values on {}", describe_path(shape)));
            }
        }
        for expected in &c.has_values {
            if !values.contains(expected) {
                fail("HasValue", None, format!("Missing expected value {expected}"));
            }
        }
        if c.unique_lang {
            let mut seen = HashSet::new();
            let mut reported = HashSet::new();
            for value in values {
                if let Term::Literal(literal) = value {
                    if let Some(lang) = literal.language() {
                        if !seen.insert(lang.to_ascii_lowercase()) && reported.insert(lang.to_ascii_lowercase()) {
                            fail("UniqueLang", None, format!("Language \"{lang}\" used more than once"));
                        }
                    }
                }
            }
        }

        for value in values {
            if let Some(datatype) = &c.datatype {
                let matches = matches!(value, Term::Literal(l) if l.datatype() == datatype.as_ref());
                if !matches {
                    fail("Datatype", Some(value), format!("Value is not Literal with datatype {datatype}"));
                }
            }
            for class in &c.classes {
                if !self.is_instance(value, class)? {
                    fail("Class", Some(value), format!("Value does not have class {class}"));
                }
            }
            if let Some(kind) = &c.node_kind {
                if !node_kind_matches(value, kind) {
                    fail("NodeKind", Some(value), format!("Value is not of Node Kind {kind}"));
                }
            }
            if let Some(pattern) = &c.pattern {
                let text = lexical(value);
                if text.is_none_or(|t| !pattern.is_match(t)) {
                    fail("Pattern", Some(value), format!("Value does not match pattern \"{}\"", pattern.as_str()));
                }
            }
            if let Some(min) = c.min_length {
                if lexical(value).is_none_or(|t| t.chars().count() < min) {
                    fail("MinLength", Some(value), format!("String length less than {min}"));
                }
            }
            if let Some(max) = c.max_length {
                if lexical(value).is_none_or(|t| t.chars().count() > max) {
                    fail("MaxLength", Some(value), format!("String length greater than {max}"));
                }
            }
            let ranges = [
                (&c.min_inclusive, "MinInclusive", [std::cmp::Ordering::Greater, std::cmp::Ordering::Equal], "<"),
                (&c.max_inclusive, "MaxInclusive", [std::cmp::Ordering::Less, std::cmp::Ordering::Equal], ">"),
                (&c.min_exclusive, "MinExclusive", [std::cmp::Ordering::Greater, std::cmp::Ordering::Greater], "<="),
                (&c.max_exclusive, "MaxExclusive", [std::cmp::Ordering::Less, std::cmp::Ordering::Less], ">="),
            ];
            for (bound, component, accepted, op) in ranges {
                if let Some(bound) = bound {
                    let ok = compare_literal(value, bound).is_some_and(|ord| accepted.contains(&ord));
                    if !ok {
                        fail(component, Some(value), format!("Value {op} {}", bound.value()));
                    }
                }
            }
            if let Some(allowed) = &c.in_values {
                if !allowed.contains(value) {
                    fail("In", Some(value), "Value not in list of allowed values".to_string());
                }
            }
        }
        Ok(())
    }

    fn is_instance(&self, value: &Term, class: &NamedNode) -> Result<bool> {
        let Some(subject) = rdf::as_subject(value) else {
            return Ok(false);
        };
        let mut pending: VecDeque<Term> = rdf::objects(self.data, subject, rdf_vocab::TYPE)?.into();
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop_front() {
            if matches!(&current, Term::NamedNode(n) if n == class) {
                return Ok(true);
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = rdf::as_subject(&current) {
                pending.extend(rdf::objects(self.data, node, rdfs::SUB_CLASS_OF)?);
            }
        }
        Ok(false)
    }

    fn values(&self, focus: &Term, path: &NamedNode) -> Result<Vec<Term>> {
        match rdf::as_subject(focus) {
            Some(subject) => rdf::objects(self.data, subject, path.as_ref()),
            None => Ok(Vec::new()),
        }
    }

    fn instances_of(&self, class: &NamedNode) -> Result<Vec<Term>> {
        let mut classes: Vec<Term> = vec![class.clone().into()];
        let mut index = 0;
        while index < classes.len() {
            let subclasses = rdf::subjects(self.data, rdfs::SUB_CLASS_OF, Some(classes[index].as_ref()))?;
            for subclass in subclasses {
                let term = Term::from(subclass);
                if !classes.contains(&term) {
                    classes.push(term);
                }
            }
            index += 1;
        }

        let mut instances = Vec::new();
        for class in &classes {
            instances.extend(
                rdf::subjects(self.data, rdf_vocab::TYPE, Some(class.as_ref()))?
                    .into_iter()
                    .map(Term::from),
            );
        }
        Ok(instances)
    }

    fn focus_nodes(&self, targets: &Targets) -> Result<Vec<Term>> {
        let mut nodes = Vec::new();
        for class in &targets.classes {
            nodes.extend(self.instances_of(class)?);
        }
        nodes.extend(targets.nodes.iter().cloned());
        for predicate in &targets.subjects_of {
            nodes.extend(
                rdf::subjects(self.data, predicate.as_ref(), None)?
                    .into_iter()
                    .map(Term::from),
            );
        }
        for predicate in &targets.objects_of {
            for quad in self.data.quads_for_pattern(None, Some(predicate.as_ref()), None, Some(GraphNameRef::DefaultGraph)) {
                nodes.push(quad?.object);
            }
        }

        let mut seen = HashSet::new();
        nodes.retain(|node| seen.insert(node.clone()));
        Ok(nodes)
    }
}

fn describe_path(shape: &Shape) -> String {
    match &shape.path {
        Some(path) => path.to_string(),
        None => shape.id.to_string(),
    }
}

fn lexical(term: &Term) -> Option<&str> {
    match term {
        Term::NamedNode(node) => Some(node.as_str()),
        Term::Literal(literal) => Some(literal.value()),
        _ => None,
    }
}

fn node_kind_matches(value: &Term, kind: &NamedNode) -> bool {
    let (iri, blank, literal) = match value {
        Term::NamedNode(_) => (true, false, false),
        Term::BlankNode(_) => (false, true, false),
        Term::Literal(_) => (false, false, true),
        _ => (false, false, false),
    };
    match kind.as_str().strip_prefix(SH_NS) {
        Some("IRI") => iri,
        Some("BlankNode") => blank,
        Some("Literal") => literal,
        Some("BlankNodeOrIRI") => blank || iri,
        Some("BlankNodeOrLiteral") => blank || literal,
        Some("IRIOrLiteral") => iri || literal,
        _ => false,
    }
}

/// Order a value against a range bound; numbers compare numerically, other
/// literals of the bound's datatype lexically.
fn compare_literal(value: &Term, bound: &Literal) -> Option<std::cmp::Ordering> {
    let Term::Literal(value) = value else {
        return None;
    };
    if let (Ok(v), Ok(b)) = (value.value().parse::<f64>(), bound.value().parse::<f64>()) {
        return v.partial_cmp(&b);
    }
    (value.datatype() == bound.datatype()).then(|| value.value().cmp(bound.value()))
}

// =============================================================================
// Shape Validator
// =============================================================================

/// Validator for one shapes graph.
#[derive(Debug, Clone)]
pub struct ShapeValidator {
    shapes: Vec<NodeShape>,
}

impl ShapeValidator {
    pub fn from_store(shapes: &Store) -> Result<Self> {
        let shapes = ShapeDiscovery::new(shapes).node_shapes()?;
        Ok(Self { shapes })
    }

    pub fn from_turtle(turtle: &str) -> Result<Self> {
        let store = rdf::parse_graph(rdf::GraphSyntax::Turtle, turtle.as_bytes(), None)?;
        Self::from_store(&store)
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn validate(&self, data: &Store) -> Result<ValidationReport> {
        let mut report = ValidationReport::new();
        self.validate_into(data, &mut report)?;
        Ok(report)
    }

    /// Append the results of validating `data` to `report`.
    pub fn validate_into(&self, data: &Store, report: &mut ValidationReport) -> Result<()> {
        let checker = ConstraintChecker::new(data);
        for node_shape in &self.shapes {
            for focus in checker.focus_nodes(&node_shape.targets)? {
                validate_shape(&checker, &node_shape.shape, &focus, report)?;
            }
        }
        Ok(())
    }
}

fn validate_shape(checker: &ConstraintChecker<'_>, shape: &Shape, focus: &Term, report: &mut ValidationReport) -> Result<()> {
    let values = match &shape.path {
        Some(path) => checker.values(focus, path)?,
        None => vec![focus.clone()],
    };
    checker.check(shape, focus, &values, report)?;
    for property in &shape.properties {
        for value in &values {
            validate_shape(checker, property, value, report)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPES: &str = r#"
        @prefix sh: <http://www.w3.org/ns/shacl#> .
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
        @prefix ex: <http://example.org/> .

        ex:PersonShape a sh:NodeShape ;
            sh:targetClass ex:Person ;
            sh:property [
                sh:path ex:name ;
                sh:minCount 1 ;
                sh:datatype xsd:string ;
            ] ;
            sh:property [
                sh:path ex:age ;
                sh:maxCount 1 ;
                sh:minInclusive 0 ;
                sh:severity sh:Warning ;
            ] ;
            sh:property [
                sh:path ex:status ;
                sh:in ( "active" "retired" ) ;
                sh:message "Unknown status" ;
            ] .

        ex:Disabled a sh:NodeShape ;
            sh:targetClass ex:Person ;
            sh:deactivated true ;
            sh:property [ sh:path ex:never ; sh:minCount 1 ] .
    "#;

    fn data(turtle: &str) -> Store {
        let prefixed = format!("@prefix ex: <http://example.org/> .\n{turtle}");
        rdf::parse_graph(rdf::GraphSyntax::Turtle, prefixed.as_bytes(), None).unwrap()
    }

    fn components(report: &ValidationReport) -> Vec<String> {
        report
            .results()
            .iter()
            .map(|r| r.source_constraint().as_str().trim_start_matches(SH_NS).to_string())
            .collect()
    }

    #[test]
    fn conforming_graph_has_no_results() {
        let validator = ShapeValidator::from_turtle(SHAPES).unwrap();
        assert_eq!(validator.shape_count(), 1);
        let report = validator
            .validate(&data(r#"ex:alice a ex:Person ; ex:name "Alice" ; ex:age 30 ; ex:status "active" ."#))
            .unwrap();
        assert!(report.conforms(), "{}", report.text());
        assert_eq!(report.text(), "Validation Report\nConforms: True\n");
    }

    #[test]
    fn violations_are_reported_per_component() {
        let validator = ShapeValidator::from_turtle(SHAPES).unwrap();
        let report = validator
            .validate(&data(r#"ex:bob a ex:Person ; ex:age -1, 5 ; ex:status "gone" ."#))
            .unwrap();

        let mut found = components(&report);
        found.sort();
        assert_eq!(
            found,
            vec![
                "InConstraintComponent",
                "MaxCountConstraintComponent",
                "MinCountConstraintComponent",
                "MinInclusiveConstraintComponent",
            ]
        );
        let status = report
            .results()
            .iter()
            .find(|r| r.source_constraint().as_str().ends_with("InConstraintComponent"))
            .unwrap();
        assert_eq!(status.message(), "Unknown status");

        let age = report
            .results()
            .iter()
            .find(|r| r.source_constraint().as_str().ends_with("MaxCountConstraintComponent"))
            .unwrap();
        assert_eq!(age.severity(), Severity::Warning);
        assert_eq!(report.violation_count(), 2);
        assert!(report.text().contains("Conforms: False"));
        assert!(report.text().contains("Results (4):"));
    }

    #[test]
    fn subclass_instances_are_targeted() {
        let validator = ShapeValidator::from_turtle(SHAPES).unwrap();
        let report = validator
            .validate(&data(
                r#"@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
                ex:Employee rdfs:subClassOf ex:Person .
                ex:carol a ex:Employee ."#,
            ))
            .unwrap();
        assert_eq!(components(&report), vec!["MinCountConstraintComponent"]);
    }

    #[test]
    fn node_level_constraints_apply_to_focus() {
        let validator = ShapeValidator::from_turtle(
            r#"@prefix sh: <http://www.w3.org/ns/shacl#> .
            @prefix ex: <http://example.org/> .
            ex:S sh:targetSubjectsOf ex:link ; sh:nodeKind sh:IRI ; sh:class ex:Thing ."#,
        )
        .unwrap();
        let report = validator
            .validate(&data("ex:a ex:link ex:b . _:x ex:link ex:c . _:x a ex:Thing ."))
            .unwrap();
        let mut found = components(&report);
        found.sort();
        assert_eq!(found, vec!["ClassConstraintComponent", "NodeKindConstraintComponent"]);
    }

    #[test]
    fn report_graph_describes_results() {
        let validator = ShapeValidator::from_turtle(SHAPES).unwrap();
        let report = validator.validate(&data("ex:dave a ex:Person .")).unwrap();
        let graph = report.to_graph().unwrap();

        let conforms = rdf::subjects(&graph, sh("conforms").as_ref(), None).unwrap();
        assert_eq!(conforms.len(), 1);
        let results = rdf::objects(&graph, conforms[0].as_ref(), sh("result").as_ref()).unwrap();
        assert_eq!(results.len(), 1);
        let turtle = rdf::to_turtle(&graph).unwrap();
        assert!(turtle.contains("sh:MinCountConstraintComponent"));
    }
}
