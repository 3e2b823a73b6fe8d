//! JSON-LD context processing and expansion.
//!
//! Covers the parts of JSON-LD 1.0 expansion used by uplift contexts plus
//! term-scoped contexts: term and prefix definitions, `@vocab`, `@base`,
//! default language, type coercion, `@list`/`@set`/`@language` containers,
//! keyword aliases and embedded or remote contexts. Properties that do not
//! expand to an absolute IRI are dropped.

use super::{EngineError, RemoteContexts};
use reqwest::Url;
use serde_json::{Map, Value};
use std::collections::HashMap;

const MAX_CONTEXT_DEPTH: usize = 16;

const KEYWORDS: &[&str] = &[
    "@base",
    "@container",
    "@context",
    "@direction",
    "@graph",
    "@id",
    "@import",
    "@included",
    "@index",
    "@json",
    "@language",
    "@list",
    "@nest",
    "@none",
    "@prefix",
    "@propagate",
    "@protected",
    "@reverse",
    "@set",
    "@type",
    "@value",
    "@version",
    "@vocab",
];

pub fn is_keyword(value: &str) -> bool {
    KEYWORDS.contains(&value)
}

/// True for IRIs with a scheme and for blank node identifiers.
pub fn is_absolute_iri(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn resolve_iri(base: Option<&str>, value: &str) -> String {
    match base.and_then(|b| Url::parse(b).ok()) {
        Some(base) => base
            .join(value)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| value.to_string()),
        None => value.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    List,
    Set,
    Language,
    Index,
}

#[derive(Debug, Clone)]
struct TermDefinition {
    /// `None` when the term is explicitly mapped to null
    iri: Option<String>,
    type_mapping: Option<String>,
    container: Option<Container>,
    /// `Some(None)` when the term resets the default language
    language: Option<Option<String>>,
    scoped_context: Option<Value>,
}

impl TermDefinition {
    fn null() -> Self {
        Self {
            iri: None,
            type_mapping: None,
            container: None,
            language: None,
            scoped_context: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ActiveContext {
    base: Option<String>,
    original_base: Option<String>,
    vocab: Option<String>,
    language: Option<String>,
    terms: HashMap<String, TermDefinition>,
}

pub struct ExpandOptions<'a> {
    pub base: Option<String>,
    pub remote: &'a RemoteContexts,
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::InvalidJsonLd(message.into())
}

/// Expand `document` into a JSON-LD expanded array.
pub fn expand_document(document: &Value, options: &ExpandOptions<'_>) -> Result<Value, EngineError> {
    let active = ActiveContext {
        base: options.base.clone(),
        original_base: options.base.clone(),
        ..Default::default()
    };
    let expander = Expander {
        remote: options.remote,
    };

    let expanded = expander.expand(&active, None, document)?;
    let expanded = match expanded {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("@graph") => {
            map.remove("@graph").unwrap_or(Value::Null)
        }
        other => other,
    };
    Ok(match expanded {
        Value::Null => Value::Array(Vec::new()),
        Value::Array(items) => Value::Array(items),
        other => Value::Array(vec![other]),
    })
}

struct Expander<'a> {
    remote: &'a RemoteContexts,
}

impl Expander<'_> {
    fn process_context(
        &self,
        active: &ActiveContext,
        local: &Value,
        depth: usize,
    ) -> Result<ActiveContext, EngineError> {
        if depth > MAX_CONTEXT_DEPTH {
            return Err(invalid("Context nesting too deep, possible recursive inclusion"));
        }
        let mut result = active.clone();
        let items: Vec<&Value> = match local {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        for item in items {
            match item {
                Value::Null => {
                    result = ActiveContext {
                        base: active.original_base.clone(),
                        original_base: active.original_base.clone(),
                        ..Default::default()
                    };
                }
                Value::String(url) => {
                    let context = self.remote.get(url).ok_or_else(|| {
                        invalid(format!("Remote context {url} was not loaded"))
                    })?;
                    result = self.process_context(&result, context, depth + 1)?;
                }
                Value::Object(definition) => {
                    self.apply_definition(&mut result, definition)?;
                }
                other => return Err(invalid(format!("Invalid local context: {other}"))),
            }
        }
        Ok(result)
    }

    fn apply_definition(
        &self,
        result: &mut ActiveContext,
        definition: &Map<String, Value>,
    ) -> Result<(), EngineError> {
        match definition.get("@base") {
            Some(Value::Null) => result.base = None,
            Some(Value::String(base)) => {
                result.base = Some(if is_absolute_iri(base) {
                    base.clone()
                } else {
                    resolve_iri(result.base.as_deref(), base)
                })
            }
            Some(other) => return Err(invalid(format!("Invalid @base value {other}"))),
            None => {}
        }

        match definition.get("@vocab") {
            Some(Value::Null) => result.vocab = None,
            Some(Value::String(vocab)) => {
                let expanded = expand_iri(result, vocab, true, true);
                result.vocab = expanded.filter(|v| is_absolute_iri(v));
                if result.vocab.is_none() {
                    return Err(invalid(format!("Invalid @vocab mapping {vocab}")));
                }
            }
            Some(other) => return Err(invalid(format!("Invalid @vocab value {other}"))),
            None => {}
        }

        match definition.get("@language") {
            Some(Value::Null) => result.language = None,
            Some(Value::String(language)) => result.language = Some(language.to_lowercase()),
            Some(other) => return Err(invalid(format!("Invalid @language value {other}"))),
            None => {}
        }

        let mut defined = HashMap::new();
        for term in definition.keys() {
            if matches!(
                term.as_str(),
                "@base" | "@vocab" | "@language" | "@version" | "@protected" | "@propagate"
                    | "@import" | "@direction" | "@type"
            ) {
                continue;
            }
            self.create_term_definition(result, definition, term, &mut defined)?;
        }
        Ok(())
    }

    fn create_term_definition(
        &self,
        active: &mut ActiveContext,
        local: &Map<String, Value>,
        term: &str,
        defined: &mut HashMap<String, bool>,
    ) -> Result<(), EngineError> {
        match defined.get(term) {
            Some(true) => return Ok(()),
            Some(false) => return Err(invalid(format!("Cyclic IRI mapping for term {term}"))),
            None => {}
        }
        defined.insert(term.to_string(), false);

        if is_keyword(term) {
            return Err(invalid(format!("Keyword {term} cannot be redefined")));
        }

        let value = local.get(term).cloned().unwrap_or(Value::Null);
        active.terms.remove(term);

        let definition: Map<String, Value> = match value {
            Value::Null => Map::from_iter([("@id".to_string(), Value::Null)]),
            Value::String(id) => Map::from_iter([("@id".to_string(), Value::String(id))]),
            Value::Object(map) => map,
            other => return Err(invalid(format!("Invalid definition for term {term}: {other}"))),
        };

        let mut term_def = TermDefinition::null();

        if definition.contains_key("@reverse") {
            tracing::debug!(term, "reverse properties are not supported, term ignored");
            active.terms.insert(term.to_string(), term_def);
            defined.insert(term.to_string(), true);
            return Ok(());
        }

        match definition.get("@id") {
            Some(Value::Null) => {
                active.terms.insert(term.to_string(), term_def);
                defined.insert(term.to_string(), true);
                return Ok(());
            }
            Some(Value::String(id)) if id != term => {
                self.define_dependencies(active, local, id, defined)?;
                let iri = expand_iri(active, id, false, true)
                    .ok_or_else(|| invalid(format!("Invalid IRI mapping for term {term}")))?;
                if !is_keyword(&iri) && !is_absolute_iri(&iri) {
                    return Err(invalid(format!("Invalid IRI mapping for term {term}: {iri}")));
                }
                term_def.iri = Some(iri);
            }
            Some(Value::String(_)) | None => {
                term_def.iri = Some(self.implicit_iri(active, local, term, defined)?);
            }
            Some(other) => {
                return Err(invalid(format!("Invalid @id for term {term}: {other}")));
            }
        }

        match definition.get("@type") {
            Some(Value::String(t)) => {
                let mapping = if t == "@id" || t == "@vocab" {
                    t.clone()
                } else {
                    self.define_dependencies(active, local, t, defined)?;
                    let iri = expand_iri(active, t, false, true)
                        .filter(|iri| is_absolute_iri(iri))
                        .ok_or_else(|| invalid(format!("Invalid type mapping for term {term}")))?;
                    iri
                };
                term_def.type_mapping = Some(mapping);
            }
            Some(Value::Null) | None => {}
            Some(other) => return Err(invalid(format!("Invalid @type for term {term}: {other}"))),
        }

        term_def.container = match definition.get("@container") {
            Some(Value::String(c)) => parse_container(c),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(parse_container)
                .find(|c| *c != Container::Set)
                .or(Some(Container::Set)),
            _ => None,
        };

        match definition.get("@language") {
            Some(Value::String(language)) => term_def.language = Some(Some(language.to_lowercase())),
            Some(Value::Null) => term_def.language = Some(None),
            _ => {}
        }

        term_def.scoped_context = definition.get("@context").cloned();

        active.terms.insert(term.to_string(), term_def);
        defined.insert(term.to_string(), true);
        Ok(())
    }

    /// Define, within the same local context, the term or prefix `value` refers to.
    fn define_dependencies(
        &self,
        active: &mut ActiveContext,
        local: &Map<String, Value>,
        value: &str,
        defined: &mut HashMap<String, bool>,
    ) -> Result<(), EngineError> {
        if local.contains_key(value) && !is_keyword(value) {
            self.create_term_definition(active, local, value, defined)?;
        } else if let Some((prefix, suffix)) = value.split_once(':') {
            if !suffix.starts_with("//") && local.contains_key(prefix) {
                self.create_term_definition(active, local, prefix, defined)?;
            }
        }
        Ok(())
    }

    fn implicit_iri(
        &self,
        active: &mut ActiveContext,
        local: &Map<String, Value>,
        term: &str,
        defined: &mut HashMap<String, bool>,
    ) -> Result<String, EngineError> {
        if let Some((prefix, suffix)) = term.split_once(':') {
            if prefix != "_" && !suffix.starts_with("//") && local.contains_key(prefix) {
                self.create_term_definition(active, local, prefix, defined)?;
            }
            if let Some(iri) = active.terms.get(prefix).and_then(|d| d.iri.as_ref()) {
                return Ok(format!("{iri}{suffix}"));
            }
            return Ok(term.to_string());
        }
        match &active.vocab {
            Some(vocab) => Ok(format!("{vocab}{term}")),
            None => Err(invalid(format!(
                "Term {term} has no IRI mapping and no @vocab is set"
            ))),
        }
    }

    fn expand(
        &self,
        active: &ActiveContext,
        property: Option<&str>,
        element: &Value,
    ) -> Result<Value, EngineError> {
        match element {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.expand(active, property, item)? {
                        Value::Null => {}
                        Value::Array(nested) => out.extend(nested),
                        other => out.push(other),
                    }
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => self.expand_object(active, property, map),
            scalar => {
                if matches!(property, None | Some("@graph")) {
                    return Ok(Value::Null);
                }
                Ok(expand_value(active, property, scalar))
            }
        }
    }

    fn expand_object(
        &self,
        active: &ActiveContext,
        property: Option<&str>,
        map: &Map<String, Value>,
    ) -> Result<Value, EngineError> {
        let local_active;
        let active = match map.get("@context") {
            Some(context) => {
                local_active = self.process_context(active, context, 0)?;
                &local_active
            }
            None => active,
        };

        let mut result = Map::new();
        for (key, value) in map {
            if key == "@context" {
                continue;
            }
            let Some(expanded_property) = expand_iri(active, key, false, true) else {
                continue;
            };

            if is_keyword(&expanded_property) {
                self.expand_keyword(active, property, &expanded_property, value, &mut result)?;
                continue;
            }
            if !is_absolute_iri(&expanded_property) || expanded_property.starts_with("_:") {
                continue;
            }

            let definition = active.terms.get(key);
            let scoped;
            let value_active = match definition.and_then(|d| d.scoped_context.as_ref()) {
                Some(context) => {
                    scoped = self.process_context(active, context, 0)?;
                    &scoped
                }
                None => active,
            };
            let container = definition.and_then(|d| d.container);

            let expanded_value = match (container, value) {
                (Some(Container::Language), Value::Object(languages)) => {
                    expand_language_map(languages)?
                }
                (Some(Container::Index), Value::Object(indexed)) => {
                    let mut items = Vec::new();
                    for item in indexed.values() {
                        match self.expand(value_active, Some(key), item)? {
                            Value::Null => {}
                            Value::Array(nested) => items.extend(nested),
                            other => items.push(other),
                        }
                    }
                    Value::Array(items)
                }
                _ => self.expand(value_active, Some(key), value)?,
            };
            if expanded_value.is_null() {
                continue;
            }

            let expanded_value = if container == Some(Container::List) && !is_list_object(&expanded_value) {
                let items = match expanded_value {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                Value::Object(Map::from_iter([("@list".to_string(), Value::Array(items))]))
            } else {
                expanded_value
            };

            append_values(&mut result, &expanded_property, expanded_value);
        }

        self.finish_object(property, result)
    }

    fn expand_keyword(
        &self,
        active: &ActiveContext,
        property: Option<&str>,
        keyword: &str,
        value: &Value,
        result: &mut Map<String, Value>,
    ) -> Result<(), EngineError> {
        match keyword {
            "@id" => {
                let Value::String(id) = value else {
                    return Err(invalid(format!("Invalid @id value {value}")));
                };
                let iri = expand_iri(active, id, true, false).unwrap_or_else(|| id.clone());
                result.insert("@id".into(), Value::String(iri));
            }
            "@type" => {
                let types: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                let mut expanded = match result.remove("@type") {
                    Some(Value::Array(existing)) => existing,
                    _ => Vec::new(),
                };
                for t in types {
                    let Value::String(t) = t else {
                        return Err(invalid(format!("Invalid @type value {t}")));
                    };
                    if let Some(iri) = expand_iri(active, t, true, true) {
                        expanded.push(Value::String(iri));
                    }
                }
                result.insert("@type".into(), Value::Array(expanded));
            }
            "@graph" => {
                let graph = match self.expand(active, Some("@graph"), value)? {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                result.insert("@graph".into(), Value::Array(graph));
            }
            "@value" => match value {
                Value::Object(_) | Value::Array(_) => {
                    return Err(invalid(format!("Invalid @value {value}")));
                }
                scalar => {
                    result.insert("@value".into(), scalar.clone());
                }
            },
            "@language" => {
                let Value::String(language) = value else {
                    return Err(invalid(format!("Invalid @language {value}")));
                };
                result.insert("@language".into(), Value::String(language.to_lowercase()));
            }
            "@index" => {
                if let Value::String(index) = value {
                    result.insert("@index".into(), Value::String(index.clone()));
                }
            }
            "@list" => {
                if matches!(property, None | Some("@graph")) {
                    return Ok(());
                }
                let items = match self.expand(active, property, value)? {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                result.insert("@list".into(), Value::Array(items));
            }
            "@set" => {
                let items = self.expand(active, property, value)?;
                result.insert("@set".into(), items);
            }
            other => {
                tracing::debug!(keyword = other, "keyword not supported during expansion, ignored");
            }
        }
        Ok(())
    }

    fn finish_object(
        &self,
        property: Option<&str>,
        mut result: Map<String, Value>,
    ) -> Result<Value, EngineError> {
        if result.contains_key("@value") {
            if result.get("@value").is_some_and(Value::is_null) {
                return Ok(Value::Null);
            }
            if let Some(Value::Array(mut types)) = result.remove("@type") {
                if types.len() > 1 {
                    return Err(invalid("A value object can only have one @type"));
                }
                if let Some(t) = types.pop() {
                    result.insert("@type".into(), t);
                }
            }
            if result.contains_key("@type") && result.contains_key("@language") {
                return Err(invalid("A value object cannot have both @type and @language"));
            }
            return Ok(Value::Object(result));
        }

        if let Some(set) = result.remove("@set") {
            return Ok(set);
        }

        if result.len() == 1 && result.contains_key("@language") {
            return Ok(Value::Null);
        }

        if matches!(property, None | Some("@graph")) {
            let only_id = result.len() == 1 && result.contains_key("@id");
            if result.is_empty() || only_id || result.contains_key("@list") {
                return Ok(Value::Null);
            }
        }

        Ok(Value::Object(result))
    }
}

fn parse_container(value: &str) -> Option<Container> {
    match value {
        "@list" => Some(Container::List),
        "@set" => Some(Container::Set),
        "@language" => Some(Container::Language),
        "@index" => Some(Container::Index),
        _ => None,
    }
}

fn is_list_object(value: &Value) -> bool {
    value.as_object().is_some_and(|m| m.contains_key("@list"))
}

fn append_values(result: &mut Map<String, Value>, property: &str, value: Value) {
    let entry = result
        .entry(property.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(existing) = entry {
        match value {
            Value::Array(items) => existing.extend(items),
            other => existing.push(other),
        }
    }
}

fn expand_language_map(languages: &Map<String, Value>) -> Result<Value, EngineError> {
    let mut out = Vec::new();
    for (language, values) in languages {
        let values: Vec<&Value> = match values {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for value in values {
            match value {
                Value::Null => {}
                Value::String(s) => {
                    let mut object = Map::new();
                    object.insert("@value".into(), Value::String(s.clone()));
                    if language != "@none" {
                        object.insert("@language".into(), Value::String(language.to_lowercase()));
                    }
                    out.push(Value::Object(object));
                }
                other => {
                    return Err(invalid(format!("Invalid language map value {other}")));
                }
            }
        }
    }
    Ok(Value::Array(out))
}

/// Expand a term, compact IRI or relative IRI.
///
/// `document_relative` resolves against the base IRI; `vocab` allows term and
/// `@vocab` resolution. Returns `None` for terms mapped to null.
fn expand_iri(active: &ActiveContext, value: &str, document_relative: bool, vocab: bool) -> Option<String> {
    if is_keyword(value) {
        return Some(value.to_string());
    }
    if vocab {
        if let Some(definition) = active.terms.get(value) {
            return definition.iri.clone();
        }
    }
    if let Some((prefix, suffix)) = value.split_once(':') {
        if prefix == "_" || suffix.starts_with("//") {
            return Some(value.to_string());
        }
        if let Some(iri) = active.terms.get(prefix).and_then(|d| d.iri.as_ref()) {
            return Some(format!("{iri}{suffix}"));
        }
        if is_absolute_iri(value) {
            return Some(value.to_string());
        }
    }
    if vocab {
        if let Some(vocab) = &active.vocab {
            return Some(format!("{vocab}{value}"));
        }
    }
    if document_relative {
        return Some(resolve_iri(active.base.as_deref(), value));
    }
    Some(value.to_string())
}

fn expand_value(active: &ActiveContext, property: Option<&str>, value: &Value) -> Value {
    let definition = property.and_then(|p| active.terms.get(p));
    let type_mapping = definition.and_then(|d| d.type_mapping.as_deref());

    if let Value::String(s) = value {
        match type_mapping {
            Some("@id") => {
                let iri = expand_iri(active, s, true, false).unwrap_or_else(|| s.clone());
                return Value::Object(Map::from_iter([("@id".to_string(), Value::String(iri))]));
            }
            Some("@vocab") => {
                let iri = expand_iri(active, s, true, true).unwrap_or_else(|| s.clone());
                return Value::Object(Map::from_iter([("@id".to_string(), Value::String(iri))]));
            }
            _ => {}
        }
    }

    let mut result = Map::new();
    result.insert("@value".into(), value.clone());
    match type_mapping {
        Some(datatype) if datatype != "@id" && datatype != "@vocab" => {
            result.insert("@type".into(), Value::String(datatype.to_string()));
        }
        _ if value.is_string() => {
            let language = match definition.and_then(|d| d.language.as_ref()) {
                Some(explicit) => explicit.clone(),
                None => active.language.clone(),
            };
            if let Some(language) = language {
                result.insert("@language".into(), Value::String(language));
            }
        }
        _ => {}
    }
    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expand(document: Value) -> Value {
        let remote = RemoteContexts::empty();
        expand_document(&document, &ExpandOptions { base: None, remote: &remote }).unwrap()
    }

    #[test]
    fn expands_terms_and_drops_unmapped_keys() {
        let out = expand(json!({
            "@context": {"a": "http://example.org/a"},
            "a": 1,
            "unmapped": "x"
        }));
        assert_eq!(out, json!([{"http://example.org/a": [{"@value": 1}]}]));
    }

    #[test]
    fn compact_iris_vocab_and_coercion() {
        let out = expand(json!({
            "@context": {
                "@vocab": "http://example.org/vocab#",
                "ex": "http://example.org/",
                "knows": {"@id": "ex:knows", "@type": "@id"},
                "born": {"@id": "ex:born", "@type": "xsd:date"},
                "xsd": "http://www.w3.org/2001/XMLSchema#"
            },
            "@id": "ex:alice",
            "@type": "Person",
            "knows": "ex:bob",
            "born": "2000-01-01",
            "name": "Alice"
        }));
        let node = &out[0];
        assert_eq!(node["@id"], "http://example.org/alice");
        assert_eq!(node["@type"], json!(["http://example.org/vocab#Person"]));
        assert_eq!(node["http://example.org/knows"], json!([{"@id": "http://example.org/bob"}]));
        assert_eq!(
            node["http://example.org/born"],
            json!([{"@value": "2000-01-01", "@type": "http://www.w3.org/2001/XMLSchema#date"}])
        );
        assert_eq!(node["http://example.org/vocab#name"], json!([{"@value": "Alice"}]));
    }

    #[test]
    fn base_resolves_relative_ids() {
        let remote = RemoteContexts::empty();
        let out = expand_document(
            &json!({"@context": {"p": {"@id": "http://example.org/p", "@type": "@id"}}, "@id": "item/1", "p": "../other"}),
            &ExpandOptions { base: Some("https://data.example.org/things/".into()), remote: &remote },
        )
        .unwrap();
        assert_eq!(out[0]["@id"], "https://data.example.org/things/item/1");
        assert_eq!(out[0]["http://example.org/p"], json!([{"@id": "https://data.example.org/other"}]));
    }

    #[test]
    fn containers_and_language() {
        let out = expand(json!({
            "@context": {
                "@language": "EN",
                "label": {"@id": "http://example.org/label", "@container": "@language"},
                "items": {"@id": "http://example.org/items", "@container": "@list"},
                "code": {"@id": "http://example.org/code", "@language": null},
                "title": "http://example.org/title"
            },
            "label": {"en": "Hello", "fr": ["Bonjour"]},
            "items": [1, 2],
            "code": "x1",
            "title": "T"
        }));
        let node = &out[0];
        assert_eq!(
            node["http://example.org/label"],
            json!([{"@value": "Hello", "@language": "en"}, {"@value": "Bonjour", "@language": "fr"}])
        );
        assert_eq!(node["http://example.org/items"], json!([{"@list": [{"@value": 1}, {"@value": 2}]}]));
        assert_eq!(node["http://example.org/code"], json!([{"@value": "x1"}]));
        assert_eq!(node["http://example.org/title"], json!([{"@value": "T", "@language": "en"}]));
    }

    #[test]
    fn keyword_aliases_and_scoped_contexts() {
        let out = expand(json!({
            "@context": {
                "id": "@id",
                "type": "@type",
                "geometry": {"@id": "http://example.org/geometry", "@context": {"@vocab": "http://geo.example/"}}
            },
            "id": "http://example.org/f1",
            "type": "http://example.org/Feature",
            "geometry": {"kind": "Point"}
        }));
        let node = &out[0];
        assert_eq!(node["@id"], "http://example.org/f1");
        assert_eq!(node["@type"], json!(["http://example.org/Feature"]));
        assert_eq!(
            node["http://example.org/geometry"],
            json!([{"http://geo.example/kind": [{"@value": "Point"}]}])
        );
    }

    #[test]
    fn top_level_id_only_nodes_are_dropped() {
        let out = expand(json!({"@context": {}, "@graph": [{"@id": "http://x/1"}, {"@id": "http://x/2", "http://x/p": 1}]}));
        assert_eq!(out, json!([{"@id": "http://x/2", "http://x/p": [{"@value": 1}]}]));
    }

    #[test]
    fn remote_contexts_are_resolved_from_the_loaded_set() {
        let mut remote = RemoteContexts::empty();
        remote.insert("https://ctx.example/c.jsonld", json!({"name": "http://schema.org/name"}));
        let out = expand_document(
            &json!({"@context": "https://ctx.example/c.jsonld", "name": "x"}),
            &ExpandOptions { base: None, remote: &remote },
        )
        .unwrap();
        assert_eq!(out[0]["http://schema.org/name"], json!([{"@value": "x"}]));
    }

    #[test]
    fn cyclic_definitions_are_rejected() {
        let remote = RemoteContexts::empty();
        let err = expand_document(
            &json!({"@context": {"a": "b:x", "b": "a:y"}, "a": 1}),
            &ExpandOptions { base: None, remote: &remote },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidJsonLd(_)));
    }
}
