//! Uplift context definitions.
//!
//! A definition is a YAML (or JSON) mapping:
//!
//! ```yaml
//! base-uri: https://example.org/items/
//! context:
//!   $:
//!     name: http://schema.org/name
//!   $.features[*]:
//!     "@vocab": https://example.org/ns#
//! types:
//!   $.features[*]: Feature
//! ```
//!
//! `context` may also be a plain JSON-LD context, which is then applied at the root.

use super::ValidationError;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Each,
}

/// Path into a JSON document: `$`, `$.a.b`, `$.items[*]`, `$[*].c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSelector {
    source: String,
    segments: Vec<Segment>,
}

impl PathSelector {
    pub fn parse(source: &str) -> Option<Self> {
        let rest = source.trim().strip_prefix('$')?;
        let mut segments = Vec::new();
        let mut chars = rest.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let mut key = String::new();
                    while let Some(&next) = chars.peek() {
                        if next == '.' || next == '[' {
                            break;
                        }
                        key.push(next);
                        chars.next();
                    }
                    if key.is_empty() {
                        return None;
                    }
                    segments.push(Segment::Key(key));
                }
                '[' => {
                    let inner: String = chars.by_ref().take_while(|&c| c != ']').collect();
                    match inner.trim() {
                        "*" => segments.push(Segment::Each),
                        quoted => {
                            let key = ['\'', '"'].into_iter().find_map(|q| {
                                quoted.strip_prefix(q)?.strip_suffix(q)
                            })?;
                            segments.push(Segment::Key(key.to_string()));
                        }
                    }
                }
                _ => return None,
            }
        }

        Some(Self {
            source: source.trim().to_string(),
            segments,
        })
    }

    pub fn root() -> Self {
        Self {
            source: "$".to_string(),
            segments: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Call `f` on every object the selector reaches. A selected array
    /// applies `f` to each of its object elements.
    pub fn for_each_object(&self, document: &mut Value, f: &mut dyn FnMut(&mut Map<String, Value>)) {
        visit(document, &self.segments, f);
    }
}

fn visit(value: &mut Value, segments: &[Segment], f: &mut dyn FnMut(&mut Map<String, Value>)) {
    let Some((first, rest)) = segments.split_first() else {
        match value {
            Value::Object(map) => f(map),
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(map) = item {
                        f(map);
                    }
                }
            }
            _ => {}
        }
        return;
    };

    match (first, value) {
        (Segment::Key(key), Value::Object(map)) => {
            if let Some(child) = map.get_mut(key) {
                visit(child, rest, f);
            }
        }
        (Segment::Each, Value::Array(items)) => {
            for item in items {
                visit(item, rest, f);
            }
        }
        (Segment::Each, Value::Object(map)) => {
            for (_, child) in map.iter_mut() {
                visit(child, rest, f);
            }
        }
        _ => {}
    }
}

impl fmt::Display for PathSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A validated context definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpliftContext {
    /// JSON-LD contexts injected at each selected node, in definition order
    pub contexts: Vec<(PathSelector, Value)>,
    /// Types added as `@type` at each selected node
    pub types: Vec<(PathSelector, Vec<String>)>,
    pub base_uri: Option<String>,
}

impl UpliftContext {
    pub fn parse(text: Option<&str>) -> Result<Self, ValidationError> {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(Self::default());
        };

        let definition: Value = serde_yaml::from_str(text).map_err(|e| {
            ValidationError::new("Context definition is not valid YAML or JSON")
                .cause("YAMLError", e)
        })?;

        let definition = match definition {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(
                    ValidationError::new("Context definition must be a mapping").value(other)
                );
            }
        };

        let mut parsed = Self::default();
        for (key, value) in definition {
            match key.as_str() {
                "context" => parsed.contexts = parse_contexts(value)?,
                "types" => parsed.types = parse_types(value)?,
                "base-uri" => match value {
                    Value::String(base) => parsed.base_uri = Some(base),
                    Value::Null => {}
                    other => {
                        return Err(ValidationError::new("base-uri must be a string")
                            .property("base-uri")
                            .value(other));
                    }
                },
                "transform" if !value.is_null() => {
                    return Err(ValidationError::new(
                        "Transform steps are not supported by this engine",
                    )
                    .property("transform")
                    .value(value));
                }
                _ => {
                    tracing::debug!(key = %key, "ignoring context definition entry");
                }
            }
        }
        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty() && self.types.is_empty()
    }

    /// Copy of `document` with types and contexts injected.
    ///
    /// The root context comes first in the resulting `@context`, followed by
    /// any context the document already declared. A root array is wrapped in
    /// an object under `@graph`.
    pub fn apply(&self, document: &Value) -> Value {
        let mut uplifted = document.clone();

        for (selector, types) in &self.types {
            selector.for_each_object(&mut uplifted, &mut |node| add_types(node, types));
        }

        let mut root_contexts = Vec::new();
        for (selector, context) in &self.contexts {
            if selector.is_root() {
                root_contexts.push(context.clone());
            } else {
                selector.for_each_object(&mut uplifted, &mut |node| {
                    prepend_context(node, context.clone())
                });
            }
        }

        if root_contexts.is_empty() {
            return uplifted;
        }
        let root_context = if root_contexts.len() == 1 {
            root_contexts.remove(0)
        } else {
            Value::Array(root_contexts)
        };

        match uplifted {
            Value::Object(mut map) => {
                prepend_context(&mut map, root_context);
                Value::Object(map)
            }
            other => {
                let mut map = Map::new();
                map.insert("@context".into(), root_context);
                map.insert("@graph".into(), other);
                Value::Object(map)
            }
        }
    }
}

fn prepend_context(node: &mut Map<String, Value>, context: Value) {
    let merged = match node.remove("@context") {
        None | Some(Value::Null) => context,
        Some(Value::Array(existing)) => {
            let mut merged = vec![context];
            merged.extend(existing);
            Value::Array(merged)
        }
        Some(existing) => Value::Array(vec![context, existing]),
    };
    node.insert("@context".into(), merged);
}

fn add_types(node: &mut Map<String, Value>, types: &[String]) {
    let mut merged: Vec<Value> = match node.remove("@type") {
        Some(Value::Array(existing)) => existing,
        Some(Value::Null) | None => Vec::new(),
        Some(existing) => vec![existing],
    };
    for t in types {
        let t = Value::String(t.clone());
        if !merged.contains(&t) {
            merged.push(t);
        }
    }
    let value = if merged.len() == 1 {
        merged.remove(0)
    } else {
        Value::Array(merged)
    };
    node.insert("@type".into(), value);
}

fn is_selector_map(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.trim_start().starts_with('$'))
}

fn parse_selector(key: &str, property: &str) -> Result<PathSelector, ValidationError> {
    PathSelector::parse(key).ok_or_else(|| {
        ValidationError::new(format!("Invalid path selector {key:?}"))
            .property(property)
            .value(Value::String(key.to_string()))
    })
}

fn check_context_value(value: &Value, index: Option<usize>) -> Result<(), ValidationError> {
    match value {
        Value::Object(_) | Value::String(_) | Value::Null => Ok(()),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| match item {
                Value::Array(_) => Err(ValidationError::new("Nested context arrays are not allowed")
                    .property("context")
                    .index(i)
                    .value(item.clone())),
                other => check_context_value(other, Some(i)),
            }),
        other => {
            let error = ValidationError::new("A context must be an object, a URL or a list")
                .property("context")
                .value(other.clone());
            Err(match index {
                Some(i) => error.index(i),
                None => error,
            })
        }
    }
}

fn parse_contexts(value: Value) -> Result<Vec<(PathSelector, Value)>, ValidationError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) if is_selector_map(&map) => map
            .into_iter()
            .map(|(key, context)| {
                let selector = parse_selector(&key, "context")?;
                check_context_value(&context, None)?;
                Ok((selector, context))
            })
            .collect(),
        other => {
            check_context_value(&other, None)?;
            Ok(vec![(PathSelector::root(), other)])
        }
    }
}

fn parse_types(value: Value) -> Result<Vec<(PathSelector, Vec<String>)>, ValidationError> {
    let map = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        other => {
            return Err(ValidationError::new("types must be a mapping of paths to types")
                .property("types")
                .value(other));
        }
    };

    map.into_iter()
        .map(|(key, types)| {
            let selector = parse_selector(&key, "types")?;
            let types = match types {
                Value::String(t) => vec![t],
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| match item {
                        Value::String(t) => Ok(t),
                        other => Err(ValidationError::new("Type names must be strings")
                            .property("types")
                            .index(i)
                            .value(other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                other => {
                    return Err(ValidationError::new("Type names must be strings")
                        .property("types")
                        .value(other));
                }
            };
            Ok((selector, types))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_selectors() {
        let selector = PathSelector::parse("$.features[*].properties").unwrap();
        assert_eq!(selector.as_str(), "$.features[*].properties");
        assert!(PathSelector::parse("$").unwrap().is_root());
        assert!(PathSelector::parse("features").is_none());
        assert!(PathSelector::parse("$..x").is_none());
        assert!(PathSelector::parse("$['a b']").is_some());
    }

    #[test]
    fn quoted_keys_need_matching_quotes() {
        let selector = PathSelector::parse("$['a b'][\"é\"]").unwrap();
        assert_eq!(
            selector.segments,
            vec![Segment::Key("a b".into()), Segment::Key("é".into())]
        );
        assert!(PathSelector::parse("$['abc]").is_none());
        assert!(PathSelector::parse("$['abc\"]").is_none());
        assert!(PathSelector::parse("$['é]").is_none());
        assert!(PathSelector::parse("$[']").is_none());
    }

    #[test]
    fn unterminated_quoted_type_selector_is_a_validation_error() {
        let err = UpliftContext::parse(Some("types:\n  \"$['é]\": Thing\n")).unwrap_err();
        assert_eq!(err.property.as_deref(), Some("types"));
        assert_eq!(err.value, Some(json!("$['é]")));
    }

    #[test]
    fn empty_text_is_an_empty_definition() {
        assert!(UpliftContext::parse(None).unwrap().is_empty());
        assert!(UpliftContext::parse(Some("  \n")).unwrap().is_empty());
    }

    #[test]
    fn plain_jsonld_context_applies_at_root() {
        let ctx = UpliftContext::parse(Some(r#"{"context": {"a": "http://example.org/a"}}"#))
            .unwrap();
        assert_eq!(ctx.contexts.len(), 1);
        assert!(ctx.contexts[0].0.is_root());
    }

    #[test]
    fn transform_is_rejected() {
        let err = UpliftContext::parse(Some("transform: '.a'\n")).unwrap_err();
        assert_eq!(err.property.as_deref(), Some("transform"));
    }

    #[test]
    fn bad_type_entry_reports_index() {
        let err = UpliftContext::parse(Some("types:\n  $: [A, 3]\n")).unwrap_err();
        assert_eq!(err.property.as_deref(), Some("types"));
        assert_eq!(err.index, Some(1));
        assert_eq!(err.value, Some(json!(3)));
    }

    #[test]
    fn invalid_yaml_carries_cause() {
        let err = UpliftContext::parse(Some("context: [unclosed")).unwrap_err();
        assert!(err.cause.unwrap().starts_with("YAMLError|"));
    }

    #[test]
    fn apply_injects_types_and_contexts() {
        let ctx = UpliftContext::parse(Some(
            "context:\n  $:\n    name: http://schema.org/name\n  $.items[*]:\n    '@vocab': http://example.org/ns#\ntypes:\n  $.items: Item\n",
        ))
        .unwrap();
        let doc = json!({
            "@context": {"x": "http://example.org/x"},
            "items": [{"v": 1}, {"v": 2, "@type": "Thing"}]
        });
        let out = ctx.apply(&doc);

        assert_eq!(
            out["@context"],
            json!([{"name": "http://schema.org/name"}, {"x": "http://example.org/x"}])
        );
        assert_eq!(out["items"][0]["@type"], "Item");
        assert_eq!(out["items"][1]["@type"], json!(["Thing", "Item"]));
        assert_eq!(
            out["items"][0]["@context"],
            json!({"@vocab": "http://example.org/ns#"})
        );
        // source document is untouched
        assert!(doc["items"][0].get("@type").is_none());
    }

    #[test]
    fn root_array_is_wrapped_in_graph() {
        let ctx = UpliftContext::parse(Some("context:\n  '@vocab': http://example.org/\n")).unwrap();
        let out = ctx.apply(&json!([{"a": 1}]));
        assert_eq!(out["@graph"], json!([{"a": 1}]));
        assert_eq!(out["@context"]["@vocab"], "http://example.org/");
    }
}
