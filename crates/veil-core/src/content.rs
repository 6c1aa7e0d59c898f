//! Structured content shapes
//!
//! Tool arguments and tool results are nested data. `Content` models the
//! closed set of shapes the redaction layer has to walk: text leaves,
//! ordered sequences, key-ordered maps, and content items (a typed entry
//! with a `text` field plus arbitrary metadata). Anything else is a scalar
//! and passes through untouched.
//!
//! Plain JSON (tool arguments, structured results) always converts to maps
//! and sequences. Items only come from tool content lists, see
//! [`Content::from_tool_content`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Item fields carried verbatim, never rewritten
const METADATA_FIELDS: [&str; 2] = ["annotations", "_meta"];

/// A nested value whose string leaves may carry personal data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "Value")]
pub enum Content {
    Text(String),
    Sequence(Vec<Content>),
    Map(BTreeMap<String, Content>),
    Item(ContentItem),
    /// Null, booleans and numbers
    Scalar(Value),
}

/// A typed content entry, e.g. `{"type": "text", "text": "...", "annotations": ...}`
///
/// `annotations` and `_meta` are carried through verbatim. Every other field
/// in `fields` is walked like plain JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub kind: String,
    pub text: String,
    pub fields: Map<String, Value>,
}

impl ContentItem {
    /// Create a plain text item
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn annotations(&self) -> Option<&Value> {
        self.fields.get("annotations")
    }

    pub fn meta(&self) -> Option<&Value> {
        self.fields.get("_meta")
    }

    /// Read an item from an object with a string `type` and a string `text`.
    /// Any other object is handed back.
    pub fn from_object(mut obj: Map<String, Value>) -> Result<Self, Map<String, Value>> {
        let is_item = matches!(obj.get("type"), Some(Value::String(_)))
            && matches!(obj.get("text"), Some(Value::String(_)));
        if !is_item {
            return Err(obj);
        }

        let kind = match obj.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => String::new(),
        };
        let text = match obj.remove("text") {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        Ok(Self {
            kind,
            text,
            fields: obj,
        })
    }

    fn map_fields(&self, f: &mut dyn FnMut(&str) -> String) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(key, value)| {
                let value = if METADATA_FIELDS.contains(&key.as_str()) {
                    value.clone()
                } else {
                    Value::from(Content::from(value.clone()).map_text(f))
                };
                (key.clone(), value)
            })
            .collect()
    }

    fn for_each_field_text(&self, f: &mut dyn FnMut(&str)) {
        for (key, value) in &self.fields {
            if !METADATA_FIELDS.contains(&key.as_str()) {
                Content::from(value.clone()).for_each_text(f);
            }
        }
    }
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text(text.into())
    }

    /// A sequence holding a single text item, the usual shape of a tool result
    pub fn text_items(text: impl Into<String>) -> Self {
        Content::Sequence(vec![Content::Item(ContentItem::text(text))])
    }

    /// Read a tool content list: objects with a string `type` and `text`
    /// become [`Content::Item`], at the top level or as entries of a top-level
    /// list. Everything below that is plain JSON.
    pub fn from_tool_content(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                Content::Sequence(items.into_iter().map(Content::tool_content_entry).collect())
            }
            other => Content::tool_content_entry(other),
        }
    }

    fn tool_content_entry(value: Value) -> Self {
        match value {
            Value::Object(obj) => match ContentItem::from_object(obj) {
                Ok(item) => Content::Item(item),
                Err(obj) => Content::from(Value::Object(obj)),
            },
            other => Content::from(other),
        }
    }

    /// Rebuild the same shape with every text leaf passed through `f`
    pub fn map_text(&self, f: &mut dyn FnMut(&str) -> String) -> Content {
        match self {
            Content::Text(s) => Content::Text(f(s)),
            Content::Sequence(items) => {
                Content::Sequence(items.iter().map(|item| item.map_text(f)).collect())
            }
            Content::Map(entries) => Content::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.map_text(f)))
                    .collect(),
            ),
            Content::Item(item) => {
                let text = f(&item.text);
                Content::Item(ContentItem {
                    kind: item.kind.clone(),
                    text,
                    fields: item.map_fields(f),
                })
            }
            Content::Scalar(v) => Content::Scalar(v.clone()),
        }
    }

    /// Visit every text leaf in document order
    pub fn for_each_text(&self, f: &mut dyn FnMut(&str)) {
        match self {
            Content::Text(s) => f(s),
            Content::Sequence(items) => items.iter().for_each(|item| item.for_each_text(f)),
            Content::Map(entries) => entries.values().for_each(|value| value.for_each_text(f)),
            Content::Item(item) => {
                f(&item.text);
                item.for_each_field_text(f);
            }
            Content::Scalar(_) => {}
        }
    }

    /// Flatten to the text handed to a language model.
    ///
    /// Text items are joined with newlines; anything that is not plain text is
    /// rendered as JSON.
    pub fn to_model_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Item(item) if item.kind == "text" => item.text.clone(),
            Content::Sequence(items) if items.iter().all(Content::is_text_like) => items
                .iter()
                .map(Content::to_model_text)
                .collect::<Vec<_>>()
                .join("\n"),
            other => Value::from(other.clone()).to_string(),
        }
    }

    fn is_text_like(&self) -> bool {
        matches!(self, Content::Text(_))
            || matches!(self, Content::Item(item) if item.kind == "text")
    }
}

/// Plain JSON: every object is a map, so every string leaf is reachable
impl From<Value> for Content {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Content::Text(s),
            Value::Array(items) => Content::Sequence(items.into_iter().map(Content::from).collect()),
            Value::Object(obj) => {
                Content::Map(obj.into_iter().map(|(k, v)| (k, Content::from(v))).collect())
            }
            scalar => Content::Scalar(scalar),
        }
    }
}

/// Stored content is tool content, so items are read back as items
impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Content::from_tool_content)
    }
}

impl From<Content> for Value {
    fn from(content: Content) -> Self {
        match content {
            Content::Text(s) => Value::String(s),
            Content::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Content::Map(entries) => {
                Value::Object(entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
            Content::Item(item) => {
                let mut obj = Map::new();
                obj.insert("type".to_string(), Value::String(item.kind));
                obj.insert("text".to_string(), Value::String(item.text));
                obj.extend(item.fields);
                Value::Object(obj)
            }
            Content::Scalar(v) => v,
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}
