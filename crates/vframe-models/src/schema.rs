//! Field schemas.
//!
//! A [`FieldSchema`] maps field names to [`FieldType`] descriptors. Frame
//! collections and the frame-level namespace of a video collection each hold
//! one; the schema synchronizer reconciles the two.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Kind of value a field stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    ObjectId,
    String,
    Int,
    Float,
    Bool,
    DateTime,
    FrameNumber,
    List,
    Dict,
    EmbeddedDocument,
}

/// Type descriptor of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldType {
    pub kind: FieldKind,

    /// Element kind for list fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfield: Option<FieldKind>,

    /// Document type for embedded fields (e.g. "Detections")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_doc_type: Option<String>,

    /// Database name when it differs from the field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_field: Option<String>,
}

impl FieldType {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            subfield: None,
            embedded_doc_type: None,
            db_field: None,
        }
    }

    pub fn list_of(kind: FieldKind) -> Self {
        Self {
            subfield: Some(kind),
            ..Self::new(FieldKind::List)
        }
    }

    pub fn embedded(doc_type: impl Into<String>) -> Self {
        Self {
            embedded_doc_type: Some(doc_type.into()),
            ..Self::new(FieldKind::EmbeddedDocument)
        }
    }

    pub fn with_db_field(mut self, db_field: impl Into<String>) -> Self {
        self.db_field = Some(db_field.into());
        self
    }

    /// Infer a descriptor from a stored value. Nulls carry no type.
    ///
    /// Objects tagged with `_cls` are embedded documents of that type.
    pub fn infer(value: &Value) -> Option<Self> {
        let field = match value {
            Value::Null => return None,
            Value::Bool(_) => Self::new(FieldKind::Bool),
            Value::Number(n) if n.is_f64() => Self::new(FieldKind::Float),
            Value::Number(_) => Self::new(FieldKind::Int),
            Value::String(_) => Self::new(FieldKind::String),
            Value::Array(items) => match items.iter().find_map(Self::infer) {
                Some(item) => Self::list_of(item.kind),
                None => Self::new(FieldKind::List),
            },
            Value::Object(map) => match map.get("_cls").and_then(Value::as_str) {
                Some(cls) => Self::embedded(cls),
                None => Self::new(FieldKind::Dict),
            },
        };
        Some(field)
    }
}

/// Ordered mapping of field name to type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FieldSchema(BTreeMap<String, FieldType>);

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert a field. Returns false if the field already existed (it is
    /// left untouched).
    pub fn insert(&mut self, name: impl Into<String>, field: FieldType) -> bool {
        let name = name.into();
        if self.0.contains_key(&name) {
            return false;
        }
        self.0.insert(name, field);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldType> {
        self.0.remove(name)
    }

    /// Add every field of `other` that is not already present.
    pub fn merge(&mut self, other: &FieldSchema) {
        for (name, field) in other.iter() {
            self.insert(name.clone(), field.clone());
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldType)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Database name of a field (falls back to the field name).
    pub fn db_field<'a>(&'a self, name: &'a str) -> &'a str {
        self.0
            .get(name)
            .and_then(|f| f.db_field.as_deref())
            .unwrap_or(name)
    }
}

impl FromIterator<(String, FieldType)> for FieldSchema {
    fn from_iter<I: IntoIterator<Item = (String, FieldType)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Default schema of the frame-level namespace of a video collection.
pub fn default_frame_schema() -> FieldSchema {
    [
        ("id", FieldType::new(FieldKind::ObjectId).with_db_field("_id")),
        ("frame_number", FieldType::new(FieldKind::FrameNumber)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Default schema of a frame collection row.
pub fn default_frame_row_schema() -> FieldSchema {
    [
        ("id", FieldType::new(FieldKind::ObjectId).with_db_field("_id")),
        ("filepath", FieldType::new(FieldKind::String)),
        ("tags", FieldType::list_of(FieldKind::String)),
        ("metadata", FieldType::embedded("ImageMetadata")),
        (
            "sample_id",
            FieldType::new(FieldKind::ObjectId).with_db_field("_sample_id"),
        ),
        ("frame_number", FieldType::new(FieldKind::FrameNumber)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Field names that are never synced as user data and never deleted.
pub const PROTECTED_FIELDS: &[&str] = &["id", "filepath", "tags", "metadata", "sample_id", "frame_number"];

pub fn is_protected_field(name: &str) -> bool {
    PROTECTED_FIELDS.contains(&name)
}

/// Protected or a frame row default (stored name, e.g. `_id`); such fields
/// are never user data.
pub fn is_default_field(name: &str) -> bool {
    is_protected_field(name) || crate::frame::fields::is_frame_row_default(name)
}
