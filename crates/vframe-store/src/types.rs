//! Filter, update and pipeline types.
//!
//! Stages serialize with MongoDB-style `$` names so pipelines can be logged
//! in the shape a server-side backend would receive them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use vframe_models::Document;

// =============================================================================
// Filters
// =============================================================================

/// Condition on a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    #[serde(rename = "$eq")]
    Eq(Value),
    #[serde(rename = "$in")]
    In(Vec<Value>),
    #[serde(rename = "$exists")]
    Exists(bool),
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => value.unwrap_or(&Value::Null) == expected,
            Condition::In(candidates) => {
                let value = value.unwrap_or(&Value::Null);
                candidates.iter().any(|c| c == value)
            }
            Condition::Exists(exists) => value.is_some() == *exists,
        }
    }
}

/// Conjunction of field conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<Value>) -> Self {
        Self::all().eq("_id", id)
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Condition::Eq(value.into())));
        self
    }

    pub fn is_in<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.clauses.push((field.into(), Condition::In(values)));
        self
    }

    pub fn exists(mut self, field: impl Into<String>, exists: bool) -> Self {
        self.clauses.push((field.into(), Condition::Exists(exists)));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, condition)| condition.matches(doc.get(field)))
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

// =============================================================================
// Updates
// =============================================================================

/// Field-level update applied to a single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "$set", default, skip_serializing_if = "Document::is_empty")]
    pub set: Document,

    #[serde(rename = "$unset", default, skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<String>,
}

impl Update {
    pub fn set(fields: Document) -> Self {
        Self {
            set: fields,
            unset: Vec::new(),
        }
    }

    pub fn unset<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            set: Document::new(),
            unset: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Apply to a document in place. `_id` is never modified.
    pub fn apply(&self, doc: &mut Document) {
        for (k, v) in &self.set {
            if k != "_id" {
                doc.insert(k.clone(), v.clone());
            }
        }
        for k in &self.unset {
            if k != "_id" {
                doc.remove(k);
            }
        }
    }
}

// =============================================================================
// Indexes
// =============================================================================

/// Index definition over one or more fields (ascending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// MongoDB-style index name, e.g. `_sample_id_1_frame_number_1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|k| format!("{}_1", k))
            .collect::<Vec<_>>()
            .join("_")
    }
}

// =============================================================================
// Pipelines
// =============================================================================

/// Behavior of a merge when the key matches a target document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhenMatched {
    /// Overwrite the target's fields with the incoming fields
    Merge,
    /// Replace the target document (keeping its `_id`)
    Replace,
    /// Leave the target untouched
    KeepExisting,
}

/// Behavior of a merge when no target document matches the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhenNotMatched {
    Discard,
    Insert,
}

/// Keyed merge of pipeline output into a target collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSpec {
    pub into: String,
    pub on: Vec<String>,
    pub when_matched: WhenMatched,
    pub when_not_matched: WhenNotMatched,
}

impl MergeSpec {
    /// Merge matched documents and discard unmatched ones.
    pub fn upsert_merge<I, S>(into: impl Into<String>, on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            into: into.into(),
            on: on.into_iter().map(Into::into).collect(),
            when_matched: WhenMatched::Merge,
            when_not_matched: WhenNotMatched::Discard,
        }
    }
}

/// A single aggregation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "$match")]
    Match(Filter),
    /// Keep only the listed fields
    #[serde(rename = "$project")]
    Project(Vec<String>),
    /// Remove the listed fields
    #[serde(rename = "$unset")]
    Unset(Vec<String>),
    /// Terminal: merge output into another collection
    #[serde(rename = "$merge")]
    Merge(MergeSpec),
    /// Terminal: replace a collection's contents with the output
    #[serde(rename = "$out")]
    Out(String),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Merge(_) | Stage::Out(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Project(_) => "$project",
            Stage::Unset(_) => "$unset",
            Stage::Merge(_) => "$merge",
            Stage::Out(_) => "$out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matches() {
        let d = doc(json!({"_id": "a", "frame_number": 3}));
        assert!(Filter::all().matches(&d));
        assert!(Filter::by_id("a").matches(&d));
        assert!(Filter::all().is_in("frame_number", [1, 3]).matches(&d));
        assert!(!Filter::all().eq("frame_number", 4).matches(&d));
        assert!(Filter::all().exists("labels", false).matches(&d));
    }

    #[test]
    fn test_update_never_touches_id() {
        let mut d = doc(json!({"_id": "a", "x": 1}));
        let mut set = Document::new();
        set.insert("_id".into(), json!("b"));
        set.insert("y".into(), json!(2));
        Update::set(set).apply(&mut d);
        Update::unset(["x", "_id"]).apply(&mut d);
        assert_eq!(Value::Object(d), json!({"_id": "a", "y": 2}));
    }

    #[test]
    fn test_index_name() {
        let index = IndexSpec::new(["_sample_id", "frame_number"]).unique();
        assert_eq!(index.name(), "_sample_id_1_frame_number_1");
        assert!(index.unique);
    }

    #[test]
    fn test_stage_serializes_with_dollar_names() {
        let stage = Stage::Merge(MergeSpec::upsert_merge("frames", ["_sample_id", "frame_number"]));
        let value = serde_json::to_value(&stage).unwrap();
        assert_eq!(value["$merge"]["whenMatched"], json!("merge"));
        assert_eq!(value["$merge"]["whenNotMatched"], json!("discard"));
    }
}
