//! Sync scope of a write-back call.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::RowId;

/// Restriction applied to a single synchronization call.
///
/// With neither restriction set the sync is a full sync: the source frame
/// namespace is rewritten from the frame collection and source fields that
/// are missing from the frame collection may be deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<RowId>>,
}

impl SyncScope {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: Some(fields.into_iter().map(Into::into).collect()),
            ids: None,
        }
    }

    pub fn with_ids(mut self, ids: Vec<RowId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn is_full(&self) -> bool {
        self.fields.is_none() && self.ids.is_none()
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fields {
            Some(fields) => write!(f, "fields=[{}]", fields.join(", "))?,
            None => write!(f, "fields=*")?,
        }
        match &self.ids {
            Some(ids) => write!(f, ", ids={}", ids.len()),
            None => write!(f, ", ids=*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display() {
        assert_eq!(SyncScope::full().to_string(), "fields=*, ids=*");
        let scope = SyncScope::fields(["labels"]).with_ids(vec![RowId::from("a")]);
        assert_eq!(scope.to_string(), "fields=[labels], ids=1");
        assert!(!scope.is_full());
    }
}
