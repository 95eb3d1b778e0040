//! Dependency edges and output-to-input field mappings.

use serde::{Deserialize, Serialize};

use crate::types::{IoMap, TaskId};

/// Rename/selection rule translating an upstream task's output keys into a
/// downstream task's input keys.
///
/// The empty mapping is the identity: every upstream output key is
/// propagated under its own name. A non-empty mapping selects only the
/// listed source keys, inserting each under its target name in order.
///
/// # Examples
///
/// ```rust
/// use taskloom::graphs::FieldMapping;
///
/// let identity = FieldMapping::identity();
/// assert!(identity.is_identity());
///
/// let renamed = FieldMapping::rename([("coords", "structure")]);
/// assert_eq!(renamed.pairs().len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping(Vec<(String, String)>);

impl FieldMapping {
    /// Propagate every upstream output key under its own name.
    #[must_use]
    pub fn identity() -> Self {
        Self(Vec::new())
    }

    /// Build an explicit mapping from `(source key, target key)` pairs.
    #[must_use]
    pub fn rename<S, T>(pairs: impl IntoIterator<Item = (S, T)>) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(s, t)| (s.into(), t.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    /// Apply this mapping, copying values from `upstream` into `target`.
    ///
    /// Source keys absent from the upstream map are skipped; the dispatch
    /// `requires` check is what turns a missing value into an error.
    pub fn apply(&self, upstream: &IoMap, target: &mut IoMap) {
        if self.is_identity() {
            for (key, value) in upstream {
                target.insert(key.clone(), value.clone());
            }
            return;
        }
        for (source, dest) in &self.0 {
            if let Some(value) = upstream.get(source) {
                target.insert(dest.clone(), value.clone());
            }
        }
    }
}

/// An ordering-and-data-flow edge between two task nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyEdge {
    from_id: TaskId,
    to_id: TaskId,
    field_mapping: FieldMapping,
}

impl DependencyEdge {
    pub(crate) fn new(from_id: TaskId, to_id: TaskId, field_mapping: FieldMapping) -> Self {
        Self {
            from_id,
            to_id,
            field_mapping,
        }
    }

    pub fn from_id(&self) -> TaskId {
        self.from_id
    }

    pub fn to_id(&self) -> TaskId {
        self.to_id
    }

    pub fn field_mapping(&self) -> &FieldMapping {
        &self.field_mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_mapping_propagates_everything() {
        let mut upstream = IoMap::default();
        upstream.insert("value".into(), json!(7));
        upstream.insert("units".into(), json!("kJ/mol"));
        let mut target = IoMap::default();
        FieldMapping::identity().apply(&upstream, &mut target);
        assert_eq!(target, upstream);
    }

    #[test]
    fn rename_selects_and_renames() {
        let mut upstream = IoMap::default();
        upstream.insert("coords".into(), json!([0.0, 1.0]));
        upstream.insert("log".into(), json!("ok"));
        let mut target = IoMap::default();
        FieldMapping::rename([("coords", "structure")]).apply(&upstream, &mut target);
        assert_eq!(target.get("structure"), Some(&json!([0.0, 1.0])));
        assert!(!target.contains_key("log"));
        assert!(!target.contains_key("coords"));
    }

    #[test]
    fn missing_source_keys_are_skipped() {
        let upstream = IoMap::default();
        let mut target = IoMap::default();
        target.insert("seed".into(), json!(3));
        FieldMapping::rename([("absent", "x")]).apply(&upstream, &mut target);
        assert_eq!(target.len(), 1);
    }
}
