use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What kind of children a template can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    /// No children (leaf task)
    None,
    /// Children placed at millisecond offsets from the parent's activation
    Timed,
    /// Children ordered as a checklist, no time offsets
    Sequential,
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildKind::None => write!(f, "leaf"),
            ChildKind::Timed => write!(f, "timed"),
            ChildKind::Sequential => write!(f, "sequential"),
        }
    }
}

/// A link from a child back to one specific placement under a parent.
///
/// The `relationship_id` — not the id pair — is the unit of identity for
/// edits, so the same child template can appear twice under one parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub parent_id: String,
    pub relationship_id: String,
}

/// A child placement inside a timed composite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedChild {
    pub child_id: String,
    pub relationship_id: String,
    /// Offset from the composite's own activation time
    pub start_offset_ms: i64,
}

/// A child entry inside a sequential composite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceChild {
    pub child_id: String,
    pub relationship_id: String,
    #[serde(default)]
    pub complete: bool,
}

/// Child list variants, tagged by capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Children {
    Leaf,
    Timed(Vec<TimedChild>),
    Sequential(Vec<SequenceChild>),
}

/// A reusable task template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Globally unique, sortable id
    pub id: String,
    pub name: String,
    /// Non-negative duration in milliseconds
    pub duration_ms: i64,
    /// Back-links to every parent placement of this template
    pub parents: Vec<Relationship>,
    /// Opaque key→value map, carried but never interpreted by the engine
    pub variables: IndexMap<String, serde_json::Value>,
    pub children: Children,
}

/// Error type for template construction
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid template data: {0}")]
    InvalidTemplateData(String),
}

impl Template {
    /// Create a leaf template with no links
    pub fn leaf(id: impl Into<String>, name: impl Into<String>, duration_ms: i64) -> Self {
        Template {
            id: id.into(),
            name: name.into(),
            duration_ms,
            parents: Vec::new(),
            variables: IndexMap::new(),
            children: Children::Leaf,
        }
    }

    /// Create an empty timed composite
    pub fn timed(id: impl Into<String>, name: impl Into<String>, duration_ms: i64) -> Self {
        Template {
            children: Children::Timed(Vec::new()),
            ..Template::leaf(id, name, duration_ms)
        }
    }

    /// Create an empty sequential composite
    pub fn sequential(id: impl Into<String>, name: impl Into<String>, duration_ms: i64) -> Self {
        Template {
            children: Children::Sequential(Vec::new()),
            ..Template::leaf(id, name, duration_ms)
        }
    }

    /// Capability query — consumers dispatch on this, never on struct shape
    pub fn child_kind(&self) -> ChildKind {
        match self.children {
            Children::Leaf => ChildKind::None,
            Children::Timed(_) => ChildKind::Timed,
            Children::Sequential(_) => ChildKind::Sequential,
        }
    }

    /// Timed child entries (empty for other kinds)
    pub fn timed_children(&self) -> &[TimedChild] {
        match &self.children {
            Children::Timed(children) => children,
            _ => &[],
        }
    }

    /// Sequence child entries (empty for other kinds)
    pub fn sequence_children(&self) -> &[SequenceChild] {
        match &self.children {
            Children::Sequential(children) => children,
            _ => &[],
        }
    }

    /// All child links as `(child_id, relationship_id)` pairs, in stored order
    pub fn child_links(&self) -> Vec<(&str, &str)> {
        match &self.children {
            Children::Leaf => Vec::new(),
            Children::Timed(children) => children
                .iter()
                .map(|c| (c.child_id.as_str(), c.relationship_id.as_str()))
                .collect(),
            Children::Sequential(children) => children
                .iter()
                .map(|c| (c.child_id.as_str(), c.relationship_id.as_str()))
                .collect(),
        }
    }

    /// Construct a template from a persisted record.
    ///
    /// Rejects empty ids/names, negative durations, unknown kinds, and child
    /// lists that contradict the declared kind.
    pub fn from_record(record: TemplateRecord) -> Result<Template, TemplateError> {
        if record.id.is_empty() {
            return Err(TemplateError::InvalidTemplateData("empty id".into()));
        }
        if record.name.is_empty() {
            return Err(TemplateError::InvalidTemplateData(format!(
                "template {} has an empty name",
                record.id
            )));
        }
        if record.duration_ms < 0 {
            return Err(TemplateError::InvalidTemplateData(format!(
                "template {} has negative duration {}",
                record.id, record.duration_ms
            )));
        }

        let children = match record.kind.as_str() {
            "leaf" => {
                if !record.timed_children.is_empty() || !record.sequence_children.is_empty() {
                    return Err(TemplateError::InvalidTemplateData(format!(
                        "leaf template {} carries child entries",
                        record.id
                    )));
                }
                Children::Leaf
            }
            "timed" => {
                if !record.sequence_children.is_empty() {
                    return Err(TemplateError::InvalidTemplateData(format!(
                        "timed template {} carries sequence children",
                        record.id
                    )));
                }
                Children::Timed(record.timed_children)
            }
            "sequential" => {
                if !record.timed_children.is_empty() {
                    return Err(TemplateError::InvalidTemplateData(format!(
                        "sequential template {} carries timed children",
                        record.id
                    )));
                }
                Children::Sequential(record.sequence_children)
            }
            other => {
                return Err(TemplateError::InvalidTemplateData(format!(
                    "template {} has unknown kind {:?}",
                    record.id, other
                )));
            }
        };

        Ok(Template {
            id: record.id,
            name: record.name,
            duration_ms: record.duration_ms,
            parents: record.parents,
            variables: record.variables,
            children,
        })
    }

    /// Inverse of `from_record`
    pub fn to_record(&self) -> TemplateRecord {
        let (kind, timed_children, sequence_children) = match &self.children {
            Children::Leaf => ("leaf", Vec::new(), Vec::new()),
            Children::Timed(children) => ("timed", children.clone(), Vec::new()),
            Children::Sequential(children) => ("sequential", Vec::new(), children.clone()),
        };
        TemplateRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            duration_ms: self.duration_ms,
            kind: kind.to_string(),
            timed_children,
            sequence_children,
            parents: self.parents.clone(),
            variables: self.variables.clone(),
        }
    }
}

/// The flat, serde-friendly shape a template takes in the library file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub duration_ms: i64,
    /// One of "leaf", "timed", "sequential"
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timed_children: Vec<TimedChild>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequence_children: Vec<SequenceChild>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, serde_json::Value>,
}
