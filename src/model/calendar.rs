use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One absolute scheduling of a root template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseCalendarEntry {
    pub id: String,
    pub template_id: String,
    /// Absolute start time, epoch milliseconds
    pub start_ms: i64,
}

/// Calendar entries keyed by entry id.
///
/// Insertion order is preserved and meaningful: root selection scans entries
/// in map order and takes the first active one.
pub type BaseCalendar = IndexMap<String, BaseCalendarEntry>;

impl BaseCalendarEntry {
    pub fn new(
        id: impl Into<String>,
        template_id: impl Into<String>,
        start_ms: i64,
    ) -> Self {
        BaseCalendarEntry {
            id: id.into(),
            template_id: template_id.into(),
            start_ms,
        }
    }
}
