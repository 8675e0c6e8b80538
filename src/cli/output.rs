use serde::Serialize;

use crate::model::calendar::BaseCalendar;
use crate::model::template::Template;
use crate::ops::check::{CheckError, CheckResult, CheckWarning};
use crate::ops::progress::{cumulative_start_time, progress, remaining_ms};
use crate::util::time::{format_duration_ms, format_instant_ms};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TemplateJson {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub duration_ms: i64,
    pub parent_count: usize,
    pub child_count: usize,
}

impl TemplateJson {
    pub fn from_template(t: &Template) -> Self {
        TemplateJson {
            id: t.id.clone(),
            name: t.name.clone(),
            kind: t.child_kind().to_string(),
            duration_ms: t.duration_ms,
            parent_count: t.parents.len(),
            child_count: t.child_links().len(),
        }
    }
}

#[derive(Serialize)]
pub struct ChainJson {
    pub now_ms: i64,
    pub nodes: Vec<ChainNodeJson>,
}

#[derive(Serialize)]
pub struct ChainNodeJson {
    pub id: String,
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<i64>,
}

pub fn chain_json(chain: &[&Template], calendar: &BaseCalendar, now_ms: i64) -> ChainJson {
    let nodes = chain
        .iter()
        .map(|t| {
            let started = cumulative_start_time(chain, &t.id, calendar);
            ChainNodeJson {
                id: t.id.clone(),
                name: t.name.clone(),
                kind: t.child_kind().to_string(),
                started_at_ms: started,
                progress_pct: started.map(|s| progress(t, now_ms, s)),
                remaining_ms: started.map(|s| remaining_ms(t, now_ms, s)),
            }
        })
        .collect();
    ChainJson { now_ms, nodes }
}

// ---------------------------------------------------------------------------
// Plain-text rendering
// ---------------------------------------------------------------------------

/// One template per line, root first, nested levels indented
pub fn format_chain(chain: &[&Template], calendar: &BaseCalendar, now_ms: i64) -> String {
    if chain.is_empty() {
        return "nothing active".to_string();
    }
    let mut out = String::new();
    for (depth, t) in chain.iter().enumerate() {
        let mut line = String::new();
        line.push_str(&"  ".repeat(depth));
        if depth > 0 {
            line.push_str("└ ");
        }
        line.push_str(&format!("{}  {}", t.id, t.name));
        match cumulative_start_time(chain, &t.id, calendar) {
            Some(start) => {
                line.push_str(&format!(
                    "  {:.1}%  {} left",
                    progress(t, now_ms, start),
                    format_duration_ms(remaining_ms(t, now_ms, start)),
                ));
            }
            None => line.push_str("  --"),
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn format_template_line(t: &Template) -> String {
    format!(
        "{}  [{}]  {}  ({})",
        t.id,
        t.child_kind(),
        t.name,
        format_duration_ms(t.duration_ms)
    )
}

/// Full template details for `cad show`
pub fn format_template_details(t: &Template, calendar: &BaseCalendar) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}  {}\n", t.id, t.name));
    out.push_str(&format!("kind: {}\n", t.child_kind()));
    out.push_str(&format!("duration: {}\n", format_duration_ms(t.duration_ms)));

    if !t.parents.is_empty() {
        out.push_str("parents:\n");
        for rel in &t.parents {
            out.push_str(&format!("  {} ({})\n", rel.parent_id, rel.relationship_id));
        }
    }
    match t.child_kind() {
        crate::model::template::ChildKind::None => {}
        crate::model::template::ChildKind::Timed => {
            out.push_str("children:\n");
            for c in t.timed_children() {
                out.push_str(&format!(
                    "  {} at +{} ({})\n",
                    c.child_id,
                    format_duration_ms(c.start_offset_ms),
                    c.relationship_id
                ));
            }
        }
        crate::model::template::ChildKind::Sequential => {
            out.push_str("children:\n");
            for c in t.sequence_children() {
                let mark = if c.complete { "x" } else { " " };
                out.push_str(&format!(
                    "  [{}] {} ({})\n",
                    mark, c.child_id, c.relationship_id
                ));
            }
        }
    }

    let scheduled: Vec<_> = calendar.values().filter(|e| e.template_id == t.id).collect();
    if !scheduled.is_empty() {
        out.push_str("scheduled:\n");
        for entry in scheduled {
            out.push_str(&format!(
                "  {} at {}\n",
                entry.id,
                format_instant_ms(entry.start_ms)
            ));
        }
    }
    out
}

pub fn format_check_result(result: &CheckResult) -> String {
    let mut out = String::new();
    for error in &result.errors {
        out.push_str(&format!("error: {}\n", describe_error(error)));
    }
    for warning in &result.warnings {
        out.push_str(&format!("warning: {}\n", describe_warning(warning)));
    }
    if result.valid && result.warnings.is_empty() {
        out.push_str("ok\n");
    }
    out
}

fn describe_error(error: &CheckError) -> String {
    match error {
        CheckError::DuplicateTemplateId { template_id } => {
            format!("duplicate template id {}", template_id)
        }
        CheckError::DanglingChildRef {
            parent_id,
            child_id,
            ..
        } => format!("{} lists missing child {}", parent_id, child_id),
        CheckError::DanglingParentRef {
            child_id,
            parent_id,
            ..
        } => format!("{} lists missing parent {}", child_id, parent_id),
        CheckError::OneSidedLink {
            parent_id,
            child_id,
            relationship_id,
            missing_side,
        } => format!(
            "link {} ({} -> {}) is missing its half on {}",
            relationship_id, parent_id, child_id, missing_side
        ),
        CheckError::RelationshipIdReused {
            relationship_id,
            pairs,
        } => format!(
            "relationship id {} is reused across {} pairs",
            relationship_id,
            pairs.len()
        ),
        CheckError::DanglingCalendarTemplate {
            entry_id,
            template_id,
        } => format!(
            "calendar entry {} schedules missing template {}",
            entry_id, template_id
        ),
    }
}

fn describe_warning(warning: &CheckWarning) -> String {
    match warning {
        CheckWarning::ChildExceedsParentWindow {
            parent_id,
            child_id,
            overflow_ms,
            ..
        } => format!(
            "{} under {} runs {} past its parent's end",
            child_id,
            parent_id,
            format_duration_ms(*overflow_ms)
        ),
        CheckWarning::EmptyChildWindow {
            parent_id,
            child_id,
            ..
        } => format!("{} under {} has no window (zero duration)", child_id, parent_id),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
