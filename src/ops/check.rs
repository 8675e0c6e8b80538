use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::calendar::BaseCalendar;
use crate::model::library::TemplateSet;
use crate::model::template::{Children, Relationship, Template};

/// Structured result from library validation, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
    /// A mechanically repaired state, present exactly when errors exist.
    /// Callers adopt it as an alternate initial state; nothing here throws.
    #[serde(skip)]
    pub repaired: Option<RepairedState>,
}

/// Repaired templates + calendar, offered alongside the issue list
#[derive(Debug, Clone)]
pub struct RepairedState {
    pub templates: TemplateSet,
    pub calendar: BaseCalendar,
}

/// A consistency error (broken structure that must be repaired).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// Two templates share an id
    #[serde(rename = "duplicate_template_id")]
    DuplicateTemplateId { template_id: String },
    /// A child entry names a template that doesn't exist
    #[serde(rename = "dangling_child_ref")]
    DanglingChildRef {
        parent_id: String,
        child_id: String,
        relationship_id: String,
    },
    /// A parent link names a template that doesn't exist
    #[serde(rename = "dangling_parent_ref")]
    DanglingParentRef {
        child_id: String,
        parent_id: String,
        relationship_id: String,
    },
    /// A link exists on one endpoint only; `missing_side` names the
    /// template whose half is absent
    #[serde(rename = "one_sided_link")]
    OneSidedLink {
        parent_id: String,
        child_id: String,
        relationship_id: String,
        missing_side: String,
    },
    /// The same relationship id appears on two distinct parent/child pairs
    #[serde(rename = "relationship_id_reused")]
    RelationshipIdReused {
        relationship_id: String,
        pairs: Vec<(String, String)>,
    },
    /// A calendar entry schedules a template that doesn't exist
    #[serde(rename = "dangling_calendar_template")]
    DanglingCalendarTemplate {
        entry_id: String,
        template_id: String,
    },
}

/// A non-critical issue (legal state, likely unintended).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// A timed child's window runs past its parent's duration
    #[serde(rename = "child_exceeds_parent_window")]
    ChildExceedsParentWindow {
        parent_id: String,
        child_id: String,
        relationship_id: String,
        overflow_ms: i64,
    },
    /// A zero-duration timed child can never be active
    #[serde(rename = "empty_child_window")]
    EmptyChildWindow {
        parent_id: String,
        child_id: String,
        relationship_id: String,
    },
}

// ---------------------------------------------------------------------------
// Main validation entry point
// ---------------------------------------------------------------------------

/// Validate a loaded library and return structured results.
///
/// Read-only over its inputs. When errors are found, `repaired` holds a
/// state with every error mechanically fixed:
/// - duplicate ids: first occurrence kept
/// - dangling child/parent/calendar refs: dropped
/// - one-sided links: missing child back-link reconstructed; a parent link
///   without its child entry is dropped (offset/position unrecoverable)
/// - reused relationship ids: re-minted for every pair after the first
pub fn validate(templates: &TemplateSet, calendar: &BaseCalendar) -> CheckResult {
    let mut result = CheckResult::default();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut flagged_dup: HashSet<&str> = HashSet::new();
    for t in templates {
        if !seen.insert(t.id.as_str()) && flagged_dup.insert(t.id.as_str()) {
            result.errors.push(CheckError::DuplicateTemplateId {
                template_id: t.id.clone(),
            });
        }
    }

    for t in templates {
        check_child_side(t, templates, &mut result);
        check_parent_side(t, templates, &mut result);
    }

    check_relationship_reuse(templates, &mut result);

    for entry in calendar.values() {
        if !templates.contains(&entry.template_id) {
            result.errors.push(CheckError::DanglingCalendarTemplate {
                entry_id: entry.id.clone(),
                template_id: entry.template_id.clone(),
            });
        }
    }

    result.valid = result.errors.is_empty();
    if !result.valid {
        result.repaired = Some(repair(templates, calendar));
    }
    result
}

// ---------------------------------------------------------------------------
// Per-template checks
// ---------------------------------------------------------------------------

fn check_child_side(parent: &Template, templates: &TemplateSet, result: &mut CheckResult) {
    for (child_id, rel_id) in parent.child_links() {
        let Some(child) = templates.get(child_id) else {
            result.errors.push(CheckError::DanglingChildRef {
                parent_id: parent.id.clone(),
                child_id: child_id.to_string(),
                relationship_id: rel_id.to_string(),
            });
            continue;
        };
        let mirrored = child
            .parents
            .iter()
            .any(|r| r.relationship_id == rel_id && r.parent_id == parent.id);
        if !mirrored {
            result.errors.push(CheckError::OneSidedLink {
                parent_id: parent.id.clone(),
                child_id: child_id.to_string(),
                relationship_id: rel_id.to_string(),
                missing_side: child_id.to_string(),
            });
        }
    }

    // window warnings apply to timed composites only
    if let Children::Timed(children) = &parent.children {
        for entry in children {
            let Some(child) = templates.get(&entry.child_id) else {
                continue;
            };
            if child.duration_ms == 0 {
                result.warnings.push(CheckWarning::EmptyChildWindow {
                    parent_id: parent.id.clone(),
                    child_id: entry.child_id.clone(),
                    relationship_id: entry.relationship_id.clone(),
                });
            }
            let overflow = entry.start_offset_ms + child.duration_ms - parent.duration_ms;
            if overflow > 0 {
                result.warnings.push(CheckWarning::ChildExceedsParentWindow {
                    parent_id: parent.id.clone(),
                    child_id: entry.child_id.clone(),
                    relationship_id: entry.relationship_id.clone(),
                    overflow_ms: overflow,
                });
            }
        }
    }
}

fn check_parent_side(child: &Template, templates: &TemplateSet, result: &mut CheckResult) {
    for rel in &child.parents {
        let Some(parent) = templates.get(&rel.parent_id) else {
            result.errors.push(CheckError::DanglingParentRef {
                child_id: child.id.clone(),
                parent_id: rel.parent_id.clone(),
                relationship_id: rel.relationship_id.clone(),
            });
            continue;
        };
        let mirrored = parent
            .child_links()
            .iter()
            .any(|(cid, rid)| *rid == rel.relationship_id && *cid == child.id);
        if !mirrored {
            result.errors.push(CheckError::OneSidedLink {
                parent_id: rel.parent_id.clone(),
                child_id: child.id.clone(),
                relationship_id: rel.relationship_id.clone(),
                missing_side: rel.parent_id.clone(),
            });
        }
    }
}

fn check_relationship_reuse(templates: &TemplateSet, result: &mut CheckResult) {
    // pairs are gathered from the child side; after the one-sided checks
    // above, parent links add no new information
    let mut by_rel: HashMap<&str, Vec<(String, String)>> = HashMap::new();
    for t in templates {
        for (child_id, rel_id) in t.child_links() {
            let pairs = by_rel.entry(rel_id).or_default();
            let pair = (t.id.clone(), child_id.to_string());
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
    }
    let mut reused: Vec<(&str, Vec<(String, String)>)> = by_rel
        .into_iter()
        .filter(|(_, pairs)| pairs.len() > 1)
        .collect();
    reused.sort_by(|a, b| a.0.cmp(b.0));
    for (rel_id, pairs) in reused {
        result.errors.push(CheckError::RelationshipIdReused {
            relationship_id: rel_id.to_string(),
            pairs,
        });
    }
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

fn repair(templates: &TemplateSet, calendar: &BaseCalendar) -> RepairedState {
    // duplicate ids: the set is id-sorted, duplicates are adjacent; keep the
    // first of each run
    let mut kept: Vec<Template> = Vec::new();
    for t in templates {
        if kept.last().is_some_and(|k| k.id == t.id) {
            continue;
        }
        kept.push(t.clone());
    }
    let ids: HashSet<String> = kept.iter().map(|t| t.id.clone()).collect();

    // drop links into the void
    for t in &mut kept {
        match &mut t.children {
            Children::Leaf => {}
            Children::Timed(children) => children.retain(|c| ids.contains(&c.child_id)),
            Children::Sequential(children) => children.retain(|c| ids.contains(&c.child_id)),
        }
        t.parents.retain(|r| ids.contains(&r.parent_id));
    }

    // drop parent links whose child entry is gone
    let child_side: HashSet<(String, String, String)> = kept
        .iter()
        .flat_map(|t| {
            t.child_links()
                .into_iter()
                .map(|(cid, rid)| (t.id.clone(), cid.to_string(), rid.to_string()))
                .collect::<Vec<_>>()
        })
        .collect();
    for t in &mut kept {
        let own_id = t.id.clone();
        t.parents.retain(|r| {
            child_side.contains(&(
                r.parent_id.clone(),
                own_id.clone(),
                r.relationship_id.clone(),
            ))
        });
    }

    // reconstruct missing child back-links
    let mut additions: Vec<(String, Relationship)> = Vec::new();
    for t in &kept {
        for (child_id, rel_id) in t.child_links() {
            let Some(child) = kept.iter().find(|c| c.id == child_id) else {
                continue;
            };
            let mirrored = child
                .parents
                .iter()
                .any(|r| r.relationship_id == rel_id && r.parent_id == t.id);
            if !mirrored {
                additions.push((
                    child_id.to_string(),
                    Relationship {
                        parent_id: t.id.clone(),
                        relationship_id: rel_id.to_string(),
                    },
                ));
            }
        }
    }
    for (child_id, rel) in additions {
        if let Some(child) = kept.iter_mut().find(|c| c.id == child_id) {
            child.parents.push(rel);
        }
    }

    remint_reused_relationship_ids(&mut kept);

    let mut repaired_calendar = calendar.clone();
    repaired_calendar.retain(|_, entry| ids.contains(&entry.template_id));

    RepairedState {
        templates: TemplateSet::from_templates(kept),
        calendar: repaired_calendar,
    }
}

/// Give every pair after the first its own fresh relationship id, updating
/// both sides of each affected link.
fn remint_reused_relationship_ids(templates: &mut [Template]) {
    let mut used: HashSet<String> = templates
        .iter()
        .flat_map(|t| {
            t.child_links()
                .into_iter()
                .map(|(_, rid)| rid.to_string())
                .collect::<Vec<_>>()
        })
        .collect();

    // first pair seen (template order, then child order) keeps the id
    let mut first_holder: HashMap<String, (String, String)> = HashMap::new();
    let mut renames: Vec<(String, String, String, String)> = Vec::new();
    for t in templates.iter() {
        for (child_id, rel_id) in t.child_links() {
            let pair = (t.id.clone(), child_id.to_string());
            match first_holder.get(rel_id) {
                None => {
                    first_holder.insert(rel_id.to_string(), pair);
                }
                Some(holder) if *holder == pair => {}
                Some(_) => {
                    let mut n = 0usize;
                    let fresh = loop {
                        let candidate = format!("{}:{}:{}", t.id, child_id, n);
                        if !used.contains(&candidate) {
                            break candidate;
                        }
                        n += 1;
                    };
                    used.insert(fresh.clone());
                    renames.push((
                        t.id.clone(),
                        child_id.to_string(),
                        rel_id.to_string(),
                        fresh,
                    ));
                }
            }
        }
    }

    for (parent_id, child_id, old_rel, new_rel) in renames {
        for t in templates.iter_mut() {
            if t.id == parent_id {
                match &mut t.children {
                    Children::Leaf => {}
                    Children::Timed(children) => {
                        if let Some(c) = children
                            .iter_mut()
                            .find(|c| c.relationship_id == old_rel && c.child_id == child_id)
                        {
                            c.relationship_id = new_rel.clone();
                        }
                    }
                    Children::Sequential(children) => {
                        if let Some(c) = children
                            .iter_mut()
                            .find(|c| c.relationship_id == old_rel && c.child_id == child_id)
                        {
                            c.relationship_id = new_rel.clone();
                        }
                    }
                }
            }
            if t.id == child_id {
                if let Some(r) = t
                    .parents
                    .iter_mut()
                    .find(|r| r.relationship_id == old_rel && r.parent_id == parent_id)
                {
                    r.relationship_id = new_rel.clone();
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
