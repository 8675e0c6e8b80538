use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, warn};

use crate::model::calendar::BaseCalendar;
use crate::model::library::TemplateSet;
use crate::model::template::{Children, Template};

/// Maximum descent depth; resolution past this aborts with a warning.
/// A full chain therefore holds at most `MAX_DEPTH + 1` templates.
pub const MAX_DEPTH: usize = 50;

/// Default soft latency budget for one resolution pass
pub const DEFAULT_SOFT_LATENCY_MS: u64 = 10;

/// Resolve the chain of templates active at `now_ms`, root-first.
///
/// The empty chain means no calendar entry is active — there is deliberately
/// no fallback to unscheduled templates. Safety aborts (depth, cycles) log
/// and return the partial chain built so far; this function never fails.
pub fn resolve_chain<'a>(
    templates: &'a TemplateSet,
    calendar: &BaseCalendar,
    now_ms: i64,
) -> Vec<&'a Template> {
    resolve_chain_with_budget(templates, calendar, now_ms, DEFAULT_SOFT_LATENCY_MS)
}

/// `resolve_chain` with an explicit soft latency budget (from config)
pub fn resolve_chain_with_budget<'a>(
    templates: &'a TemplateSet,
    calendar: &BaseCalendar,
    now_ms: i64,
    soft_latency_ms: u64,
) -> Vec<&'a Template> {
    let started = Instant::now();
    let chain = resolve_inner(templates, calendar, now_ms);
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if elapsed_ms > soft_latency_ms {
        warn!(
            elapsed_ms,
            soft_latency_ms,
            chain_len = chain.len(),
            "chain resolution exceeded soft latency budget"
        );
    }
    chain
}

fn resolve_inner<'a>(
    templates: &'a TemplateSet,
    calendar: &BaseCalendar,
    now_ms: i64,
) -> Vec<&'a Template> {
    // Root selection: first active entry in calendar map order wins.
    let mut root: Option<(&Template, i64)> = None;
    for entry in calendar.values() {
        let Some(template) = templates.get(&entry.template_id) else {
            debug!(
                entry_id = %entry.id,
                template_id = %entry.template_id,
                "calendar entry references a missing template, skipping"
            );
            continue;
        };
        if now_ms >= entry.start_ms && now_ms < entry.start_ms + template.duration_ms {
            root = Some((template, entry.start_ms));
            break;
        }
    }
    let Some((root, root_start)) = root else {
        return Vec::new();
    };

    let mut chain: Vec<&Template> = vec![root];
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(root.id.as_str());

    let mut current = root;
    // now, translated into the current item's own activation frame
    let mut local_now = now_ms - root_start;

    loop {
        if chain.len() > MAX_DEPTH {
            warn!(
                depth = chain.len(),
                tail = %current.id,
                "chain resolution aborted: depth limit exceeded"
            );
            break;
        }

        let next = next_active_child(templates, current, local_now);
        let Some((child, child_start)) = next else {
            break;
        };

        if !visited.insert(child.id.as_str()) {
            warn!(
                template_id = %child.id,
                "chain resolution aborted: cycle detected"
            );
            break;
        }

        chain.push(child);
        local_now -= child_start;
        current = child;
    }

    chain
}

/// Pick the active child of `current` at `local_now` (relative to the
/// current item's activation). Returns the child and its activation start in
/// the current frame.
fn next_active_child<'a>(
    templates: &'a TemplateSet,
    current: &Template,
    local_now: i64,
) -> Option<(&'a Template, i64)> {
    match &current.children {
        Children::Leaf => None,
        // Stored array order, not offset order: overlapping windows resolve
        // to whichever entry appears earlier in the array.
        Children::Timed(children) => {
            for entry in children {
                let Some(child) = templates.get(&entry.child_id) else {
                    warn!(
                        parent_id = %current.id,
                        child_id = %entry.child_id,
                        "timed child references a missing template, skipping"
                    );
                    continue;
                };
                let start = entry.start_offset_ms;
                if local_now >= start && local_now < start + child.duration_ms {
                    return Some((child, start));
                }
            }
            None
        }
        // The first entry is the active child regardless of its complete
        // flag. A sequential child activates with its parent, so its start
        // in the parent frame is 0.
        Children::Sequential(children) => {
            let entry = children.first()?;
            match templates.get(&entry.child_id) {
                Some(child) => Some((child, 0)),
                None => {
                    warn!(
                        parent_id = %current.id,
                        child_id = %entry.child_id,
                        "sequence child references a missing template, stopping descent"
                    );
                    None
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
