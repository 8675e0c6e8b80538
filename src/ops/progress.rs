use crate::model::calendar::BaseCalendar;
use crate::model::template::{Children, Template};

/// Completion percentage of a template at `now_ms`, given its absolute
/// activation time: 0 before activation, 100 at or after the end, linear
/// in between. Zero or negative durations report 0.
pub fn progress(template: &Template, now_ms: i64, activation_ms: i64) -> f64 {
    if template.duration_ms <= 0 {
        return 0.0;
    }
    let elapsed = now_ms - activation_ms;
    if elapsed <= 0 {
        0.0
    } else if elapsed >= template.duration_ms {
        100.0
    } else {
        elapsed as f64 * 100.0 / template.duration_ms as f64
    }
}

/// Elapsed active time in milliseconds, clamped to `[0, duration]`
pub fn elapsed_ms(template: &Template, now_ms: i64, activation_ms: i64) -> i64 {
    (now_ms - activation_ms).clamp(0, template.duration_ms.max(0))
}

/// Remaining active time in milliseconds, clamped to `[0, duration]`
pub fn remaining_ms(template: &Template, now_ms: i64, activation_ms: i64) -> i64 {
    template.duration_ms.max(0) - elapsed_ms(template, now_ms, activation_ms)
}

/// Absolute activation time of `target_id` along a resolved chain.
///
/// Starts from the first calendar entry (map order) scheduling the chain's
/// root and adds the `start_offset_ms` of each timed edge down to the
/// target. Sequential edges contribute nothing — a sequence child activates
/// with its parent. Returns `None` when the root is unscheduled or the
/// target is not on the chain.
pub fn cumulative_start_time(
    chain: &[&Template],
    target_id: &str,
    calendar: &BaseCalendar,
) -> Option<i64> {
    let root = chain.first()?;
    let mut acc = calendar
        .values()
        .find(|e| e.template_id == root.id)?
        .start_ms;
    if root.id == target_id {
        return Some(acc);
    }

    for pair in chain.windows(2) {
        let (parent, child) = (pair[0], pair[1]);
        match &parent.children {
            Children::Timed(children) => {
                let edge = children.iter().find(|c| c.child_id == child.id)?;
                acc += edge.start_offset_ms;
            }
            Children::Sequential(_) => {}
            // a leaf cannot have a successor in a well-formed chain
            Children::Leaf => return None,
        }
        if child.id == target_id {
            return Some(acc);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
