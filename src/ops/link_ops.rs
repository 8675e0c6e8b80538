use crate::model::template::{
    ChildKind, Children, Relationship, SequenceChild, Template, TimedChild,
};

/// Error type for link operations
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("incompatible parent kind: {0}")]
    IncompatibleParentKind(String),
}

// ---------------------------------------------------------------------------
// Adding links
// ---------------------------------------------------------------------------

/// Link `child` under `parent`, returning updated copies of both.
///
/// Timed parents require an explicit `start_offset_ms`; sequential parents
/// append to the end of the list. A missing relationship id is minted from
/// the endpoint ids. The inputs are never mutated.
///
/// When parent and child are the same template (a self-link), both returned
/// values are the one combined template carrying both sides of the link.
pub fn add_child(
    parent: &Template,
    child: &Template,
    start_offset_ms: Option<i64>,
    relationship_id: Option<String>,
) -> Result<(Template, Template), LinkError> {
    match parent.child_kind() {
        ChildKind::None => {
            return Err(LinkError::IncompatibleParentKind(format!(
                "leaf template {} cannot hold children",
                parent.id
            )));
        }
        ChildKind::Timed if start_offset_ms.is_none() => {
            return Err(LinkError::IncompatibleParentKind(format!(
                "timed template {} requires a start offset for new children",
                parent.id
            )));
        }
        ChildKind::Timed | ChildKind::Sequential => {}
    }

    let rel_id =
        relationship_id.unwrap_or_else(|| mint_relationship_id(parent, child));
    let back_link = Relationship {
        parent_id: parent.id.clone(),
        relationship_id: rel_id.clone(),
    };

    if parent.id == child.id {
        let mut combined = parent.clone();
        push_child_entry(&mut combined, &child.id, &rel_id, start_offset_ms);
        combined.parents.push(back_link);
        return Ok((combined.clone(), combined));
    }

    let mut new_parent = parent.clone();
    push_child_entry(&mut new_parent, &child.id, &rel_id, start_offset_ms);

    let mut new_child = child.clone();
    new_child.parents.push(back_link);

    Ok((new_parent, new_child))
}

fn push_child_entry(parent: &mut Template, child_id: &str, rel_id: &str, offset: Option<i64>) {
    match &mut parent.children {
        Children::Leaf => {}
        Children::Timed(children) => children.push(TimedChild {
            child_id: child_id.to_string(),
            relationship_id: rel_id.to_string(),
            // add_child has already required the offset for timed parents
            start_offset_ms: offset.unwrap_or(0),
        }),
        Children::Sequential(children) => children.push(SequenceChild {
            child_id: child_id.to_string(),
            relationship_id: rel_id.to_string(),
            complete: false,
        }),
    }
}

/// Mint a relationship id for a new parent→child link.
///
/// `{parent}:{child}:{n}` with the smallest `n` unused on either endpoint.
/// Embedding the endpoint pair rules out reuse across distinct pairs.
pub fn mint_relationship_id(parent: &Template, child: &Template) -> String {
    let taken = |candidate: &str| {
        has_child_with_relationship_id(parent, candidate)
            || has_parent_with_relationship_id(child, candidate)
    };
    let mut n = 0usize;
    loop {
        let candidate = format!("{}:{}:{}", parent.id, child.id, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

// ---------------------------------------------------------------------------
// Removing links — all idempotent, never an error on absence
// ---------------------------------------------------------------------------

/// Remove the first child entry with the given child id.
/// Returns an unchanged copy when no entry matches.
pub fn remove_child_by_id(item: &Template, child_id: &str) -> Template {
    remove_child_where(item, |cid, _| cid == child_id)
}

/// Remove the child entry carrying the given relationship id
pub fn remove_child_by_relationship_id(item: &Template, relationship_id: &str) -> Template {
    remove_child_where(item, |_, rid| rid == relationship_id)
}

fn remove_child_where(item: &Template, matches: impl Fn(&str, &str) -> bool) -> Template {
    let mut updated = item.clone();
    match &mut updated.children {
        Children::Leaf => {}
        Children::Timed(children) => {
            if let Some(i) = children
                .iter()
                .position(|c| matches(&c.child_id, &c.relationship_id))
            {
                children.remove(i);
            }
        }
        Children::Sequential(children) => {
            if let Some(i) = children
                .iter()
                .position(|c| matches(&c.child_id, &c.relationship_id))
            {
                children.remove(i);
            }
        }
    }
    updated
}

/// Remove the first parent link pointing at the given parent id
pub fn remove_parent_by_id(item: &Template, parent_id: &str) -> Template {
    remove_parent_where(item, |pid, _| pid == parent_id)
}

/// Remove the parent link carrying the given relationship id
pub fn remove_parent_by_relationship_id(item: &Template, relationship_id: &str) -> Template {
    remove_parent_where(item, |_, rid| rid == relationship_id)
}

fn remove_parent_where(item: &Template, matches: impl Fn(&str, &str) -> bool) -> Template {
    let mut updated = item.clone();
    if let Some(i) = updated
        .parents
        .iter()
        .position(|r| matches(&r.parent_id, &r.relationship_id))
    {
        updated.parents.remove(i);
    }
    updated
}

// ---------------------------------------------------------------------------
// Existence predicates
// ---------------------------------------------------------------------------

pub fn has_child_with_id(item: &Template, child_id: &str) -> bool {
    item.child_links().iter().any(|(cid, _)| *cid == child_id)
}

pub fn has_child_with_relationship_id(item: &Template, relationship_id: &str) -> bool {
    item.child_links()
        .iter()
        .any(|(_, rid)| *rid == relationship_id)
}

pub fn has_parent_with_id(item: &Template, parent_id: &str) -> bool {
    item.parents.iter().any(|r| r.parent_id == parent_id)
}

pub fn has_parent_with_relationship_id(item: &Template, relationship_id: &str) -> bool {
    item.parents
        .iter()
        .any(|r| r.relationship_id == relationship_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
