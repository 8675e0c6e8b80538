use crate::model::calendar::BaseCalendarEntry;
use crate::model::library::TemplateSet;
use crate::model::store::StoreState;
use crate::model::template::Template;
use crate::ops::link_ops::{self, LinkError};

/// The closed set of state mutations.
///
/// Every edit to templates, links, and calendar entries flows through
/// `apply` as one of these; `Batch` is the atomic unit for multi-step edits.
#[derive(Debug, Clone)]
pub enum Action {
    CreateTemplate {
        template: Template,
    },
    DeleteTemplateById {
        id: String,
    },
    AddChildToTemplate {
        parent_id: String,
        child_id: String,
        start_offset_ms: Option<i64>,
    },
    /// Detach a template from all of its parents, keeping it in the library
    RemoveInstanceById {
        id: String,
    },
    /// Remove the single link carrying this relationship id, wherever held
    RemoveInstanceByRelationshipId {
        relationship_id: String,
    },
    AddCalendarEntry {
        entry: BaseCalendarEntry,
    },
    UpdateCalendarEntry {
        entry: BaseCalendarEntry,
    },
    RemoveCalendarEntry {
        entry_id: String,
    },
    /// Replace existing templates wholesale, matched by id
    UpdateTemplates {
        templates: Vec<Template>,
    },
    SetFocusedTemplate {
        id: Option<String>,
    },
    SetSelectedEntry {
        id: Option<String>,
    },
    Batch {
        actions: Vec<Action>,
    },
}

/// Error type for reducer actions
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("calendar entry not found: {0}")]
    EntryNotFound(String),
    #[error("duplicate id: {0}")]
    DuplicateId(String),
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Apply one action to a state snapshot, producing a new state.
///
/// The input is never mutated: a failing action leaves the caller's state
/// exactly as it was, which is what makes `Batch` atomic — the fold either
/// completes and returns a fresh, unaliased state, or the first error
/// aborts the whole batch.
pub fn apply(state: &StoreState, action: Action) -> Result<StoreState, StoreError> {
    match action {
        Action::CreateTemplate { template } => {
            if state.templates.contains(&template.id) {
                return Err(StoreError::DuplicateId(template.id));
            }
            let mut next = state.clone();
            next.templates.insert(template);
            Ok(next)
        }

        Action::DeleteTemplateById { id } => {
            if !state.templates.contains(&id) {
                return Err(StoreError::TemplateNotFound(id));
            }
            let mut next = state.clone();
            detach_everywhere(&mut next.templates, &id);
            next.templates.remove(&id);
            if next.focused_template.as_deref() == Some(id.as_str()) {
                next.focused_template = None;
            }
            // calendar entries are left alone: calendar and relationship
            // mutations are independent, and the validator owns the
            // resulting dangling reference
            Ok(next)
        }

        Action::AddChildToTemplate {
            parent_id,
            child_id,
            start_offset_ms,
        } => {
            let parent = state
                .templates
                .get(&parent_id)
                .ok_or_else(|| StoreError::TemplateNotFound(parent_id.clone()))?;
            let child = state
                .templates
                .get(&child_id)
                .ok_or_else(|| StoreError::TemplateNotFound(child_id.clone()))?;

            // the manager dispatches on the parent's capability kind
            let (new_parent, new_child) =
                link_ops::add_child(parent, child, start_offset_ms, None)?;

            let mut next = state.clone();
            next.templates.replace(new_parent);
            next.templates.replace(new_child);
            Ok(next)
        }

        Action::RemoveInstanceById { id } => {
            let child = state
                .templates
                .get(&id)
                .ok_or_else(|| StoreError::TemplateNotFound(id.clone()))?
                .clone();

            let mut next = state.clone();
            for rel in &child.parents {
                if let Some(parent) = next.templates.get(&rel.parent_id) {
                    let updated =
                        link_ops::remove_child_by_relationship_id(parent, &rel.relationship_id);
                    next.templates.replace(updated);
                }
                if let Some(current) = next.templates.get(&id) {
                    let updated =
                        link_ops::remove_parent_by_relationship_id(current, &rel.relationship_id);
                    next.templates.replace(updated);
                }
            }
            Ok(next)
        }

        Action::RemoveInstanceByRelationshipId { relationship_id } => {
            let holders: Vec<String> = state
                .templates
                .iter()
                .filter(|t| {
                    link_ops::has_child_with_relationship_id(t, &relationship_id)
                        || link_ops::has_parent_with_relationship_id(t, &relationship_id)
                })
                .map(|t| t.id.clone())
                .collect();

            // unknown relationship ids are a cleanup no-op, not an error
            let mut next = state.clone();
            for holder_id in holders {
                let Some(holder) = next.templates.get(&holder_id) else {
                    continue;
                };
                let mut updated = holder.clone();
                if link_ops::has_child_with_relationship_id(&updated, &relationship_id) {
                    updated =
                        link_ops::remove_child_by_relationship_id(&updated, &relationship_id);
                }
                if link_ops::has_parent_with_relationship_id(&updated, &relationship_id) {
                    updated =
                        link_ops::remove_parent_by_relationship_id(&updated, &relationship_id);
                }
                next.templates.replace(updated);
            }
            Ok(next)
        }

        Action::AddCalendarEntry { entry } => {
            if !state.templates.contains(&entry.template_id) {
                return Err(StoreError::TemplateNotFound(entry.template_id));
            }
            if state.calendar.contains_key(&entry.id) {
                return Err(StoreError::DuplicateId(entry.id));
            }
            let mut next = state.clone();
            next.calendar.insert(entry.id.clone(), entry);
            Ok(next)
        }

        Action::UpdateCalendarEntry { entry } => {
            if !state.calendar.contains_key(&entry.id) {
                return Err(StoreError::EntryNotFound(entry.id));
            }
            if !state.templates.contains(&entry.template_id) {
                return Err(StoreError::TemplateNotFound(entry.template_id));
            }
            let mut next = state.clone();
            // insert over an existing key keeps the entry's map position
            next.calendar.insert(entry.id.clone(), entry);
            Ok(next)
        }

        Action::RemoveCalendarEntry { entry_id } => {
            if !state.calendar.contains_key(&entry_id) {
                return Err(StoreError::EntryNotFound(entry_id));
            }
            let mut next = state.clone();
            next.calendar.shift_remove(&entry_id);
            if next.selected_entry.as_deref() == Some(entry_id.as_str()) {
                next.selected_entry = None;
            }
            Ok(next)
        }

        Action::UpdateTemplates { templates } => {
            let mut next = state.clone();
            for template in templates {
                if !next.templates.contains(&template.id) {
                    return Err(StoreError::TemplateNotFound(template.id));
                }
                next.templates.replace(template);
            }
            Ok(next)
        }

        Action::SetFocusedTemplate { id } => {
            let mut next = state.clone();
            next.focused_template = id;
            Ok(next)
        }

        Action::SetSelectedEntry { id } => {
            let mut next = state.clone();
            next.selected_entry = id;
            Ok(next)
        }

        Action::Batch { actions } => {
            let mut next = state.clone();
            for action in actions {
                next = apply(&next, action)?;
            }
            Ok(next)
        }
    }
}

/// Strip every link (child side and parent side) naming `id` from all other
/// templates. Loops the idempotent removers because a template can appear
/// more than once under one parent.
fn detach_everywhere(templates: &mut TemplateSet, id: &str) {
    let affected: Vec<String> = templates
        .iter()
        .filter(|t| {
            t.id != id
                && (link_ops::has_child_with_id(t, id) || link_ops::has_parent_with_id(t, id))
        })
        .map(|t| t.id.clone())
        .collect();

    for affected_id in affected {
        let Some(existing) = templates.get(&affected_id) else {
            continue;
        };
        let mut updated = existing.clone();
        while link_ops::has_child_with_id(&updated, id) {
            updated = link_ops::remove_child_by_id(&updated, id);
        }
        while link_ops::has_parent_with_id(&updated, id) {
            updated = link_ops::remove_parent_by_id(&updated, id);
        }
        templates.replace(updated);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::calendar::BaseCalendar;

    fn state_with(templates: Vec<Template>) -> StoreState {
        StoreState::new(TemplateSet::from_templates(templates), BaseCalendar::new())
    }

    fn linked_family() -> StoreState {
        // two timed parents over "mid", which itself holds "leaf"
        let p1 = Template::timed("p1", "Parent 1", 2000);
        let p2 = Template::timed("p2", "Parent 2", 2000);
        let mid = Template::sequential("mid", "Middle", 1000);
        let leaf = Template::leaf("leaf", "Leaf", 500);

        let state = state_with(vec![p1, p2, mid, leaf]);
        let state = apply(
            &state,
            Action::AddChildToTemplate {
                parent_id: "p1".into(),
                child_id: "mid".into(),
                start_offset_ms: Some(0),
            },
        )
        .unwrap();
        let state = apply(
            &state,
            Action::AddChildToTemplate {
                parent_id: "p2".into(),
                child_id: "mid".into(),
                start_offset_ms: Some(100),
            },
        )
        .unwrap();
        apply(
            &state,
            Action::AddChildToTemplate {
                parent_id: "mid".into(),
                child_id: "leaf".into(),
                start_offset_ms: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn create_template_rejects_duplicate_ids() {
        let state = state_with(vec![Template::leaf("a", "A", 100)]);
        let err = apply(
            &state,
            Action::CreateTemplate {
                template: Template::leaf("a", "A again", 100),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn create_template_does_not_touch_the_input_state() {
        let state = state_with(vec![]);
        let next = apply(
            &state,
            Action::CreateTemplate {
                template: Template::leaf("a", "A", 100),
            },
        )
        .unwrap();
        assert!(state.templates.is_empty());
        assert_eq!(next.templates.len(), 1);
    }

    #[test]
    fn add_child_links_both_sides_through_the_store() {
        let state = linked_family();
        let p1 = state.templates.get("p1").unwrap();
        let mid = state.templates.get("mid").unwrap();

        let rel = &p1.timed_children()[0].relationship_id;
        assert!(mid.parents.iter().any(|r| &r.relationship_id == rel));
        assert_eq!(mid.parents.len(), 2);
        assert_eq!(mid.sequence_children().len(), 1);
    }

    #[test]
    fn add_child_requires_both_endpoints() {
        let state = state_with(vec![Template::timed("p", "P", 100)]);
        let err = apply(
            &state,
            Action::AddChildToTemplate {
                parent_id: "p".into(),
                child_id: "ghost".into(),
                start_offset_ms: Some(0),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::TemplateNotFound(id) if id == "ghost"));
    }

    #[test]
    fn add_child_surfaces_incompatible_parent_kinds() {
        let state = state_with(vec![
            Template::leaf("leaf", "Leaf", 100),
            Template::timed("timed", "Timed", 100),
            Template::leaf("c", "C", 100),
        ]);

        let err = apply(
            &state,
            Action::AddChildToTemplate {
                parent_id: "leaf".into(),
                child_id: "c".into(),
                start_offset_ms: Some(0),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Link(LinkError::IncompatibleParentKind(_))));

        let err = apply(
            &state,
            Action::AddChildToTemplate {
                parent_id: "timed".into(),
                child_id: "c".into(),
                start_offset_ms: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Link(LinkError::IncompatibleParentKind(_))));
    }

    #[test]
    fn delete_cascades_from_parents_and_children() {
        // deleting "mid": p1/p2 must drop their child entries, leaf must
        // drop its parent link
        let state = linked_family();
        let state = apply(
            &state,
            Action::DeleteTemplateById { id: "mid".into() },
        )
        .unwrap();

        assert!(state.templates.get("mid").is_none());
        let p1 = state.templates.get("p1").unwrap();
        let p2 = state.templates.get("p2").unwrap();
        let leaf = state.templates.get("leaf").unwrap();
        assert!(p1.timed_children().is_empty());
        assert!(p2.timed_children().is_empty());
        assert!(leaf.parents.is_empty());
    }

    #[test]
    fn delete_clears_focus_on_the_deleted_template() {
        let state = linked_family();
        let state = apply(
            &state,
            Action::SetFocusedTemplate {
                id: Some("mid".into()),
            },
        )
        .unwrap();
        let state = apply(
            &state,
            Action::DeleteTemplateById { id: "mid".into() },
        )
        .unwrap();
        assert_eq!(state.focused_template, None);

        // focus on an unrelated template survives
        let state2 = linked_family();
        let state2 = apply(
            &state2,
            Action::SetFocusedTemplate {
                id: Some("leaf".into()),
            },
        )
        .unwrap();
        let state2 = apply(
            &state2,
            Action::DeleteTemplateById { id: "mid".into() },
        )
        .unwrap();
        assert_eq!(state2.focused_template.as_deref(), Some("leaf"));
    }

    #[test]
    fn delete_removes_duplicate_placements() {
        let parent = Template::timed("parent", "Parent", 1000);
        let child = Template::leaf("child", "Child", 100);
        let state = state_with(vec![parent, child]);
        let state = apply(
            &state,
            Action::AddChildToTemplate {
                parent_id: "parent".into(),
                child_id: "child".into(),
                start_offset_ms: Some(0),
            },
        )
        .unwrap();
        let state = apply(
            &state,
            Action::AddChildToTemplate {
                parent_id: "parent".into(),
                child_id: "child".into(),
                start_offset_ms: Some(500),
            },
        )
        .unwrap();

        let state = apply(
            &state,
            Action::DeleteTemplateById { id: "child".into() },
        )
        .unwrap();
        assert!(state.templates.get("parent").unwrap().timed_children().is_empty());
    }

    #[test]
    fn remove_instance_by_id_detaches_from_all_parents() {
        let state = linked_family();
        let state = apply(
            &state,
            Action::RemoveInstanceById { id: "mid".into() },
        )
        .unwrap();

        // still in the library, but unparented; its own children survive
        let mid = state.templates.get("mid").unwrap();
        assert!(mid.parents.is_empty());
        assert_eq!(mid.sequence_children().len(), 1);
        assert!(state.templates.get("p1").unwrap().timed_children().is_empty());
        assert!(state.templates.get("p2").unwrap().timed_children().is_empty());
    }

    #[test]
    fn remove_instance_by_relationship_id_removes_one_edge() {
        let state = linked_family();
        let rel = state.templates.get("p1").unwrap().timed_children()[0]
            .relationship_id
            .clone();

        let state = apply(
            &state,
            Action::RemoveInstanceByRelationshipId {
                relationship_id: rel.clone(),
            },
        )
        .unwrap();

        assert!(state.templates.get("p1").unwrap().timed_children().is_empty());
        let mid = state.templates.get("mid").unwrap();
        assert!(!mid.parents.iter().any(|r| r.relationship_id == rel));
        // the p2 edge is untouched
        assert_eq!(mid.parents.len(), 1);
        assert_eq!(state.templates.get("p2").unwrap().timed_children().len(), 1);
    }

    #[test]
    fn remove_instance_by_unknown_relationship_id_is_a_noop() {
        let state = linked_family();
        let next = apply(
            &state,
            Action::RemoveInstanceByRelationshipId {
                relationship_id: "never-minted".into(),
            },
        )
        .unwrap();
        assert_eq!(next, state);
    }

    #[test]
    fn calendar_entry_requires_an_existing_template() {
        let state = state_with(vec![]);
        let err = apply(
            &state,
            Action::AddCalendarEntry {
                entry: BaseCalendarEntry::new("e1", "ghost", 0),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::TemplateNotFound(_)));
    }

    #[test]
    fn calendar_add_update_remove() {
        let state = state_with(vec![
            Template::leaf("a", "A", 100),
            Template::leaf("b", "B", 100),
        ]);
        let state = apply(
            &state,
            Action::AddCalendarEntry {
                entry: BaseCalendarEntry::new("e1", "a", 0),
            },
        )
        .unwrap();
        let state = apply(
            &state,
            Action::AddCalendarEntry {
                entry: BaseCalendarEntry::new("e2", "b", 100),
            },
        )
        .unwrap();

        // duplicate entry id
        let err = apply(
            &state,
            Action::AddCalendarEntry {
                entry: BaseCalendarEntry::new("e1", "a", 999),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(_)));

        // update keeps map position
        let state = apply(
            &state,
            Action::UpdateCalendarEntry {
                entry: BaseCalendarEntry::new("e1", "b", 500),
            },
        )
        .unwrap();
        let ids: Vec<&str> = state.calendar.keys().map(|k| k.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert_eq!(state.calendar["e1"].start_ms, 500);

        let err = apply(
            &state,
            Action::UpdateCalendarEntry {
                entry: BaseCalendarEntry::new("missing", "a", 0),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::EntryNotFound(_)));

        let state = apply(
            &state,
            Action::RemoveCalendarEntry {
                entry_id: "e1".into(),
            },
        )
        .unwrap();
        assert!(!state.calendar.contains_key("e1"));
        let err = apply(
            &state,
            Action::RemoveCalendarEntry {
                entry_id: "e1".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::EntryNotFound(_)));
    }

    #[test]
    fn removing_a_calendar_entry_clears_its_selection() {
        let state = state_with(vec![Template::leaf("a", "A", 100)]);
        let state = apply(
            &state,
            Action::AddCalendarEntry {
                entry: BaseCalendarEntry::new("e1", "a", 0),
            },
        )
        .unwrap();
        let state = apply(
            &state,
            Action::SetSelectedEntry {
                id: Some("e1".into()),
            },
        )
        .unwrap();
        let state = apply(
            &state,
            Action::RemoveCalendarEntry {
                entry_id: "e1".into(),
            },
        )
        .unwrap();
        assert_eq!(state.selected_entry, None);
    }

    #[test]
    fn calendar_and_template_mutations_are_independent() {
        let state = state_with(vec![Template::leaf("a", "A", 100)]);
        let state = apply(
            &state,
            Action::AddCalendarEntry {
                entry: BaseCalendarEntry::new("e1", "a", 0),
            },
        )
        .unwrap();

        // deleting the template leaves the entry (now dangling, the
        // validator's concern)
        let deleted = apply(
            &state,
            Action::DeleteTemplateById { id: "a".into() },
        )
        .unwrap();
        assert!(deleted.calendar.contains_key("e1"));

        // removing the entry leaves the template untouched
        let removed = apply(
            &state,
            Action::RemoveCalendarEntry {
                entry_id: "e1".into(),
            },
        )
        .unwrap();
        assert_eq!(removed.templates.get("a"), state.templates.get("a"));
    }

    #[test]
    fn update_templates_replaces_by_id_or_fails() {
        let state = state_with(vec![Template::leaf("a", "A", 100)]);
        let state = apply(
            &state,
            Action::UpdateTemplates {
                templates: vec![Template::leaf("a", "A renamed", 200)],
            },
        )
        .unwrap();
        assert_eq!(state.templates.get("a").unwrap().name, "A renamed");

        let err = apply(
            &state,
            Action::UpdateTemplates {
                templates: vec![Template::leaf("ghost", "G", 100)],
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::TemplateNotFound(_)));
    }

    #[test]
    fn batch_applies_all_actions_in_order() {
        let state = state_with(vec![]);
        let state = apply(
            &state,
            Action::Batch {
                actions: vec![
                    Action::CreateTemplate {
                        template: Template::timed("routine", "Routine", 1000),
                    },
                    Action::CreateTemplate {
                        template: Template::leaf("step", "Step", 500),
                    },
                    Action::AddChildToTemplate {
                        parent_id: "routine".into(),
                        child_id: "step".into(),
                        start_offset_ms: Some(0),
                    },
                    Action::AddCalendarEntry {
                        entry: BaseCalendarEntry::new("e1", "routine", 0),
                    },
                ],
            },
        )
        .unwrap();

        assert_eq!(state.templates.len(), 2);
        assert_eq!(
            state.templates.get("routine").unwrap().timed_children().len(),
            1
        );
        assert!(state.calendar.contains_key("e1"));
    }

    #[test]
    fn batch_is_atomic_on_failure() {
        let state = state_with(vec![Template::leaf("a", "A", 100)]);
        let before = state.clone();

        let err = apply(
            &state,
            Action::Batch {
                actions: vec![
                    Action::CreateTemplate {
                        template: Template::leaf("b", "B", 100),
                    },
                    // fails: no such template
                    Action::DeleteTemplateById { id: "ghost".into() },
                    Action::CreateTemplate {
                        template: Template::leaf("c", "C", 100),
                    },
                ],
            },
        )
        .unwrap_err();

        assert!(matches!(err, StoreError::TemplateNotFound(_)));
        // the caller's state is observably unchanged
        assert_eq!(state, before);
        assert!(state.templates.get("b").is_none());
    }

    #[test]
    fn nested_batches_fold_through() {
        let state = state_with(vec![]);
        let state = apply(
            &state,
            Action::Batch {
                actions: vec![
                    Action::CreateTemplate {
                        template: Template::leaf("a", "A", 100),
                    },
                    Action::Batch {
                        actions: vec![Action::CreateTemplate {
                            template: Template::leaf("b", "B", 100),
                        }],
                    },
                ],
            },
        )
        .unwrap();
        assert_eq!(state.templates.len(), 2);
    }
}
