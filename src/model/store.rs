use super::calendar::BaseCalendar;
use super::library::TemplateSet;

/// A full snapshot of engine state.
///
/// All mutation goes through the reducer (`ops::store_ops::apply`), which
/// takes a snapshot by reference and returns a new one. Readers (resolver,
/// progress calculator, CLI output) only ever borrow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub templates: TemplateSet,
    pub calendar: BaseCalendar,
    /// UI selection flags — carried through mutations, cleared when the
    /// referenced template is deleted
    pub focused_template: Option<String>,
    pub selected_entry: Option<String>,
}

impl StoreState {
    pub fn new(templates: TemplateSet, calendar: BaseCalendar) -> Self {
        StoreState {
            templates,
            calendar,
            focused_template: None,
            selected_entry: None,
        }
    }
}
