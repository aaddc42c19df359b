use crate::catalog;

/// A chosen scan option, with the user-supplied value for options that take
/// one. `value` stays `None` for bare flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedOption {
    pub id: u16,
    pub value: Option<String>,
}

/// Mutable scan configuration: the chosen scan options in selection order,
/// the (mutually exclusive) output format plus its filename, and the
/// independent extra output flags.
///
/// Ids that do not exist in the catalog, or that belong to the wrong group,
/// are silently ignored by every mutator, so the model can never reference an
/// unknown option.
#[derive(Debug, Clone, Default)]
pub struct SelectionModel {
    selected: Vec<SelectedOption>,
    output_format: Option<u16>,
    output_filename: String,
    extras: Vec<u16>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select or deselect a scan option. Selecting an already-selected id
    /// overwrites its value; deselecting an absent id is a no-op.
    pub fn toggle(&mut self, id: u16, enabled: bool, value: Option<String>) {
        if catalog::scan_option(id).is_none() {
            return;
        }
        if enabled {
            if let Some(existing) = self.selected.iter_mut().find(|o| o.id == id) {
                existing.value = value;
            } else {
                self.selected.push(SelectedOption { id, value });
            }
        } else {
            self.selected.retain(|o| o.id != id);
        }
    }

    /// Update the value of an already-selected option. Dropped silently if
    /// the option is not selected; callers that want typing to select the
    /// option use [`SelectionModel::type_value`] instead.
    pub fn update_value(&mut self, id: u16, value: &str) {
        if let Some(existing) = self.selected.iter_mut().find(|o| o.id == id) {
            existing.value = Some(value.to_string());
        }
    }

    /// A keystroke in an option's value field: updates the value if the
    /// option is selected, and selects it when the first non-empty text
    /// arrives before any checkbox interaction.
    pub fn type_value(&mut self, id: u16, text: &str) {
        self.update_value(id, text);
        if !text.is_empty() && !self.is_selected(id) {
            self.toggle(id, true, Some(text.to_string()));
        }
    }

    /// Choose the single output format (`None` clears it). The filename is
    /// kept so switching formats does not lose it.
    pub fn set_output_format(&mut self, id: Option<u16>) {
        match id {
            Some(id) if !catalog::is_output_format(id) => {}
            other => self.output_format = other,
        }
    }

    pub fn set_output_filename(&mut self, name: &str) {
        self.output_filename = name.to_string();
    }

    /// Membership toggle for an extra output flag.
    pub fn toggle_extra(&mut self, id: u16) {
        if !catalog::is_output_extra(id) {
            return;
        }
        if self.extras.contains(&id) {
            self.extras.retain(|&e| e != id);
        } else {
            self.extras.push(id);
        }
    }

    pub fn is_selected(&self, id: u16) -> bool {
        self.selected.iter().any(|o| o.id == id)
    }

    /// Chosen scan options in selection order.
    pub fn selected(&self) -> &[SelectedOption] {
        &self.selected
    }

    pub fn output_format(&self) -> Option<u16> {
        self.output_format
    }

    pub fn output_filename(&self) -> &str {
        &self.output_filename
    }

    pub fn extras(&self) -> &[u16] {
        &self.extras
    }

    /// Everything chosen, counting the output format as one entry.
    pub fn total_selected(&self) -> usize {
        self.selected.len() + usize::from(self.output_format.is_some()) + self.extras.len()
    }
}
