//! Effect parameter controls

use egui::{ComboBox, RichText, Ui};
use impulse_core::{Choice, ChoiceParameter, Position};

pub struct ParametersPanel;

impl ParametersPanel {
    pub fn new() -> Self {
        Self
    }

    /// Draw the position dropdown. Returns the id of a newly picked item.
    pub fn ui(&mut self, ui: &mut Ui, position: &ChoiceParameter<Position>, bypassed: bool) -> Option<u32> {
        let mut picked = None;

        ui.horizontal(|ui| {
            let current = position.selected();
            ComboBox::from_label(position.name())
                .selected_text(current.label())
                .width(160.0)
                .show_ui(ui, |ui| {
                    for choice in position.choices() {
                        if ui.selectable_label(*choice == current, choice.label()).clicked() && *choice != current {
                            picked = Some(choice.id());
                        }
                    }
                });

            if bypassed {
                ui.label(RichText::new("bypassed").weak());
            }
        });

        picked
    }
}
