//! Typed effect parameters
//!
//! Each parameter is a concrete handle over a closed set of choices, so the
//! effect reads its current selection without any runtime type inspection.

use serde::{Deserialize, Serialize};

/// A closed set of options a `ChoiceParameter` selects from.
///
/// Selection ids are 1-based positions in `ALL`, matching the ids a combo box
/// reports for its items.
pub trait Choice: Copy + PartialEq + 'static {
    const ALL: &'static [Self];

    fn label(&self) -> &'static str;

    fn id(&self) -> u32 {
        Self::ALL
            .iter()
            .position(|c| c == self)
            .map_or(0, |index| index as u32 + 1)
    }

    fn from_id(id: u32) -> Option<Self> {
        let index = id.checked_sub(1)?;
        Self::ALL.get(index as usize).copied()
    }
}

/// Listener position the impulse response was captured at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Position {
    #[default]
    Bypass,
    Front,
    Back,
    Left,
    Right,
    Up,
    Down,
    LeftUp,
    RightUp,
    LeftBackDown,
    RightBackDown,
    LeftBack,
    RightBack,
}

impl Position {
    /// Name of the impulse response asset, `None` for bypass
    pub fn asset_name(&self) -> Option<&'static str> {
        match self {
            Self::Bypass => None,
            Self::Front => Some("front.wav"),
            Self::Back => Some("back.wav"),
            Self::Left => Some("left.wav"),
            Self::Right => Some("right.wav"),
            Self::Up => Some("up.wav"),
            Self::Down => Some("down.wav"),
            Self::LeftUp => Some("left50up60.wav"),
            Self::RightUp => Some("right50up60.wav"),
            Self::LeftBackDown => Some("left140down30.wav"),
            Self::RightBackDown => Some("right132down30.wav"),
            Self::LeftBack => Some("left220.wav"),
            Self::RightBack => Some("right140.wav"),
        }
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self, Self::Bypass)
    }
}

impl Choice for Position {
    const ALL: &'static [Self] = &[
        Self::Bypass,
        Self::Front,
        Self::Back,
        Self::Left,
        Self::Right,
        Self::Up,
        Self::Down,
        Self::LeftUp,
        Self::RightUp,
        Self::LeftBackDown,
        Self::RightBackDown,
        Self::LeftBack,
        Self::RightBack,
    ];

    fn label(&self) -> &'static str {
        match self {
            Self::Bypass => "Bypass",
            Self::Front => "Front",
            Self::Back => "Back",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Up => "Up",
            Self::Down => "Down",
            Self::LeftUp => "Left-Up",
            Self::RightUp => "Right-Up",
            Self::LeftBackDown => "Left-Back-Down",
            Self::RightBackDown => "Right-Back-Down",
            Self::LeftBack => "Left-Back",
            Self::RightBack => "Right-Back",
        }
    }
}

/// Dropdown-style parameter holding one selection from `C::ALL`
#[derive(Debug, Clone)]
pub struct ChoiceParameter<C: Choice> {
    name: &'static str,
    selected: C,
}

impl<C: Choice> ChoiceParameter<C> {
    pub fn new(name: &'static str, default: C) -> Self {
        Self { name, selected: default }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn selected(&self) -> C {
        self.selected
    }

    pub fn selected_id(&self) -> u32 {
        self.selected.id()
    }

    pub fn set(&mut self, choice: C) {
        self.selected = choice;
    }

    /// Select by 1-based id. Returns false and keeps the selection for unknown ids.
    pub fn set_id(&mut self, id: u32) -> bool {
        let Some(choice) = C::from_id(id) else {
            return false;
        };
        self.selected = choice;
        true
    }

    pub fn choices(&self) -> &'static [C] {
        C::ALL
    }
}
