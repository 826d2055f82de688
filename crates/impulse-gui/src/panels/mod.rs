//! UI panels

mod parameters;
mod player_header;
mod thumbnail;

pub use parameters::ParametersPanel;
pub use player_header::{PlayerHeaderAction, PlayerHeaderPanel};
pub use thumbnail::ThumbnailPanel;
