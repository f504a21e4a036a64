pub mod board;
pub mod icons;
pub mod progress;

pub use board::{render_board, render_config_panel, render_load_error};
pub use progress::SavingSpinner;
