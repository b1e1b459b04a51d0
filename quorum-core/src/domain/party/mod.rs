pub mod selection;

pub use selection::{retained_count, rotate_party, select_party, selection_score};
