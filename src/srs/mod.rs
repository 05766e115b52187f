pub mod batch;
pub mod sm2;

pub use batch::{BatchState, KIND_PLAN};
pub use sm2::{ReviewOutcome, calculate_review, is_due, is_mastered, is_new, update_srs};
