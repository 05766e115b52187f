pub mod exercise;
pub mod item;

pub use exercise::{Choice, Exercise, ExerciseKind, FragmentSlot, MatchPair, Response, RoundResult};
pub use item::{Item, ItemCapabilities, ItemId, Media, Quiz, SrsState, Topic};
