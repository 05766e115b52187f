use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::item::{ItemId, Media};

/// The fixed set of mini-game kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExerciseKind {
  #[serde(rename = "mcq_t2t")]
  McqTextToText,
  #[serde(rename = "mcq_t2i")]
  McqTextToImage,
  #[serde(rename = "mcq_i2t")]
  McqImageToText,
  #[serde(rename = "mcq_t2p")]
  McqTextToPrompt,
  #[serde(rename = "fragments")]
  Fragments,
  #[serde(rename = "spell")]
  Spelling,
  #[serde(rename = "wordgrid")]
  WordGrid,
  #[serde(rename = "match")]
  Match,
  #[serde(rename = "truefalse")]
  TrueFalse,
  #[serde(rename = "speed")]
  Speed,
  #[serde(rename = "map_name")]
  MapName,
  #[serde(rename = "map_flag")]
  MapFlag,
}

impl ExerciseKind {
  pub const ALL: [ExerciseKind; 12] = [
    Self::McqTextToText,
    Self::McqTextToImage,
    Self::McqImageToText,
    Self::McqTextToPrompt,
    Self::Fragments,
    Self::Spelling,
    Self::WordGrid,
    Self::Match,
    Self::TrueFalse,
    Self::Speed,
    Self::MapName,
    Self::MapFlag,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::McqTextToText => "mcq_t2t",
      Self::McqTextToImage => "mcq_t2i",
      Self::McqImageToText => "mcq_i2t",
      Self::McqTextToPrompt => "mcq_t2p",
      Self::Fragments => "fragments",
      Self::Spelling => "spell",
      Self::WordGrid => "wordgrid",
      Self::Match => "match",
      Self::TrueFalse => "truefalse",
      Self::Speed => "speed",
      Self::MapName => "map_name",
      Self::MapFlag => "map_flag",
    }
  }

  /// Display name for the presentation layer
  pub fn label(&self) -> &'static str {
    match self {
      Self::McqTextToText => "Text-Text",
      Self::McqTextToImage => "Text-Image",
      Self::McqImageToText => "Image-Text",
      Self::McqTextToPrompt => "Prompt",
      Self::Fragments => "Fragments",
      Self::Spelling => "Spelling",
      Self::WordGrid => "Word Grid",
      Self::Match => "Match",
      Self::TrueFalse => "True/False",
      Self::Speed => "Speed",
      Self::MapName => "Map Name",
      Self::MapFlag => "Map Flag",
    }
  }

  /// Group kinds drill several items at once and are not scheduled per item
  pub fn is_group(&self) -> bool {
    matches!(self, Self::Match)
  }

  /// Kinds graded against a countdown
  pub fn is_timed(&self) -> bool {
    matches!(self, Self::Speed)
  }
}

impl std::str::FromStr for ExerciseKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|k| k.as_str() == s)
      .ok_or_else(|| format!("unknown exercise kind '{}'", s))
  }
}

/// One selectable option in a choice-based exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
  pub media: Media,
  pub item_id: ItemId,
  pub is_correct: bool,
}

/// Layout slot of a fragment exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentSlot {
  Fragment,
  /// Word boundary
  Gap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
  pub item_id: ItemId,
  pub left: Media,
  pub right: Media,
}

/// A concrete, presentable exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Exercise {
  MultipleChoice {
    kind: ExerciseKind,
    item_id: ItemId,
    prompt: Media,
    options: Vec<Choice>,
  },
  Speed {
    item_id: ItemId,
    prompt: Media,
    options: Vec<Choice>,
    window_ms: u64,
  },
  Map {
    kind: ExerciseKind,
    item_id: ItemId,
    /// Key of the highlighted boundary feature in the session's map data
    feature: String,
    options: Vec<Choice>,
  },
  Fragments {
    item_id: ItemId,
    prompt: Media,
    answer: String,
    slots: Vec<FragmentSlot>,
    fragments: Vec<String>,
    options: Vec<String>,
  },
  Spelling {
    item_id: ItemId,
    prompt: Media,
    answer: String,
    answer_letters: Vec<char>,
    /// Other accepted spellings
    #[serde(default)]
    alternates: Vec<String>,
    tiles: Vec<char>,
  },
  WordGrid {
    item_id: ItemId,
    prompt: Media,
    answer: String,
    letters: Vec<char>,
    size: usize,
    grid: Vec<char>,
  },
  Matching {
    pairs: Vec<MatchPair>,
    /// Display order of the right column as indexes into `pairs`
    right_order: Vec<usize>,
  },
  TrueFalse {
    item_id: ItemId,
    prompt: Media,
    shown_answer: Media,
    is_true: bool,
  },
}

impl Exercise {
  pub fn kind(&self) -> ExerciseKind {
    match self {
      Self::MultipleChoice { kind, .. } | Self::Map { kind, .. } => *kind,
      Self::Speed { .. } => ExerciseKind::Speed,
      Self::Fragments { .. } => ExerciseKind::Fragments,
      Self::Spelling { .. } => ExerciseKind::Spelling,
      Self::WordGrid { .. } => ExerciseKind::WordGrid,
      Self::Matching { .. } => ExerciseKind::Match,
      Self::TrueFalse { .. } => ExerciseKind::TrueFalse,
    }
  }

  /// The single target item, if this is a single-item exercise
  pub fn target(&self) -> Option<&ItemId> {
    match self {
      Self::MultipleChoice { item_id, .. }
      | Self::Speed { item_id, .. }
      | Self::Map { item_id, .. }
      | Self::Fragments { item_id, .. }
      | Self::Spelling { item_id, .. }
      | Self::WordGrid { item_id, .. }
      | Self::TrueFalse { item_id, .. } => Some(item_id),
      Self::Matching { .. } => None,
    }
  }

  /// Every item drilled by this exercise
  pub fn item_ids(&self) -> Vec<ItemId> {
    match self {
      Self::Matching { pairs, .. } => pairs.iter().map(|p| p.item_id.clone()).collect(),
      other => other.target().cloned().into_iter().collect(),
    }
  }
}

/// What the learner did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Response {
  /// Index into the exercise's options
  Choice(usize),
  /// Tile or fragment option indexes in tap order
  Tiles(Vec<usize>),
  /// Grid cell indexes in trace order
  Path(Vec<usize>),
  /// Attempted (left position, right display position) pairs in order
  Pairs(Vec<(usize, usize)>),
  /// True/false verdict
  Verdict(bool),
  /// The answer window elapsed without input
  Timeout,
}

/// Graded outcome of one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
  pub kind: ExerciseKind,
  pub correct: bool,
  pub item_ids: Vec<ItemId>,
  /// Kind-specific diagnostics (variant, mistakes, got/want, timeout)
  #[serde(default)]
  pub meta: BTreeMap<String, serde_json::Value>,
}

impl RoundResult {
  pub fn new(exercise: &Exercise, correct: bool) -> Self {
    Self {
      kind: exercise.kind(),
      correct,
      item_ids: exercise.item_ids(),
      meta: BTreeMap::new(),
    }
  }

  pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
    self.meta.insert(key.to_string(), value.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_kind_as_str_roundtrip() {
    for kind in ExerciseKind::ALL {
      assert_eq!(kind.as_str().parse::<ExerciseKind>(), Ok(kind));
    }
    assert!("mapmcq".parse::<ExerciseKind>().is_err());
  }

  #[test]
  fn test_kind_serde_uses_short_ids() {
    let json = serde_json::to_string(&ExerciseKind::McqImageToText).unwrap();
    assert_eq!(json, "\"mcq_i2t\"");
  }

  #[test]
  fn test_only_match_is_group() {
    let groups: Vec<_> = ExerciseKind::ALL.into_iter().filter(|k| k.is_group()).collect();
    assert_eq!(groups, vec![ExerciseKind::Match]);
  }

  #[test]
  fn test_matching_item_ids() {
    let pairs = (0..4)
      .map(|i| MatchPair {
        item_id: format!("i{}", i),
        left: Media::Text(format!("L{}", i)),
        right: Media::Text(format!("R{}", i)),
      })
      .collect();
    let ex = Exercise::Matching { pairs, right_order: vec![2, 0, 3, 1] };
    assert_eq!(ex.kind(), ExerciseKind::Match);
    assert!(ex.target().is_none());
    assert_eq!(ex.item_ids(), vec!["i0", "i1", "i2", "i3"]);
  }

  #[test]
  fn test_response_json_shape() {
    let json = serde_json::to_string(&Response::Choice(2)).unwrap();
    assert_eq!(json, r#"{"type":"choice","value":2}"#);
    let back: Response = serde_json::from_str(r#"{"type":"timeout"}"#).unwrap();
    assert_eq!(back, Response::Timeout);
  }
}
