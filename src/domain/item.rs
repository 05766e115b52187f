use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config;
use crate::validation::{letters_only, normalize_text};

pub type ItemId = String;

/// One side of an item: either a text or an image reference (URL or data URL)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Media {
  Text(String),
  Image(String),
}

impl Media {
  pub fn is_image(&self) -> bool {
    matches!(self, Self::Image(_))
  }
}

/// Long-term scheduling state embedded in every item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrsState {
  /// Consecutive successful reviews since the last failure
  pub repetitions: u32,
  pub interval_days: i64,
  pub ease_factor: f64,
  pub due_at: DateTime<Utc>,
  pub last_reviewed_at: Option<DateTime<Utc>>,
  /// Slow-decaying mastery score; a failure takes one point away
  pub mastered_hits: u32,
}

impl SrsState {
  pub fn fresh(now: DateTime<Utc>) -> Self {
    Self {
      repetitions: 0,
      interval_days: 0,
      ease_factor: config::DEFAULT_EASE_FACTOR,
      due_at: now,
      last_reviewed_at: None,
      mastered_hits: 0,
    }
  }
}

impl Default for SrsState {
  fn default() -> Self {
    Self::fresh(Utc::now())
  }
}

/// A single prompt/answer fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
  pub id: ItemId,
  pub quiz_id: String,
  pub topic_id: String,
  #[serde(default)]
  pub prompt_text: Option<String>,
  #[serde(default)]
  pub prompt_image: Option<String>,
  #[serde(default)]
  pub answer_text: Option<String>,
  #[serde(default)]
  pub answer_image: Option<String>,
  /// Other accepted spellings of the answer
  #[serde(default)]
  pub alt_answers: Vec<String>,
  /// Free-form tags such as `country`, `subdivisionType`, `script`
  #[serde(default)]
  pub tags: BTreeMap<String, String>,
  #[serde(default)]
  pub srs: SrsState,
}

impl Item {
  pub fn new(id: impl Into<String>, quiz_id: impl Into<String>, topic_id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      quiz_id: quiz_id.into(),
      topic_id: topic_id.into(),
      prompt_text: None,
      prompt_image: None,
      answer_text: None,
      answer_image: None,
      alt_answers: Vec::new(),
      tags: BTreeMap::new(),
      srs: SrsState::default(),
    }
  }

  pub fn with_prompt_text(mut self, text: impl Into<String>) -> Self {
    self.prompt_text = Some(text.into());
    self
  }

  pub fn with_prompt_image(mut self, image: impl Into<String>) -> Self {
    self.prompt_image = Some(image.into());
    self
  }

  pub fn with_answer_text(mut self, text: impl Into<String>) -> Self {
    self.answer_text = Some(text.into());
    self
  }

  pub fn with_answer_image(mut self, image: impl Into<String>) -> Self {
    self.answer_image = Some(image.into());
    self
  }

  pub fn with_alt_answer(mut self, alt: impl Into<String>) -> Self {
    self.alt_answers.push(alt.into());
    self
  }

  pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.tags.insert(key.into(), value.into());
    self
  }

  /// Prompt as shown in a batch preview (text preferred)
  pub fn prompt_media(&self) -> Option<Media> {
    non_empty(&self.prompt_text)
      .map(Media::Text)
      .or_else(|| non_empty(&self.prompt_image).map(Media::Image))
  }

  /// Answer as shown in a batch preview (text preferred)
  pub fn answer_media(&self) -> Option<Media> {
    non_empty(&self.answer_text)
      .map(Media::Text)
      .or_else(|| non_empty(&self.answer_image).map(Media::Image))
  }
}

fn non_empty(field: &Option<String>) -> Option<String> {
  field.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

/// Shape flags computed once per item per session.
///
/// Eligibility predicates read these instead of probing optional fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCapabilities {
  pub has_prompt_text: bool,
  pub has_prompt_image: bool,
  pub has_answer_text: bool,
  pub has_answer_image: bool,
  /// Prompt and answer text both exist and are not the same after normalisation
  pub distinct_texts: bool,
  /// Letters/digits in the answer text
  pub answer_letter_count: usize,
  pub prompt_letter_count: usize,
  /// The map provider resolves this item to a boundary feature
  pub has_map_feature: bool,
}

impl ItemCapabilities {
  pub fn of(item: &Item, has_map_feature: bool) -> Self {
    let has_prompt_text = non_empty(&item.prompt_text).is_some();
    let has_answer_text = non_empty(&item.answer_text).is_some();
    let distinct_texts = match (&item.prompt_text, &item.answer_text) {
      (Some(p), Some(a)) if has_prompt_text && has_answer_text => normalize_text(p) != normalize_text(a),
      _ => false,
    };
    Self {
      has_prompt_text,
      has_prompt_image: non_empty(&item.prompt_image).is_some(),
      has_answer_text,
      has_answer_image: non_empty(&item.answer_image).is_some(),
      distinct_texts,
      answer_letter_count: item.answer_text.as_deref().map(|a| letters_only(a).len()).unwrap_or(0),
      prompt_letter_count: item.prompt_text.as_deref().map(|p| letters_only(p).len()).unwrap_or(0),
      has_map_feature,
    }
  }

  pub fn has_prompt(&self) -> bool {
    self.has_prompt_text || self.has_prompt_image
  }

  pub fn has_answer(&self) -> bool {
    self.has_answer_text || self.has_answer_image
  }

  pub fn uses_images(&self) -> bool {
    self.has_prompt_image || self.has_answer_image
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
  pub id: String,
  pub title: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
  pub id: String,
  pub quiz_id: String,
  pub title: String,
  pub order: i64,
}
