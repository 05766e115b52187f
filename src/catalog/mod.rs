//! Exercise catalog: eligibility, generation and grading per exercise kind.
//!
//! Eligibility is a pure function of an item's [`ItemCapabilities`].
//! Generation may legitimately fail (not enough distinct distractors, no
//! traceable grid path) and returns `None`; callers move on to another kind
//! or item. Grading always yields a [`RoundResult`].

mod fragments;
mod map;
mod matching;
mod mcq;
mod spelling;
mod truefalse;
mod wordgrid;

use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

use crate::domain::{Choice, Exercise, ExerciseKind, Item, ItemCapabilities, Media, Response, RoundResult};
use crate::geo::MapData;
use crate::validation::{image_key, normalize_text};

/// An item together with its precomputed capability flags
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
  pub item: &'a Item,
  pub caps: ItemCapabilities,
}

impl<'a> Entry<'a> {
  pub fn new(item: &'a Item, caps: ItemCapabilities) -> Self {
    Self { item, caps }
  }
}

/// Whether an item can be drilled with a given kind
pub fn eligible(kind: ExerciseKind, c: &ItemCapabilities) -> bool {
  let image_to_text = c.has_prompt_image && c.has_answer_text;
  let text_to_image = c.has_prompt_text && c.has_answer_image;

  match kind {
    ExerciseKind::McqTextToText | ExerciseKind::McqTextToPrompt => c.distinct_texts,
    ExerciseKind::McqTextToImage => text_to_image,
    ExerciseKind::McqImageToText => image_to_text,
    ExerciseKind::Fragments => image_to_text && c.answer_letter_count >= 3,
    ExerciseKind::Spelling => {
      c.has_answer_text && c.answer_letter_count >= 3 && (c.has_prompt_image || c.distinct_texts)
    }
    ExerciseKind::WordGrid => {
      let letters = if c.has_answer_text { c.answer_letter_count } else { c.prompt_letter_count };
      (image_to_text || (c.has_answer_image && c.has_prompt_text))
        && (3..=wordgrid::MAX_GRID_LETTERS).contains(&letters)
    }
    ExerciseKind::Match => c.has_prompt() && c.has_answer(),
    ExerciseKind::TrueFalse => {
      image_to_text || text_to_image || c.distinct_texts || (c.has_prompt_image && c.has_answer_image)
    }
    ExerciseKind::Speed => image_to_text || text_to_image,
    ExerciseKind::MapName => c.has_map_feature && c.has_answer_text,
    ExerciseKind::MapFlag => c.has_map_feature && c.has_prompt_image,
  }
}

/// Registry of exercise kinds bound to the session's map capability
#[derive(Debug, Clone, Copy, Default)]
pub struct ExerciseCatalog<'m> {
  map: Option<&'m MapData>,
}

impl<'m> ExerciseCatalog<'m> {
  pub fn new(map: Option<&'m MapData>) -> Self {
    Self { map }
  }

  /// Generate a single-item exercise for `target`, drawing distractors from `pool`.
  pub fn generate<R: Rng + ?Sized>(
    &self,
    kind: ExerciseKind,
    target: Entry<'_>,
    pool: &[Entry<'_>],
    rng: &mut R,
  ) -> Option<Exercise> {
    if kind.is_group() || !eligible(kind, &target.caps) {
      return None;
    }

    match kind {
      ExerciseKind::McqTextToText
      | ExerciseKind::McqTextToImage
      | ExerciseKind::McqImageToText
      | ExerciseKind::McqTextToPrompt => mcq::generate_mcq(kind, target, pool, rng),
      ExerciseKind::Speed => mcq::generate_speed(target, pool, rng),
      ExerciseKind::MapName | ExerciseKind::MapFlag => {
        let map = self.map?;
        map::generate(kind, map, target, pool, rng)
      }
      ExerciseKind::Fragments => fragments::generate(target, pool, rng),
      ExerciseKind::Spelling => spelling::generate(target, rng),
      ExerciseKind::WordGrid => wordgrid::generate(target, rng),
      ExerciseKind::TrueFalse => truefalse::generate(target, pool, rng),
      ExerciseKind::Match => None,
    }
  }

  /// Generate a group exercise over exactly the given items.
  pub fn generate_group<R: Rng + ?Sized>(
    &self,
    kind: ExerciseKind,
    items: &[Entry<'_>],
    rng: &mut R,
  ) -> Option<Exercise> {
    match kind {
      ExerciseKind::Match => {
        let eligible_items: Vec<Entry<'_>> =
          items.iter().copied().filter(|e| eligible(kind, &e.caps)).collect();
        matching::generate(&eligible_items, rng)
      }
      _ => None,
    }
  }
}

/// Grade a response. `elapsed` is the time between presentation and answer;
/// timed kinds treat anything past their window as a timeout.
pub fn grade(exercise: &Exercise, response: &Response, elapsed: Option<Duration>) -> RoundResult {
  if matches!(response, Response::Timeout) {
    return RoundResult::new(exercise, false).with_meta("timeout", true);
  }

  match exercise {
    Exercise::MultipleChoice { kind, options, .. } | Exercise::Map { kind, options, .. } => {
      grade_choice(exercise, options, response).with_meta("variant", kind.as_str())
    }
    Exercise::Speed { options, window_ms, .. } => {
      let window = Duration::from_millis(*window_ms);
      if elapsed.is_some_and(|e| e > window) {
        return RoundResult::new(exercise, false).with_meta("timeout", true);
      }
      grade_choice(exercise, options, response)
    }
    Exercise::Spelling { .. } => spelling::grade(exercise, response),
    Exercise::Fragments { .. } => fragments::grade(exercise, response),
    Exercise::WordGrid { .. } => wordgrid::grade(exercise, response),
    Exercise::Matching { .. } => matching::grade(exercise, response),
    Exercise::TrueFalse { is_true, .. } => match response {
      Response::Verdict(v) => RoundResult::new(exercise, *v == *is_true).with_meta("is_true", *is_true),
      _ => invalid_response(exercise),
    },
  }
}

fn grade_choice(exercise: &Exercise, options: &[Choice], response: &Response) -> RoundResult {
  match response {
    Response::Choice(idx) => match options.get(*idx) {
      Some(choice) => RoundResult::new(exercise, choice.is_correct).with_meta("chosen", choice.item_id.clone()),
      None => invalid_response(exercise),
    },
    _ => invalid_response(exercise),
  }
}

pub(crate) fn invalid_response(exercise: &Exercise) -> RoundResult {
  RoundResult::new(exercise, false).with_meta("invalid_response", true)
}

// ==================== Shared helpers ====================

/// Uniqueness key of a displayed option
pub(crate) fn media_key(media: &Media) -> String {
  match media {
    Media::Text(t) => format!("t:{}", normalize_text(t)),
    Media::Image(i) => format!("i:{}", image_key(i)),
  }
}

/// Keep the first `limit` entries with distinct keys, in order
pub(crate) fn take_unique<T, K>(candidates: impl IntoIterator<Item = T>, key: K, limit: usize) -> Vec<T>
where
  K: Fn(&T) -> Option<String>,
{
  let mut seen = HashSet::new();
  let mut out = Vec::new();
  for candidate in candidates {
    let Some(k) = key(&candidate) else { continue };
    if !seen.insert(k) {
      continue;
    }
    out.push(candidate);
    if out.len() >= limit {
      break;
    }
  }
  out
}

/// No two options may display the same text or image
pub(crate) fn options_unique(options: &[Choice]) -> bool {
  let mut keys = HashSet::new();
  options.iter().all(|o| keys.insert(media_key(&o.media)))
}
