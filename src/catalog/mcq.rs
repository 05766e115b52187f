//! Multiple choice rounds and the timed speed variant.

use rand::Rng;
use rand::seq::SliceRandom;

use super::{Entry, media_key, options_unique, take_unique};
use crate::config::{GENERATION_ATTEMPTS, MCQ_OPTION_COUNT, SPEED_WINDOW};
use crate::domain::{Choice, Exercise, ExerciseKind, Item, Media};

/// Fewest options a choice round may show
const MIN_OPTIONS: usize = 2;

fn text(field: &Option<String>) -> Option<Media> {
  field.as_ref().filter(|s| !s.trim().is_empty()).cloned().map(Media::Text)
}

fn image(field: &Option<String>) -> Option<Media> {
  field.as_ref().filter(|s| !s.trim().is_empty()).cloned().map(Media::Image)
}

/// (prompt of the target, option shown for an item) per variant
fn sides(kind: ExerciseKind, item: &Item) -> (Option<Media>, Option<Media>) {
  match kind {
    ExerciseKind::McqTextToImage => (text(&item.prompt_text), image(&item.answer_image)),
    ExerciseKind::McqImageToText => (image(&item.prompt_image), text(&item.answer_text)),
    ExerciseKind::McqTextToPrompt => (text(&item.answer_text), text(&item.prompt_text)),
    _ => (text(&item.prompt_text), text(&item.answer_text)),
  }
}

/// Build a shuffled option list: the target's option plus distinct distractors.
///
/// Returns `None` after [`GENERATION_ATTEMPTS`] when fewer than `min` distinct
/// options can be found.
pub(super) fn build_options<R, F>(
  target: &Item,
  pool: &[Entry<'_>],
  option_of: F,
  min: usize,
  limit: usize,
  rng: &mut R,
) -> Option<Vec<Choice>>
where
  R: Rng + ?Sized,
  F: Fn(&Item) -> Option<Media>,
{
  let target_option = option_of(target)?;

  for _ in 0..GENERATION_ATTEMPTS {
    let mut candidates: Vec<(&Item, Media)> = pool
      .iter()
      .filter(|e| e.item.id != target.id)
      .filter_map(|e| option_of(e.item).map(|m| (e.item, m)))
      .collect();
    candidates.shuffle(rng);

    let all = std::iter::once((target, target_option.clone())).chain(candidates);
    let unique = take_unique(all, |(_, m)| Some(media_key(m)), limit);
    if unique.len() < min {
      continue;
    }

    let mut options: Vec<Choice> = unique
      .into_iter()
      .map(|(item, media)| Choice {
        media,
        item_id: item.id.clone(),
        is_correct: item.id == target.id,
      })
      .collect();
    options.shuffle(rng);

    if !options.iter().any(|o| o.is_correct) || !options_unique(&options) {
      continue;
    }
    return Some(options);
  }
  None
}

pub(super) fn generate_mcq<R: Rng + ?Sized>(
  kind: ExerciseKind,
  target: Entry<'_>,
  pool: &[Entry<'_>],
  rng: &mut R,
) -> Option<Exercise> {
  let (prompt, _) = sides(kind, target.item);
  let prompt = prompt?;
  let options = build_options(target.item, pool, |it| sides(kind, it).1, MIN_OPTIONS, MCQ_OPTION_COUNT, rng)?;

  Some(Exercise::MultipleChoice {
    kind,
    item_id: target.item.id.clone(),
    prompt,
    options,
  })
}

/// Speed rounds reuse image-to-text, falling back to text-to-image.
pub(super) fn generate_speed<R: Rng + ?Sized>(target: Entry<'_>, pool: &[Entry<'_>], rng: &mut R) -> Option<Exercise> {
  let c = &target.caps;
  let mut variants = Vec::new();
  if c.has_prompt_image && c.has_answer_text {
    variants.push(ExerciseKind::McqImageToText);
  }
  if c.has_prompt_text && c.has_answer_image {
    variants.push(ExerciseKind::McqTextToImage);
  }

  let mcq = variants.into_iter().find_map(|kind| generate_mcq(kind, target, pool, rng))?;
  let Exercise::MultipleChoice { item_id, prompt, options, .. } = mcq else {
    return None;
  };
  Some(Exercise::Speed {
    item_id,
    prompt,
    options,
    window_ms: SPEED_WINDOW.as_millis() as u64,
  })
}
