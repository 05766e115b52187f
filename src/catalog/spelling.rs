//! Spelling: tap letter tiles to write the answer.

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::HashSet;

use super::{Entry, invalid_response};
use crate::domain::{Exercise, Media, Response, RoundResult};
use crate::validation::{letters_only, spelled_matches};

/// Upper bound on tiles once decoys are added
const MAX_TILES: usize = 18;
const DECOYS: usize = 4;
pub(super) const DECOY_LETTERS: &[char] = &[
  'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W',
  'X', 'Y', 'Z',
];

pub(super) fn generate<R: Rng + ?Sized>(target: Entry<'_>, rng: &mut R) -> Option<Exercise> {
  let item = target.item;
  let answer = item.answer_text.clone()?;

  // Image prompts first; a text prompt is only useful when it differs from the answer
  let prompt = if target.caps.has_prompt_image {
    Media::Image(item.prompt_image.clone()?)
  } else if target.caps.distinct_texts {
    Media::Text(item.prompt_text.clone()?)
  } else {
    return None;
  };

  let answer_letters = letters_only(&answer);
  if answer_letters.len() < 3 {
    return None;
  }

  let mut tiles = answer_letters.clone();
  let total = MAX_TILES.min(answer_letters.len() + DECOYS);
  while tiles.len() < total {
    if let Some(c) = DECOY_LETTERS.choose(rng) {
      tiles.push(*c);
    }
  }
  tiles.shuffle(rng);

  Some(Exercise::Spelling {
    item_id: item.id.clone(),
    prompt,
    answer,
    answer_letters,
    alternates: item.alt_answers.clone(),
    tiles,
  })
}

pub(super) fn grade(exercise: &Exercise, response: &Response) -> RoundResult {
  let (Exercise::Spelling { answer, alternates, tiles, .. }, Response::Tiles(taps)) = (exercise, response) else {
    return invalid_response(exercise);
  };

  let mut used = HashSet::new();
  if !taps.iter().all(|&i| i < tiles.len() && used.insert(i)) {
    return invalid_response(exercise);
  }

  let input: Vec<char> = taps.iter().map(|&i| tiles[i]).collect();
  let got: String = input.iter().collect();
  RoundResult::new(exercise, spelled_matches(&input, answer, alternates))
    .with_meta("got", got)
    .with_meta("want", letters_only(answer).into_iter().collect::<String>())
}
