//! Matching: pair every prompt with its answer. The only group kind.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

use super::{Entry, invalid_response, media_key};
use crate::config::MATCH_PAIR_COUNT;
use crate::domain::{Exercise, Item, MatchPair, Media, Response, RoundResult};

/// Matching shows images when an item has them
fn left_side(item: &Item) -> Option<Media> {
  item
    .prompt_image
    .clone()
    .map(Media::Image)
    .or_else(|| item.prompt_text.clone().map(Media::Text))
}

fn right_side(item: &Item) -> Option<Media> {
  item
    .answer_image
    .clone()
    .map(Media::Image)
    .or_else(|| item.answer_text.clone().map(Media::Text))
}

/// Exactly [`MATCH_PAIR_COUNT`] pairs with no key collision on either side
pub(super) fn generate<R: Rng + ?Sized>(items: &[Entry<'_>], rng: &mut R) -> Option<Exercise> {
  let mut candidates: Vec<&Entry<'_>> = items.iter().collect();
  candidates.shuffle(rng);

  let mut left_keys = HashSet::new();
  let mut right_keys = HashSet::new();
  let mut pairs = Vec::with_capacity(MATCH_PAIR_COUNT);
  for entry in candidates {
    let (Some(left), Some(right)) = (left_side(entry.item), right_side(entry.item)) else {
      continue;
    };
    let (lk, rk) = (media_key(&left), media_key(&right));
    if left_keys.contains(&lk) || right_keys.contains(&rk) {
      continue;
    }
    left_keys.insert(lk);
    right_keys.insert(rk);
    pairs.push(MatchPair {
      item_id: entry.item.id.clone(),
      left,
      right,
    });
    if pairs.len() == MATCH_PAIR_COUNT {
      break;
    }
  }
  if pairs.len() < MATCH_PAIR_COUNT {
    return None;
  }

  let mut right_order: Vec<usize> = (0..pairs.len()).collect();
  right_order.shuffle(rng);
  Some(Exercise::Matching { pairs, right_order })
}

/// Correct only when every pair was matched without a single wrong attempt
pub(super) fn grade(exercise: &Exercise, response: &Response) -> RoundResult {
  let (Exercise::Matching { pairs, right_order }, Response::Pairs(attempts)) = (exercise, response) else {
    return invalid_response(exercise);
  };

  let mut matched = HashSet::new();
  let mut mistakes = 0u32;
  for &(left, right_pos) in attempts {
    let Some(&right) = right_order.get(right_pos) else {
      return invalid_response(exercise);
    };
    if left >= pairs.len() || matched.contains(&left) || matched.contains(&right) {
      continue;
    }
    if left == right {
      matched.insert(left);
    } else {
      mistakes += 1;
    }
  }

  let complete = matched.len() == pairs.len();
  RoundResult::new(exercise, complete && mistakes == 0)
    .with_meta("mistakes", mistakes)
    .with_meta("matched", matched.len())
}
