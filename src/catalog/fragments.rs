//! Fragment assembly: rebuild the answer from letter chunks.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

use super::{Entry, invalid_response};
use crate::config::GENERATION_ATTEMPTS;
use crate::domain::{Exercise, FragmentSlot, Media, Response, RoundResult};
use crate::validation::{letters_only, split_words};

/// Decoy fragments collected before sampling stops
const DECOY_TARGET: usize = 8;
const MAX_OPTIONS: usize = 12;

fn lower_letters(word: &str) -> Vec<char> {
  letters_only(word).into_iter().flat_map(char::to_lowercase).collect()
}

/// Split a word's letters into 2-4 chunks, avoiding single letters where a
/// longer chunk can donate one.
pub fn split_fragments(letters: &[char]) -> Option<Vec<String>> {
  let n = letters.len();
  if n < 3 {
    return None;
  }
  let parts = match n {
    9.. => 4,
    6.. => 3,
    _ => 2,
  };

  let base = n / parts;
  let rem = n % parts;
  let mut sizes: Vec<usize> = (0..parts).map(|i| base + usize::from(i < rem)).collect();
  for i in 0..sizes.len() {
    if sizes[i] == 1 {
      if let Some(j) = (0..sizes.len()).find(|&j| j != i && sizes[j] > 2) {
        sizes[i] += 1;
        sizes[j] -= 1;
      }
    }
  }

  let mut out = Vec::with_capacity(parts);
  let mut pos = 0;
  for size in sizes {
    out.push(letters[pos..pos + size].iter().collect::<String>());
    pos += size;
  }
  Some(out.into_iter().filter(|s| !s.is_empty()).collect())
}

/// Chunks for one word: short words stay whole
fn word_fragments(word: &str) -> Vec<String> {
  let letters = lower_letters(word);
  match letters.len() {
    0 => Vec::new(),
    1 | 2 => vec![letters.into_iter().collect()],
    _ => split_fragments(&letters).unwrap_or_default(),
  }
}

/// Answer as words of lowercase letters, single-spaced
fn normalized_answer(answer: &str) -> String {
  split_words(answer)
    .into_iter()
    .map(|w| lower_letters(w).into_iter().collect::<String>())
    .filter(|w| !w.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

pub(super) fn generate<R: Rng + ?Sized>(target: Entry<'_>, pool: &[Entry<'_>], rng: &mut R) -> Option<Exercise> {
  let item = target.item;
  let prompt = item.prompt_image.clone()?;
  let answer = item.answer_text.clone()?;

  let word_frags: Vec<Vec<String>> = split_words(&answer)
    .into_iter()
    .map(word_fragments)
    .filter(|f| !f.is_empty())
    .collect();

  let mut slots = Vec::new();
  for (i, frags) in word_frags.iter().enumerate() {
    slots.extend(std::iter::repeat_n(FragmentSlot::Fragment, frags.len()));
    if i + 1 < word_frags.len() {
      slots.push(FragmentSlot::Gap);
    }
  }
  let parts: Vec<String> = word_frags.into_iter().flatten().collect();
  if parts.len() < 2 {
    return None;
  }

  for _ in 0..GENERATION_ATTEMPTS {
    let mut others: Vec<&Entry<'_>> = pool.iter().filter(|e| e.item.id != item.id).collect();
    others.shuffle(rng);

    let mut decoys = Vec::new();
    for other in others {
      let Some(text) = other.item.answer_text.as_deref() else { continue };
      decoys.extend(split_words(text).into_iter().flat_map(word_fragments));
      if decoys.len() >= DECOY_TARGET {
        break;
      }
    }

    let part_set: HashSet<&str> = parts.iter().map(String::as_str).collect();
    let mut seen: HashSet<String> = parts.iter().cloned().collect();
    let mut rest: Vec<String> = decoys
      .into_iter()
      .filter(|d| !part_set.contains(d.as_str()) && seen.insert(d.clone()))
      .collect();
    rest.shuffle(rng);

    let need = (parts.len() + 2).max(MAX_OPTIONS.min(parts.len() + 7));
    rest.truncate(need.saturating_sub(parts.len()));

    let mut options: Vec<String> = parts.iter().cloned().chain(rest).collect();
    options.shuffle(rng);

    // Every answer chunk must be placeable from the options
    if parts.iter().all(|p| options.contains(p)) {
      return Some(Exercise::Fragments {
        item_id: item.id.clone(),
        prompt: Media::Image(prompt),
        answer,
        slots,
        fragments: parts,
        options,
      });
    }
  }
  None
}

pub(super) fn grade(exercise: &Exercise, response: &Response) -> RoundResult {
  let (Exercise::Fragments { answer, slots, options, .. }, Response::Tiles(taps)) = (exercise, response) else {
    return invalid_response(exercise);
  };

  let mut unique = HashSet::new();
  if !taps.iter().all(|&i| i < options.len() && unique.insert(i)) {
    return invalid_response(exercise);
  }

  let mut tapped = taps.iter().map(|&i| options[i].as_str());
  let mut got = String::new();
  for slot in slots {
    match slot {
      FragmentSlot::Fragment => got.push_str(tapped.next().unwrap_or_default()),
      FragmentSlot::Gap => got.push(' '),
    }
  }
  let extra = tapped.next().is_some();

  let got = got.to_lowercase();
  let want = normalized_answer(answer);
  RoundResult::new(exercise, !extra && got == want)
    .with_meta("got", got)
    .with_meta("want", want)
}

#[cfg(test)]
mod tests {
  use super::super::fixtures::*;
  use super::*;
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
  }

  #[test]
  fn test_split_sizes() {
    assert_eq!(split_fragments(&chars("abc")), Some(vec!["ab".into(), "c".into()]));
    assert_eq!(split_fragments(&chars("lugo")), Some(vec!["lu".into(), "go".into()]));
    assert_eq!(split_fragments(&chars("toledo")), Some(vec!["to".into(), "le".into(), "do".into()]));
    assert_eq!(
      split_fragments(&chars("asturias")),
      Some(vec!["ast".into(), "uri".into(), "as".into()])
    );
    assert_eq!(
      split_fragments(&chars("salamanca")),
      Some(vec!["sal".into(), "am".into(), "an".into(), "ca".into()])
    );
    assert_eq!(split_fragments(&chars("ab")), None);
  }

  #[test]
  fn test_generate_multi_word_answer() {
    let items = provinces();
    let caps = caps(&items);
    let pool = entries(&items, &caps);
    let mut rng = StdRng::seed_from_u64(12);
    // "Region of Murcia"
    let ex = generate(pool[5], &pool, &mut rng).unwrap();
    let Exercise::Fragments { slots, fragments, options, .. } = &ex else { panic!("expected fragments") };
    assert_eq!(slots.iter().filter(|s| **s == FragmentSlot::Gap).count(), 2);
    assert_eq!(slots.iter().filter(|s| **s == FragmentSlot::Fragment).count(), fragments.len());
    assert!(fragments.iter().all(|f| options.contains(f)));
    assert!(options.len() >= fragments.len() + 2);
    assert!(options.len() <= MAX_OPTIONS.max(fragments.len() + 2));
  }

  #[test]
  fn test_grade_in_order_is_correct() {
    let items = provinces();
    let caps = caps(&items);
    let pool = entries(&items, &caps);
    let mut rng = StdRng::seed_from_u64(3);
    let ex = generate(pool[3], &pool, &mut rng).unwrap();
    let Exercise::Fragments { fragments, options, .. } = &ex else { panic!("expected fragments") };

    let taps: Vec<usize> = fragments.iter().map(|f| options.iter().position(|o| o == f).unwrap()).collect();
    let result = grade(&ex, &Response::Tiles(taps.clone()));
    assert!(result.correct);
    assert_eq!(result.meta["want"], "asturias");

    let mut reversed = taps;
    reversed.reverse();
    assert!(!grade(&ex, &Response::Tiles(reversed)).correct);
    assert!(!grade(&ex, &Response::Tiles(vec![0, 0])).correct);
    assert!(!grade(&ex, &Response::Choice(0)).correct);
  }

  #[test]
  fn test_needs_prompt_image() {
    let items = text_only();
    let caps = caps(&items);
    let pool = entries(&items, &caps);
    let mut rng = StdRng::seed_from_u64(1);
    assert!(generate(pool[0], &pool, &mut rng).is_none());
  }
}
