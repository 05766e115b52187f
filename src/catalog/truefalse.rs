//! True/false: is the shown answer the right one for the prompt?

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

use super::{Entry, media_key};
use crate::config::TRUE_FALSE_ATTEMPTS;
use crate::domain::{Exercise, Item, Media};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pairing {
  ImageText,
  TextImage,
  TextText,
  ImageImage,
}

fn pairings(entry: &Entry<'_>) -> Vec<Pairing> {
  let c = &entry.caps;
  let mut out = Vec::with_capacity(4);
  if c.has_prompt_image && c.has_answer_text {
    out.push(Pairing::ImageText);
  }
  if c.has_prompt_text && c.has_answer_image {
    out.push(Pairing::TextImage);
  }
  if c.distinct_texts {
    out.push(Pairing::TextText);
  }
  if c.has_prompt_image && c.has_answer_image {
    out.push(Pairing::ImageImage);
  }
  out
}

fn prompt_side(item: &Item, pairing: Pairing) -> Option<Media> {
  match pairing {
    Pairing::ImageText | Pairing::ImageImage => item.prompt_image.clone().map(Media::Image),
    Pairing::TextImage | Pairing::TextText => item.prompt_text.clone().map(Media::Text),
  }
}

fn answer_side(item: &Item, pairing: Pairing) -> Option<Media> {
  let answer = match pairing {
    Pairing::ImageText | Pairing::TextText => item.answer_text.clone().map(Media::Text),
    Pairing::TextImage | Pairing::ImageImage => item.answer_image.clone().map(Media::Image),
  };
  answer.filter(|m| match m {
    Media::Text(t) | Media::Image(t) => !t.trim().is_empty(),
  })
}

pub(super) fn generate<R: Rng + ?Sized>(target: Entry<'_>, pool: &[Entry<'_>], rng: &mut R) -> Option<Exercise> {
  let kinds = pairings(&target);
  let item = target.item;

  for _ in 0..TRUE_FALSE_ATTEMPTS {
    let Some(&pairing) = kinds.choose(rng) else {
      return None;
    };
    let (Some(prompt), Some(answer)) = (prompt_side(item, pairing), answer_side(item, pairing)) else {
      continue;
    };

    if rng.random_bool(0.5) {
      return Some(Exercise::TrueFalse {
        item_id: item.id.clone(),
        prompt,
        shown_answer: answer,
        is_true: true,
      });
    }

    // A false statement borrows another item's answer of the same form
    let right = media_key(&answer);
    let mut others: Vec<&Entry<'_>> = pool.iter().filter(|e| e.item.id != item.id).collect();
    others.shuffle(rng);
    let wrong = others
      .into_iter()
      .filter_map(|e| answer_side(e.item, pairing))
      .find(|m| media_key(m) != right);

    if let Some(shown_answer) = wrong {
      return Some(Exercise::TrueFalse {
        item_id: item.id.clone(),
        prompt,
        shown_answer,
        is_true: false,
      });
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::super::fixtures::*;
  use super::*;
  use crate::catalog::grade;
  use crate::domain::{ItemCapabilities, Response};
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  #[test]
  fn test_true_and_false_statements() {
    let items = text_only();
    let caps = caps(&items);
    let pool = entries(&items, &caps);
    let (mut trues, mut falses) = (0, 0);

    for seed in 0..40 {
      let mut rng = StdRng::seed_from_u64(seed);
      let ex = generate(pool[0], &pool, &mut rng).unwrap();
      let Exercise::TrueFalse { prompt, shown_answer, is_true, .. } = &ex else { panic!("expected true/false") };
      assert_eq!(prompt, &Media::Text("France".into()));
      if *is_true {
        trues += 1;
        assert_eq!(shown_answer, &Media::Text("Paris".into()));
      } else {
        falses += 1;
        assert_ne!(shown_answer, &Media::Text("Paris".into()));
      }
      assert!(grade(&ex, &Response::Verdict(*is_true), None).correct);
      assert!(!grade(&ex, &Response::Verdict(!*is_true), None).correct);
    }
    assert!(trues > 0 && falses > 0);
  }

  #[test]
  fn test_false_answer_never_matches_true_answer() {
    let items = vec![
      Item::new("a", "q", "t").with_prompt_text("Lugo").with_answer_text("Galicia"),
      Item::new("b", "q", "t").with_prompt_text("Vigo").with_answer_text("galicia"),
    ];
    let caps = caps(&items);
    let pool = entries(&items, &caps);
    for seed in 0..20 {
      let mut rng = StdRng::seed_from_u64(seed);
      // Only a true statement can be built
      if let Some(Exercise::TrueFalse { is_true, .. }) = generate(pool[0], &pool, &mut rng) {
        assert!(is_true);
      }
    }
  }

  #[test]
  fn test_no_pairing_no_exercise() {
    let item = Item::new("a", "q", "t").with_prompt_text("Lugo").with_answer_text("lugo");
    let caps = ItemCapabilities::of(&item, false);
    let mut rng = StdRng::seed_from_u64(0);
    assert!(generate(Entry::new(&item, caps), &[], &mut rng).is_none());
  }
}
