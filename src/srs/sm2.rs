use chrono::{DateTime, Duration, Utc};

use crate::config::{MASTERY_THRESHOLD, MAX_EASE_FACTOR, MIN_EASE_FACTOR};
use crate::domain::{Item, SrsState};

/// Quality assumed for a correct answer when none is given (0-5 scale)
pub const DEFAULT_CORRECT_QUALITY: u8 = 4;
/// Quality assumed for a wrong answer when none is given
pub const DEFAULT_INCORRECT_QUALITY: u8 = 2;

const EASE_PENALTY: f64 = 0.2;

/// Result of one review as reported by a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewOutcome {
  pub correct: bool,
  pub quality: Option<u8>,
}

impl ReviewOutcome {
  pub fn correct() -> Self {
    Self { correct: true, quality: None }
  }

  pub fn incorrect() -> Self {
    Self { correct: false, quality: None }
  }

  pub fn from_correct(correct: bool) -> Self {
    Self { correct, quality: None }
  }

  fn quality(&self) -> u8 {
    self
      .quality
      .unwrap_or(if self.correct { DEFAULT_CORRECT_QUALITY } else { DEFAULT_INCORRECT_QUALITY })
      .min(5)
  }
}

/// Compute the next scheduling state. Identity fields are never involved.
pub fn calculate_review(current: &SrsState, outcome: ReviewOutcome, now: DateTime<Utc>) -> SrsState {
  let q = outcome.quality() as f64;

  let (repetitions, interval_days, ease_factor, mastered_hits) = if outcome.correct {
    // EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))
    let ease_delta = 0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02);
    let ease = (current.ease_factor + ease_delta).clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR);

    let interval = match current.repetitions {
      0 => 1,
      1 => 6,
      _ => ((current.interval_days as f64) * ease).round() as i64,
    };
    (current.repetitions + 1, interval, ease, current.mastered_hits + 1)
  } else {
    // Failed review: reset the streak, mastery only decays by one
    let ease = (current.ease_factor - EASE_PENALTY).clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR);
    (0, 1, ease, current.mastered_hits.saturating_sub(1))
  };

  SrsState {
    repetitions,
    interval_days,
    ease_factor,
    due_at: now + Duration::days(interval_days),
    last_reviewed_at: Some(now),
    mastered_hits,
  }
}

/// Apply a review to an item in place and return its new scheduling state
pub fn update_srs(item: &mut Item, outcome: ReviewOutcome, now: DateTime<Utc>) -> &SrsState {
  item.srs = calculate_review(&item.srs, outcome, now);
  &item.srs
}

pub fn is_new(item: &Item) -> bool {
  item.srs.repetitions == 0
}

pub fn is_due(item: &Item, now: DateTime<Utc>) -> bool {
  !is_new(item) && item.srs.due_at <= now
}

pub fn is_mastered(item: &Item) -> bool {
  item.srs.mastered_hits >= MASTERY_THRESHOLD
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fresh_item() -> Item {
    let mut item = Item::new("es-md", "spain", "provinces")
      .with_prompt_text("Madrid")
      .with_answer_text("Madrid");
    item.srs = SrsState::fresh(Utc::now());
    item
  }

  #[test]
  fn test_first_review_good() {
    let mut item = fresh_item();
    let srs = update_srs(&mut item, ReviewOutcome::correct(), Utc::now());
    assert_eq!(srs.repetitions, 1);
    assert_eq!(srs.interval_days, 1);
    assert_eq!(srs.mastered_hits, 1);
    assert!((srs.ease_factor - 2.5).abs() < 0.01);
  }

  #[test]
  fn test_second_review_good() {
    let mut item = fresh_item();
    let now = Utc::now();
    update_srs(&mut item, ReviewOutcome::correct(), now);
    let srs = update_srs(&mut item, ReviewOutcome::correct(), now);
    assert_eq!(srs.repetitions, 2);
    assert_eq!(srs.interval_days, 6);
    assert_eq!(srs.mastered_hits, 2);
  }

  #[test]
  fn test_third_review_good() {
    let mut item = fresh_item();
    item.srs.repetitions = 2;
    item.srs.interval_days = 6;
    let srs = update_srs(&mut item, ReviewOutcome::correct(), Utc::now());
    assert_eq!(srs.repetitions, 3);
    // 6 * 2.5 = 15
    assert_eq!(srs.interval_days, 15);
  }

  #[test]
  fn test_correct_correct_incorrect_scenario() {
    let mut item = fresh_item();
    let now = Utc::now();

    update_srs(&mut item, ReviewOutcome::correct(), now);
    assert_eq!((item.srs.repetitions, item.srs.interval_days, item.srs.mastered_hits), (1, 1, 1));

    update_srs(&mut item, ReviewOutcome::correct(), now);
    assert_eq!((item.srs.repetitions, item.srs.interval_days, item.srs.mastered_hits), (2, 6, 2));

    update_srs(&mut item, ReviewOutcome::incorrect(), now);
    assert_eq!(item.srs.repetitions, 0);
    assert_eq!(item.srs.interval_days, 1);
    assert_eq!(item.srs.mastered_hits, 1);
    assert!((item.srs.ease_factor - 2.3).abs() < 1e-9);
  }

  #[test]
  fn test_failed_review_resets() {
    let mut item = fresh_item();
    item.srs.repetitions = 5;
    item.srs.interval_days = 15;
    item.srs.mastered_hits = 0;
    let srs = update_srs(&mut item, ReviewOutcome::incorrect(), Utc::now());
    assert_eq!(srs.repetitions, 0);
    assert_eq!(srs.interval_days, 1);
    // Never below zero
    assert_eq!(srs.mastered_hits, 0);
    assert!(srs.ease_factor < 2.5);
  }

  #[test]
  fn test_failed_review_properties_hold_for_many_states() {
    for reps in 0..6 {
      for hits in 0..12 {
        for ease in [1.3, 1.45, 2.0, 2.5, 2.8] {
          let current = SrsState {
            repetitions: reps,
            interval_days: 7,
            ease_factor: ease,
            due_at: Utc::now(),
            last_reviewed_at: None,
            mastered_hits: hits,
          };
          let next = calculate_review(&current, ReviewOutcome::incorrect(), Utc::now());
          assert_eq!(next.repetitions, 0);
          assert_eq!(next.interval_days, 1);
          assert_eq!(next.mastered_hits, hits.saturating_sub(1));
          assert!((next.ease_factor - (ease - 0.2).clamp(1.3, 2.8)).abs() < 1e-9);
        }
      }
    }
  }

  #[test]
  fn test_easy_review_increases_ease_up_to_cap() {
    let mut item = fresh_item();
    let outcome = ReviewOutcome { correct: true, quality: Some(5) };
    for _ in 0..10 {
      update_srs(&mut item, outcome, Utc::now());
    }
    assert!((item.srs.ease_factor - MAX_EASE_FACTOR).abs() < 1e-9);
  }

  #[test]
  fn test_ease_factor_floor() {
    let mut item = fresh_item();
    for _ in 0..10 {
      update_srs(&mut item, ReviewOutcome::incorrect(), Utc::now());
    }
    assert!((item.srs.ease_factor - MIN_EASE_FACTOR).abs() < 1e-9);
  }

  #[test]
  fn test_consecutive_correct_counts_and_monotonic_interval() {
    let mut item = fresh_item();
    let mut previous_interval = 0;
    for n in 1..=9u32 {
      update_srs(&mut item, ReviewOutcome::correct(), Utc::now());
      assert_eq!(item.srs.mastered_hits, n);
      if n >= 2 {
        assert!(item.srs.interval_days >= previous_interval);
      }
      previous_interval = item.srs.interval_days;
    }
    assert!(previous_interval > 30);
  }

  #[test]
  fn test_due_at_follows_interval() {
    let mut item = fresh_item();
    let now = Utc::now();
    update_srs(&mut item, ReviewOutcome::correct(), now);
    update_srs(&mut item, ReviewOutcome::correct(), now);
    assert_eq!(item.srs.due_at, now + Duration::days(6));
    assert_eq!(item.srs.last_reviewed_at, Some(now));
  }

  #[test]
  fn test_identity_untouched() {
    let mut item = fresh_item();
    let before = item.clone();
    update_srs(&mut item, ReviewOutcome::correct(), Utc::now());
    assert_eq!(item.id, before.id);
    assert_eq!(item.prompt_text, before.prompt_text);
    assert_eq!(item.tags, before.tags);
  }

  #[test]
  fn test_new_due_mastered() {
    let mut item = fresh_item();
    let now = Utc::now();
    assert!(is_new(&item));
    assert!(!is_due(&item, now));

    update_srs(&mut item, ReviewOutcome::correct(), now);
    assert!(!is_new(&item));
    assert!(!is_due(&item, now));
    assert!(is_due(&item, now + Duration::days(2)));

    assert!(!is_mastered(&item));
    item.srs.mastered_hits = 10;
    assert!(is_mastered(&item));
    // Stable without an intervening update
    assert!(is_mastered(&item));
    assert!(is_mastered(&item));
  }
}
