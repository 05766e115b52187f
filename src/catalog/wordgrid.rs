//! Word grid: trace the answer through orthogonally adjacent letter cells.

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::HashSet;

use super::spelling::DECOY_LETTERS;
use super::{Entry, invalid_response};
use crate::domain::{Exercise, Media, Response, RoundResult};
use crate::validation::letters_only;

/// Largest answer a 6x6 grid holds
pub(super) const MAX_GRID_LETTERS: usize = 36;

/// Random walks tried before giving up on a grid
const PATH_ATTEMPTS: usize = 100;

/// Side length of the square grid for an answer of `letters` letters
pub fn grid_size_for(letters: usize) -> usize {
  match letters {
    0..=4 => 3,
    5..=8 => 4,
    9..=12 => 5,
    _ => 6,
  }
}

fn neighbors(idx: usize, size: usize) -> Vec<usize> {
  let (r, c) = (idx / size, idx % size);
  let mut out = Vec::with_capacity(4);
  if r > 0 {
    out.push(idx - size);
  }
  if r + 1 < size {
    out.push(idx + size);
  }
  if c > 0 {
    out.push(idx - 1);
  }
  if c + 1 < size {
    out.push(idx + 1);
  }
  out
}

fn adjacent(a: usize, b: usize, size: usize) -> bool {
  let (ra, ca) = (a / size, a % size);
  let (rb, cb) = (b / size, b % size);
  ra.abs_diff(rb) + ca.abs_diff(cb) == 1
}

/// Self-avoiding random walk of `len` cells
fn build_path<R: Rng + ?Sized>(size: usize, len: usize, rng: &mut R) -> Option<Vec<usize>> {
  let total = size * size;
  'attempt: for _ in 0..PATH_ATTEMPTS {
    let start = rng.random_range(0..total);
    let mut path = vec![start];
    let mut used = HashSet::from([start]);

    while path.len() < len {
      let last = path[path.len() - 1];
      let open: Vec<usize> = neighbors(last, size).into_iter().filter(|i| !used.contains(i)).collect();
      let Some(&next) = open.choose(rng) else {
        continue 'attempt;
      };
      path.push(next);
      used.insert(next);
    }
    return Some(path);
  }
  None
}

pub(super) fn generate<R: Rng + ?Sized>(target: Entry<'_>, rng: &mut R) -> Option<Exercise> {
  let item = target.item;
  let image = item.prompt_image.clone().or_else(|| item.answer_image.clone())?;
  let answer = item.answer_text.clone().or_else(|| item.prompt_text.clone())?;

  let letters = letters_only(&answer);
  if letters.len() < 3 || letters.len() > MAX_GRID_LETTERS {
    return None;
  }
  let size = grid_size_for(letters.len());
  let path = build_path(size, letters.len(), rng)?;

  let mut grid = vec!['\0'; size * size];
  for (cell, letter) in path.iter().zip(&letters) {
    grid[*cell] = *letter;
  }
  let mut fill: Vec<char> = DECOY_LETTERS.to_vec();
  for cell in grid.iter_mut().filter(|c| **c == '\0') {
    fill.shuffle(rng);
    *cell = fill[0];
  }

  Some(Exercise::WordGrid {
    item_id: item.id.clone(),
    prompt: Media::Image(image),
    answer,
    letters,
    size,
    grid,
  })
}

pub(super) fn grade(exercise: &Exercise, response: &Response) -> RoundResult {
  let (Exercise::WordGrid { letters, size, grid, .. }, Response::Path(cells)) = (exercise, response) else {
    return invalid_response(exercise);
  };

  let mut used = HashSet::new();
  let in_bounds = cells.iter().all(|&i| i < grid.len() && used.insert(i));
  let connected = cells.windows(2).all(|w| adjacent(w[0], w[1], *size));
  if !in_bounds || !connected {
    return invalid_response(exercise);
  }

  let got: String = cells.iter().map(|&i| grid[i]).collect();
  let want: String = letters.iter().collect();
  RoundResult::new(exercise, got == want)
    .with_meta("got", got)
    .with_meta("want", want)
}
