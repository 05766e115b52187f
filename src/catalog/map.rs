//! Map rounds: a highlighted boundary with name or flag options.

use rand::Rng;

use super::Entry;
use super::mcq::build_options;
use crate::config::MAP_OPTION_COUNT;
use crate::domain::{Exercise, ExerciseKind, Item, Media};
use crate::geo::MapData;

fn option_of(kind: ExerciseKind, item: &Item) -> Option<Media> {
  let (field, wrap): (&Option<String>, fn(String) -> Media) = match kind {
    ExerciseKind::MapFlag => (&item.prompt_image, Media::Image),
    _ => (&item.answer_text, Media::Text),
  };
  field.as_ref().filter(|s| !s.trim().is_empty()).cloned().map(wrap)
}

pub(super) fn generate<R: Rng + ?Sized>(
  kind: ExerciseKind,
  map: &MapData,
  target: Entry<'_>,
  pool: &[Entry<'_>],
  rng: &mut R,
) -> Option<Exercise> {
  let feature = map.feature_for(&target.item.id)?;
  let options = build_options(
    target.item,
    pool,
    |it| option_of(kind, it),
    MAP_OPTION_COUNT,
    MAP_OPTION_COUNT,
    rng,
  )?;

  Some(Exercise::Map {
    kind,
    item_id: target.item.id.clone(),
    feature: feature.key.clone(),
    options,
  })
}
