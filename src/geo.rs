//! Geographic boundary lookup for the map-based exercise kinds.
//!
//! A [`MapProvider`] turns a session pool into optional [`MapData`]. `None`
//! disables both map kinds for the session.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::{Item, ItemId};
use crate::validation::normalize_place_name;

/// Fewest resolvable items for map rounds to be worth offering
pub const MIN_MAP_ITEMS: usize = 4;

/// Name prefixes dropped before indexing, matched case-insensitively
const NAME_PREFIXES: [&str; 9] = [
  "województwo ",
  "wojewodztwo ",
  "voivodeship of ",
  "canton of ",
  "province of ",
  "state of ",
  "district of ",
  "prefecture of ",
  "federated state of ",
];

/// One polygon: outer ring first, then holes. Points are `[lon, -lat]`.
pub type Polygon = Vec<Vec<[f64; 2]>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub min_x: f64,
  pub min_y: f64,
  pub max_x: f64,
  pub max_y: f64,
}

impl BoundingBox {
  fn empty() -> Self {
    Self {
      min_x: f64::INFINITY,
      min_y: f64::INFINITY,
      max_x: f64::NEG_INFINITY,
      max_y: f64::NEG_INFINITY,
    }
  }

  fn extend(&mut self, [x, y]: [f64; 2]) {
    self.min_x = self.min_x.min(x);
    self.min_y = self.min_y.min(y);
    self.max_x = self.max_x.max(x);
    self.max_y = self.max_y.max(y);
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFeature {
  /// Stable key referenced by map exercises
  pub key: String,
  pub name: String,
  pub polygons: Vec<Polygon>,
}

/// Projected boundaries plus the item → feature resolution for one pool
#[derive(Debug, Clone, Serialize)]
pub struct MapData {
  pub features: Vec<MapFeature>,
  pub bbox: BoundingBox,
  #[serde(skip)]
  item_features: HashMap<ItemId, usize>,
}

impl MapData {
  /// Project a GeoJSON `FeatureCollection` and resolve each item's answer
  /// text (then alternates) against the feature name index.
  pub fn build(geojson: &Value, items: &[Item]) -> Self {
    let raw = geojson
      .get("features")
      .and_then(Value::as_array)
      .map(Vec::as_slice)
      .unwrap_or_default();

    let mut bbox = BoundingBox::empty();
    let mut features = Vec::with_capacity(raw.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for (i, feature) in raw.iter().enumerate() {
      let names = feature_names(feature);
      for name in &names {
        let key = normalize_place_name(name);
        if !key.is_empty() {
          index.entry(key).or_insert(i);
        }
      }

      let polygons = feature.get("geometry").map(project_geometry).unwrap_or_default();
      for point in polygons.iter().flatten().flatten() {
        bbox.extend(*point);
      }

      features.push(MapFeature {
        key: format!("f{}", i),
        name: names.first().cloned().unwrap_or_default(),
        polygons,
      });
    }

    if !bbox.min_x.is_finite() {
      bbox = BoundingBox { min_x: -1.0, min_y: -1.0, max_x: 1.0, max_y: 1.0 };
    }

    let item_features = items
      .iter()
      .filter_map(|item| {
        std::iter::once(item.answer_text.as_deref())
          .flatten()
          .chain(item.alt_answers.iter().map(String::as_str))
          .map(normalize_place_name)
          .filter(|k| !k.is_empty())
          .find_map(|k| index.get(&k).copied())
          .map(|idx| (item.id.clone(), idx))
      })
      .collect();

    Self { features, bbox, item_features }
  }

  pub fn feature_for(&self, item_id: &str) -> Option<&MapFeature> {
    self.item_features.get(item_id).and_then(|&i| self.features.get(i))
  }

  pub fn has_feature(&self, item_id: &str) -> bool {
    self.item_features.contains_key(item_id)
  }

  pub fn resolved_count(&self) -> usize {
    self.item_features.len()
  }
}

/// Every non-empty string property, plus its prefix-stripped variant
fn feature_names(feature: &Value) -> Vec<String> {
  let Some(props) = feature.get("properties").and_then(Value::as_object) else {
    return Vec::new();
  };

  let mut out = Vec::new();
  for value in props.values() {
    let Some(raw) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
      continue;
    };
    out.push(raw.to_string());
    let lower = raw.to_lowercase();
    for prefix in NAME_PREFIXES {
      if lower.starts_with(prefix) {
        // Prefixes are lowercase ASCII apart from "ó", so slice by char count
        let stripped: String = raw.chars().skip(prefix.chars().count()).collect();
        out.push(stripped.trim().to_string());
      }
    }
  }
  out
}

fn project_ring(ring: &Value) -> Vec<[f64; 2]> {
  ring
    .as_array()
    .map(|points| {
      points
        .iter()
        .filter_map(|p| {
          let lon = p.get(0)?.as_f64()?;
          let lat = p.get(1)?.as_f64()?;
          Some([lon, -lat])
        })
        .collect()
    })
    .unwrap_or_default()
}

fn project_polygon(rings: &Value) -> Polygon {
  rings.as_array().map(|r| r.iter().map(project_ring).collect()).unwrap_or_default()
}

fn project_geometry(geometry: &Value) -> Vec<Polygon> {
  let coords = geometry.get("coordinates");
  match (geometry.get("type").and_then(Value::as_str), coords) {
    (Some("Polygon"), Some(c)) => vec![project_polygon(c)],
    (Some("MultiPolygon"), Some(Value::Array(polys))) => polys.iter().map(project_polygon).collect(),
    _ => Vec::new(),
  }
}

/// Lowercase, with runs of anything but ASCII letters/digits collapsed to `-`
fn slugify(value: &str) -> String {
  value
    .trim()
    .to_lowercase()
    .split(|c: char| !c.is_ascii_alphanumeric())
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join("-")
}

/// Supplies boundary data for a session pool
pub trait MapProvider: Send + Sync {
  fn load_map_data(&self, items: &[Item]) -> Option<MapData>;

  fn has_feature(&self, map: &MapData, item: &Item) -> bool {
    map.has_feature(&item.id)
  }
}

/// Provider for deployments without boundary data
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMaps;

impl MapProvider for NoMaps {
  fn load_map_data(&self, _items: &[Item]) -> Option<MapData> {
    None
  }
}

/// Reads `<dir>/<country>-<subdivision-slug>.geojson`
#[derive(Debug, Clone)]
pub struct GeoJsonMaps {
  dir: PathBuf,
}

impl GeoJsonMaps {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  /// File holding the boundaries for a pool, from the first tagged item
  pub fn path_for(&self, items: &[Item]) -> Option<PathBuf> {
    let (country, subdivision) = items.iter().find_map(|it| {
      let country = it.tags.get("country")?.trim().to_lowercase();
      let subdivision = slugify(it.tags.get("subdivisionType")?);
      (!country.is_empty() && !subdivision.is_empty()).then_some((country, subdivision))
    })?;
    Some(self.dir.join(format!("{}-{}.geojson", country, subdivision)))
  }
}

impl MapProvider for GeoJsonMaps {
  fn load_map_data(&self, items: &[Item]) -> Option<MapData> {
    let path = self.path_for(items)?;
    let contents = match std::fs::read_to_string(&path) {
      Ok(c) => c,
      Err(e) => {
        tracing::debug!("No boundary file {}: {}", path.display(), e);
        return None;
      }
    };
    let geojson: Value = match serde_json::from_str(&contents) {
      Ok(v) => v,
      Err(e) => {
        tracing::warn!("Ignoring malformed boundary file {}: {}", path.display(), e);
        return None;
      }
    };

    let map = MapData::build(&geojson, items);
    if map.resolved_count() < MIN_MAP_ITEMS {
      tracing::debug!(
        "Only {} items resolve to features in {}, map rounds disabled",
        map.resolved_count(),
        path.display()
      );
      return None;
    }
    tracing::info!("Loaded {} boundary features from {}", map.features.len(), path.display());
    Some(map)
  }
}

#[cfg(test)]
pub(crate) mod fixtures {
  use super::*;
  use serde_json::json;

  pub fn square(lon: f64, lat: f64) -> Value {
    json!([[[lon, lat], [lon + 1.0, lat], [lon + 1.0, lat + 1.0], [lon, lat + 1.0], [lon, lat]]])
  }

  pub fn provinces_geojson() -> Value {
    json!({
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "properties": {"name": "Sevilla", "name_en": "Seville"}, "geometry": {"type": "Polygon", "coordinates": square(-6.0, 37.0)}},
        {"type": "Feature", "properties": {"name": "Province of Granada"}, "geometry": {"type": "Polygon", "coordinates": square(-3.5, 37.0)}},
        {"type": "Feature", "properties": {"name": "Bizkaia", "alt": "Biscay"}, "geometry": {"type": "MultiPolygon", "coordinates": [square(-3.0, 43.0)]}},
        {"type": "Feature", "properties": {"name": "Asturias"}, "geometry": {"type": "Polygon", "coordinates": square(-6.0, 43.0)}},
        {"type": "Feature", "properties": {"name": "Cádiz"}, "geometry": {"type": "Polygon", "coordinates": square(-6.0, 36.0)}}
      ]
    })
  }

  pub fn province_items() -> Vec<Item> {
    [("a", "Seville"), ("b", "Granada"), ("c", "Biscay"), ("d", "Asturias"), ("e", "Cadiz"), ("f", "Madrid")]
      .into_iter()
      .map(|(id, name)| {
        Item::new(id, "spain", "provinces")
          .with_prompt_image(format!("flag-{}.png", id))
          .with_answer_text(name)
          .with_tag("country", "ES")
          .with_tag("subdivisionType", "Province")
      })
      .collect()
  }
}
