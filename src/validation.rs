//! Text normalisation shared by exercise generation, grading and map lookup.
//!
//! Two option texts collide when they are equal after [`normalize_text`]; two
//! images collide when their [`image_key`] is equal. Spelled answers compare by
//! [`letters_only`], place names by [`normalize_place_name`].

use unicode_normalization::UnicodeNormalization;

/// Prefix length kept by [`image_key`]
const IMAGE_KEY_PREFIX: usize = 120;

/// Trim, lowercase and collapse internal whitespace.
pub fn normalize_text(s: &str) -> String {
  s.trim()
    .to_lowercase()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Cheap stable key for an image reference.
///
/// Data URLs can be large; the prefix plus total length is enough to tell
/// distinct images apart inside one exercise.
pub fn image_key(image: &str) -> String {
  let prefix: String = image.chars().take(IMAGE_KEY_PREFIX).collect();
  format!("{}|{}", prefix, image.len())
}

/// Whether a character counts as a letter for tile and grid exercises
fn is_answer_letter(c: char) -> bool {
  c.is_ascii_alphanumeric()
    // Latin-1 letters, both cases, minus × and ÷
    || ('\u{C0}'..='\u{D6}').contains(&c)
    || ('\u{D8}'..='\u{F6}').contains(&c)
    || ('\u{F8}'..='\u{FF}').contains(&c)
    // Cyrillic
    || ('\u{0400}'..='\u{04FF}').contains(&c)
    // Arabic
    || ('\u{0600}'..='\u{06FF}').contains(&c)
    // Kana
    || ('\u{3040}'..='\u{30FF}').contains(&c)
    // CJK unified ideographs
    || ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

/// Uppercased letters and digits of `s`, punctuation and spaces removed.
pub fn letters_only(s: &str) -> Vec<char> {
  s.trim()
    .chars()
    .flat_map(char::to_uppercase)
    .filter(|c| is_answer_letter(*c))
    .collect()
}

/// Split on whitespace, dropping empty words.
pub fn split_words(s: &str) -> Vec<&str> {
  s.split_whitespace().collect()
}

/// Normalise a place name for boundary lookup: strip diacritics, lowercase,
/// and reduce every run of other characters to a single space.
pub fn normalize_place_name(s: &str) -> String {
  let stripped: String = s
    .trim()
    .to_lowercase()
    .nfd()
    .filter(|c| !('\u{0300}'..='\u{036F}').contains(c))
    .collect();

  let mut out = String::with_capacity(stripped.len());
  let mut pending_space = false;
  for c in stripped.chars() {
    if c.is_ascii_lowercase() || c.is_ascii_digit() || ('\u{0400}'..='\u{04FF}').contains(&c) {
      if pending_space && !out.is_empty() {
        out.push(' ');
      }
      pending_space = false;
      out.push(c);
    } else {
      pending_space = true;
    }
  }
  out
}

/// Whether spelled letters match the answer or any accepted alternate.
pub fn spelled_matches(input: &[char], answer: &str, alternates: &[String]) -> bool {
  if input.is_empty() {
    return false;
  }
  std::iter::once(answer)
    .chain(alternates.iter().map(String::as_str))
    .any(|candidate| letters_only(candidate) == input)
}
