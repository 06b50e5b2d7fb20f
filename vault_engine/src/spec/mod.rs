//! Parsers for the monster, item and feature slot grammars.
//!
//! A slot is a `/`-separated list of weighted alternatives. Words such as
//! `fix_slot`, `w:20` or `level:5` are tags: they are stripped from the text
//! before the remaining words are looked up in the catalog.

pub mod feature;
pub mod item;
pub mod mons;

pub use feature::{FeatureKind, FeatureSlot, FeatureSpec};
pub use item::{ItemChoice, ItemLevel, ItemList, ItemRace, ItemSlot, ItemSpec};
pub use mons::{MonsList, MonsSlot, MonsSpec, MonsterChoice, UndeadKind};

use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Weight given to alternatives that do not name one.
pub const DEFAULT_WEIGHT: u32 = 10;

static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:-(\d+))?$").expect("count pattern must compile"));

/// Errors from the slot grammars and the glyph declaration grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("unknown monster: \"{0}\"")]
    UnknownMonster(String),
    #[error("can't make undead out of \"{0}\"")]
    BadUndeadBase(String),
    #[error("bad hydra head count: \"{0}\"")]
    BadHydra(String),
    #[error("Bad item name: {0}")]
    UnknownItem(String),
    #[error("Bad item class: '{0}'")]
    UnknownItemClass(String),
    #[error("Bad item generation weight: '{0}'")]
    BadItemWeight(i64),
    #[error("Bad item level: {0}")]
    BadItemLevel(i64),
    #[error("Bad uniq level: {0}")]
    BadUniq(i64),
    #[error("Bad item race: '{0}'")]
    BadRace(String),
    #[error("no features matching \"{0}\"")]
    UnknownFeature(String),
    #[error("unknown shop type: \"{0}\"")]
    UnknownShop(String),
    #[error("unknown trap type: \"{0}\"")]
    UnknownTrap(String),
    #[error("bad number in tag \"{0}\"")]
    BadTagNumber(String),
    #[error("bad count \"{0}\"")]
    BadCount(String),
    #[error("Index out of range: {0}")]
    IndexOutOfRange(i64),
    #[error("malformed declaration - must use = or :")]
    MalformedDeclaration,
    #[error("bad glyph key '{0}'")]
    BadKey(String),
    #[error("no substitute defined for '{0}'")]
    NoSubstitute(String),
    #[error("bad glyph weight in \"{0}\"")]
    BadGlyphWeight(String),
    #[error("use / for block shuffle, or multiple SHUFFLE: lines")]
    ShuffleComma,
    #[error("block shuffle segment length mismatch")]
    ShuffleSegments,
    #[error("empty shuffle")]
    EmptyShuffle,
}

/// Inclusive number of copies to place, from a leading `3` or `3-5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl Default for CountRange {
    fn default() -> Self {
        Self { min: 1, max: 1 }
    }
}

impl CountRange {
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.random_range(self.min..=self.max)
    }

    pub fn describe(&self) -> Option<String> {
        match (self.min, self.max) {
            (1, 1) => None,
            (a, b) if a == b => Some(a.to_string()),
            (a, b) => Some(format!("{a}-{b}")),
        }
    }
}

/// Normalise whitespace so tag stripping can work on whole words.
pub(crate) fn clean_spec(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove every whole-word occurrence of `tag`; true if any was present.
pub(crate) fn strip_tag(s: &mut String, tag: &str) -> bool {
    let mut found = false;
    let kept: Vec<&str> = s
        .split_whitespace()
        .filter(|w| {
            let hit = w.eq_ignore_ascii_case(tag);
            found |= hit;
            !hit
        })
        .collect();
    if found {
        *s = kept.join(" ");
    }
    found
}

/// Remove the first word starting with `prefix` and return what followed the prefix.
pub(crate) fn strip_tag_prefix(s: &mut String, prefix: &str) -> Option<String> {
    let words: Vec<&str> = s.split_whitespace().collect();
    let pos = words
        .iter()
        .position(|w| w.len() > prefix.len() && w.get(..prefix.len()).is_some_and(|p| p.eq_ignore_ascii_case(prefix)))?;
    let value = words[pos][prefix.len()..].to_string();
    let kept: Vec<&str> = words
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != pos)
        .map(|(_, w)| *w)
        .collect();
    *s = kept.join(" ");
    Some(value)
}

/// Like [`strip_tag_prefix`] but the value must be an integer.
pub(crate) fn strip_number_tag(s: &mut String, prefix: &str) -> Result<Option<i64>, SpecError> {
    match strip_tag_prefix(s, prefix) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| SpecError::BadTagNumber(format!("{prefix}{v}"))),
    }
}

/// Strip a `w:N` or `weight:N` tag.
pub(crate) fn find_weight(s: &mut String) -> Result<Option<i64>, SpecError> {
    if let Some(w) = strip_number_tag(s, "w:")? {
        return Ok(Some(w));
    }
    strip_number_tag(s, "weight:")
}

/// Strip a leading count (`3` or `3-5`) when more words follow it.
pub(crate) fn strip_count(s: &mut String) -> Result<CountRange, SpecError> {
    let mut words = s.splitn(2, ' ');
    let (Some(first), Some(rest)) = (words.next(), words.next()) else {
        return Ok(CountRange::default());
    };
    let Some(caps) = COUNT_RE.captures(first) else {
        return Ok(CountRange::default());
    };
    let bad = || SpecError::BadCount(first.to_string());
    let min: u32 = caps[1].parse().map_err(|_| bad())?;
    let max: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().map_err(|_| bad())?,
        None => min,
    };
    if min == 0 || max < min {
        return Err(bad());
    }
    let rest = rest.to_string();
    *s = rest;
    Ok(CountRange { min, max })
}

/// Strip any number of leading `fix` words; true if one was present.
pub(crate) fn strip_leading_fix(s: &mut String) -> bool {
    let mut found = false;
    loop {
        let mut words = s.splitn(2, ' ');
        match (words.next(), words.next()) {
            (Some(w), Some(rest)) if w.eq_ignore_ascii_case("fix") => {
                *s = rest.to_string();
                found = true;
            },
            _ => return found,
        }
    }
}

/// Split a multi-slot argument on commas, keeping empty parts out.
pub(crate) fn split_slots(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tag_removes_every_copy() {
        let mut s = clean_spec("fix_slot  orc fix_slot");
        assert!(strip_tag(&mut s, "fix_slot"));
        assert_eq!(s, "orc");
        assert!(!strip_tag(&mut s, "fix_slot"));
    }

    #[test]
    fn weight_tags_are_found() {
        let mut s = clean_spec("orc w:20");
        assert_eq!(find_weight(&mut s), Ok(Some(20)));
        assert_eq!(s, "orc");
        let mut s = clean_spec("weight:3 goblin");
        assert_eq!(find_weight(&mut s), Ok(Some(3)));
        assert_eq!(s, "goblin");
        let mut s = clean_spec("goblin w:lots");
        assert!(find_weight(&mut s).is_err());
    }

    #[test]
    fn counts_need_a_following_name() {
        let mut s = clean_spec("3-5 kobold");
        assert_eq!(strip_count(&mut s), Ok(CountRange { min: 3, max: 5 }));
        assert_eq!(s, "kobold");

        let mut s = "8".to_string();
        assert_eq!(strip_count(&mut s), Ok(CountRange::default()));
        assert_eq!(s, "8");

        let mut s = clean_spec("5-2 kobold");
        assert_eq!(strip_count(&mut s), Err(SpecError::BadCount("5-2".into())));
    }

    #[test]
    fn repeated_fix_words_are_idempotent() {
        let mut s = clean_spec("fix fix orc");
        assert!(strip_leading_fix(&mut s));
        assert_eq!(s, "orc");
    }
}
