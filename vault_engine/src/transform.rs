//! Grid transforms queued on a map: glyph substitution (`SUBST:`) and glyph
//! permutation (`SHUFFLE:`).
//!
//! Transforms are parsed when they are added, so a queued transform always
//! applies cleanly.

use rand::Rng;
use rand::seq::SliceRandom;
use variantly::Variantly;

use crate::spec::{DEFAULT_WEIGHT, SpecError};
use crate::weighted::pick_weighted;

/// Split `k = abc` / `k : abc` into key, fixed flag and replacement text.
pub(crate) fn split_key_item(s: &str) -> Result<(char, bool, String), SpecError> {
    let sep = s
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '=' || *c == ':')
        .map(|(i, c)| (i, c == ':'))
        .ok_or(SpecError::MalformedDeclaration)?;
    let (pos, fixed) = sep;
    let key = s[..pos].trim();
    let value = s[pos + 1..].trim();

    let mut key_chars = key.chars();
    let key_char = match (key_chars.next(), key_chars.next()) {
        (Some(c), None) => c,
        _ => return Err(SpecError::BadKey(key.to_string())),
    };
    if value.is_empty() {
        return Err(SpecError::NoSubstitute(key.to_string()));
    }
    Ok((key_char, fixed, value.to_string()))
}

/// Parse `ab c:5 d` into weighted glyphs. Bare glyphs weigh 10.
pub(crate) fn parse_glyph_replacements(s: &str) -> Result<Vec<(char, u32)>, SpecError> {
    let mut out = Vec::new();
    for token in s.split_whitespace() {
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(g), Some(':')) => {
                let weight: u32 = chars
                    .as_str()
                    .parse()
                    .ok()
                    .filter(|w| *w > 0)
                    .ok_or_else(|| SpecError::BadGlyphWeight(token.to_string()))?;
                out.push((g, weight));
            },
            _ => out.extend(token.chars().map(|g| (g, DEFAULT_WEIGHT))),
        }
    }
    if out.is_empty() {
        return Err(SpecError::NoSubstitute(s.to_string()));
    }
    Ok(out)
}

/// Replace one glyph with a weighted pick, optionally frozen after the first pick.
#[derive(Debug, Clone)]
pub struct SubstSpec {
    key: char,
    fix: bool,
    repl: Vec<(char, u32)>,
    frozen: Option<char>,
}

impl SubstSpec {
    pub fn new(key: char, fix: bool, repl: Vec<(char, u32)>) -> Self {
        Self {
            key,
            fix,
            repl,
            frozen: None,
        }
    }

    /// Parse `x = ab:5 c` (re-pick per cell) or `x : ab` (one pick for the map).
    ///
    /// # Errors
    /// Returns the parse error for malformed keys or weights.
    pub fn parse(s: &str) -> Result<Self, SpecError> {
        let (key, fix, value) = split_key_item(s.trim())?;
        Ok(Self::new(key, fix, parse_glyph_replacements(&value)?))
    }

    pub fn key(&self) -> char {
        self.key
    }

    pub fn is_fixed(&self) -> bool {
        self.fix
    }

    pub fn replacements(&self) -> &[(char, u32)] {
        &self.repl
    }

    /// Draw one replacement glyph.
    pub fn value<R: Rng + ?Sized>(&mut self, rng: &mut R) -> char {
        if let Some(frozen) = self.frozen {
            return frozen;
        }
        let chosen = pick_weighted(&self.repl, |(_, w)| *w, rng).map_or(self.key, |(g, _)| *g);
        if self.fix {
            self.frozen = Some(chosen);
        }
        chosen
    }

    pub fn apply<R: Rng + ?Sized>(&mut self, lines: &mut [Vec<char>], rng: &mut R) {
        for cell in lines.iter_mut().flatten() {
            if *cell == self.key {
                *cell = self.value(rng);
            }
        }
    }

    pub fn describe(&self) -> String {
        let repl = self
            .repl
            .iter()
            .map(|(g, w)| if *w == DEFAULT_WEIGHT { g.to_string() } else { format!("{g}:{w}") })
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {} {}", self.key, if self.fix { ':' } else { '=' }, repl)
    }
}

impl PartialEq for SubstSpec {
    fn eq(&self, other: &Self) -> bool {
        self.describe() == other.describe()
    }
}

/// Permute a glyph set, or whole `/`-separated glyph blocks, across the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleSpec {
    shuffle: String,
}

impl ShuffleSpec {
    /// # Errors
    /// Rejects commas, empty specs and block segments of differing length.
    pub fn parse(s: &str) -> Result<Self, SpecError> {
        let shuffle: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if shuffle.contains(',') {
            return Err(SpecError::ShuffleComma);
        }
        if shuffle.is_empty() {
            return Err(SpecError::EmptyShuffle);
        }
        if shuffle.contains('/') {
            let mut segments = shuffle.split('/');
            let first_len = segments.next().map_or(0, |seg| seg.chars().count());
            if first_len == 0 || segments.any(|seg| seg.chars().count() != first_len) {
                return Err(SpecError::ShuffleSegments);
            }
        }
        Ok(Self { shuffle })
    }

    pub fn is_block(&self) -> bool {
        self.shuffle.contains('/')
    }

    /// A random arrangement of the shuffle text, same shape as the original.
    fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        if self.is_block() {
            let mut segments: Vec<&str> = self.shuffle.split('/').collect();
            segments.shuffle(rng);
            segments.join("/")
        } else {
            let mut glyphs: Vec<char> = self.shuffle.chars().collect();
            glyphs.shuffle(rng);
            glyphs.into_iter().collect()
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, lines: &mut [Vec<char>], rng: &mut R) {
        let from: Vec<char> = self.shuffle.chars().collect();
        let to: Vec<char> = self.shuffled(rng).chars().collect();
        for cell in lines.iter_mut().flatten() {
            if *cell == '/' {
                continue;
            }
            if let Some(pos) = from.iter().position(|g| g == cell) {
                *cell = to[pos];
            }
        }
    }

    pub fn describe(&self) -> String {
        self.shuffle.clone()
    }
}

/// A queued grid transform, replayed in insertion order.
#[derive(Debug, Clone, PartialEq, Variantly)]
pub enum Transform {
    Subst(SubstSpec),
    Shuffle(ShuffleSpec),
}

impl Transform {
    pub fn apply<R: Rng + ?Sized>(&mut self, lines: &mut [Vec<char>], rng: &mut R) {
        match self {
            Transform::Subst(spec) => spec.apply(lines, rng),
            Transform::Shuffle(spec) => spec.apply(lines, rng),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Transform::Subst(spec) => spec.describe(),
            Transform::Shuffle(spec) => spec.describe(),
        }
    }
}
