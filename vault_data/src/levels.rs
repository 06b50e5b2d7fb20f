//! Branches, level identifiers and the depth-range grammar used by `DEPTH:` lines.
//!
//! A depth range reads `[!]branch[:range]` where `range` is `N`, `N-M`, `N-`
//! (down to the bottom) or `*` (the whole branch). A bare range with no branch
//! refers to the main dungeon and a bare branch covers every level in it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deepest depth any range may name; open ranges extend to here.
pub const MAX_DEPTH: i32 = 100;

/// Dungeon branches a level can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Branch {
    #[default]
    Dungeon,
    Temple,
    Orc,
    Elf,
    Lair,
    Swamp,
    Hive,
    Snake,
    Slime,
    Vault,
    Blade,
    Crypt,
    Tomb,
    Hell,
    Dis,
    Gehenna,
    Cocytus,
    Tartarus,
    Zot,
}

impl Branch {
    pub const ALL: [Branch; 19] = [
        Branch::Dungeon,
        Branch::Temple,
        Branch::Orc,
        Branch::Elf,
        Branch::Lair,
        Branch::Swamp,
        Branch::Hive,
        Branch::Snake,
        Branch::Slime,
        Branch::Vault,
        Branch::Blade,
        Branch::Crypt,
        Branch::Tomb,
        Branch::Hell,
        Branch::Dis,
        Branch::Gehenna,
        Branch::Cocytus,
        Branch::Tartarus,
        Branch::Zot,
    ];

    /// Short name used in depth specifications (`Lair:2-4`).
    pub fn abbrev(self) -> &'static str {
        match self {
            Branch::Dungeon => "D",
            Branch::Temple => "Temple",
            Branch::Orc => "Orc",
            Branch::Elf => "Elf",
            Branch::Lair => "Lair",
            Branch::Swamp => "Swamp",
            Branch::Hive => "Hive",
            Branch::Snake => "Snake",
            Branch::Slime => "Slime",
            Branch::Vault => "Vault",
            Branch::Blade => "Blade",
            Branch::Crypt => "Crypt",
            Branch::Tomb => "Tomb",
            Branch::Hell => "Hell",
            Branch::Dis => "Dis",
            Branch::Gehenna => "Geh",
            Branch::Cocytus => "Coc",
            Branch::Tartarus => "Tar",
            Branch::Zot => "Zot",
        }
    }

    /// Number of levels in the branch.
    pub fn depth(self) -> i32 {
        match self {
            Branch::Dungeon => 27,
            Branch::Temple | Branch::Blade | Branch::Hell => 1,
            Branch::Orc | Branch::Hive => 4,
            Branch::Elf | Branch::Dis | Branch::Gehenna | Branch::Cocytus | Branch::Tartarus => 7,
            Branch::Lair | Branch::Vault => 8,
            Branch::Swamp | Branch::Snake | Branch::Crypt | Branch::Zot => 5,
            Branch::Slime => 6,
            Branch::Tomb => 3,
        }
    }

    /// Look a branch up by its abbreviation, ignoring ASCII case.
    pub fn from_abbrev(name: &str) -> Option<Branch> {
        let name = name.trim();
        Branch::ALL.into_iter().find(|b| b.abbrev().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbrev())
    }
}

/// Kind of level being generated; only ordinary dungeon levels take part in depth matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LevelKind {
    #[default]
    Dungeon,
    Labyrinth,
    Abyss,
    Pandemonium,
    Portal,
}

/// A concrete level: branch, 1-based depth and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelId {
    pub branch: Branch,
    pub depth: i32,
    pub kind: LevelKind,
}

impl LevelId {
    pub fn new(branch: Branch, depth: i32) -> Self {
        Self {
            branch,
            depth,
            kind: LevelKind::Dungeon,
        }
    }

    pub fn dungeon(depth: i32) -> Self {
        Self::new(Branch::Dungeon, depth)
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LevelKind::Dungeon => write!(f, "{}:{}", self.branch, self.depth),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Error produced while parsing a depth range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    BadDepth(String),
    BadDepthRange(String),
    UnknownBranch(String),
    Empty,
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::BadDepth(s) => write!(f, "Bad depth: {s}"),
            RangeError::BadDepthRange(s) => write!(f, "Bad depth range: {s}"),
            RangeError::UnknownBranch(s) => write!(f, "Unknown branch: '{s}'"),
            RangeError::Empty => write!(f, "Empty depth range"),
        }
    }
}

impl std::error::Error for RangeError {}

/// Inclusive span of depths within one branch, optionally a deny rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelRange {
    pub branch: Branch,
    pub shallowest: i32,
    pub deepest: i32,
    pub deny: bool,
}

impl Default for LevelRange {
    /// The unset range; it never matches anything.
    fn default() -> Self {
        Self {
            branch: Branch::Dungeon,
            shallowest: -1,
            deepest: -1,
            deny: false,
        }
    }
}

impl LevelRange {
    pub fn new(branch: Branch, shallowest: i32, deepest: i32) -> Self {
        Self {
            branch,
            shallowest,
            deepest,
            deny: false,
        }
    }

    /// Parse one range such as `D:2-5`, `!Lair`, `3-`, or `Zot:*`.
    pub fn parse(s: &str) -> Result<Self, RangeError> {
        let mut s = s.trim();
        let mut range = LevelRange::default();
        if let Some(rest) = s.strip_prefix('!') {
            range.deny = true;
            s = rest.trim();
        }
        if s.is_empty() {
            return Err(RangeError::Empty);
        }

        match s.find(':') {
            None => {
                if s.starts_with(|c: char| c.is_ascii_digit()) {
                    let (lo, hi) = parse_depth_range(s)?;
                    range.set(Branch::Dungeon, lo, hi);
                } else {
                    let branch = Branch::from_abbrev(s).ok_or_else(|| RangeError::UnknownBranch(s.to_string()))?;
                    range.set(branch, 1, MAX_DEPTH);
                }
            },
            Some(cpos) => {
                let name = s[..cpos].trim();
                let (lo, hi) = parse_depth_range(s[cpos + 1..].trim())?;
                let branch =
                    Branch::from_abbrev(name).ok_or_else(|| RangeError::UnknownBranch(name.to_string()))?;
                range.set(branch, lo, hi);
            },
        }
        Ok(range)
    }

    pub fn set(&mut self, branch: Branch, shallowest: i32, deepest: i32) {
        self.branch = branch;
        self.shallowest = shallowest;
        self.deepest = deepest;
    }

    /// Return to the unset state.
    pub fn reset(&mut self) {
        *self = LevelRange::default();
    }

    pub fn valid(&self) -> bool {
        self.shallowest > 0 && self.deepest >= self.shallowest
    }

    /// Number of depths covered; zero for an invalid range.
    pub fn span(&self) -> i32 {
        if self.valid() { self.deepest - self.shallowest + 1 } else { 0 }
    }

    pub fn matches_depth(&self, depth: i32) -> bool {
        self.valid() && depth >= self.shallowest && depth <= self.deepest
    }

    /// True when `level` is an ordinary level of this branch inside the range.
    /// The deny flag is ignored here; callers decide what a match means.
    pub fn matches(&self, level: &LevelId) -> bool {
        level.kind == LevelKind::Dungeon && level.branch == self.branch && self.matches_depth(level.depth)
    }

    pub fn str_depth_range(&self) -> String {
        if self.shallowest == -1 {
            ":??".to_string()
        } else if self.shallowest == 1 && self.deepest >= self.branch.depth() {
            String::new()
        } else if self.shallowest == self.deepest {
            format!(":{}", self.shallowest)
        } else {
            format!(":{}-{}", self.shallowest, self.deepest)
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{}{}{}",
            if self.deny { "!" } else { "" },
            self.branch.abbrev(),
            self.str_depth_range()
        )
    }
}

impl fmt::Display for LevelRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Parse the depth part of a range: `*`, `N`, `N-M` or `N-`.
pub fn parse_depth_range(s: &str) -> Result<(i32, i32), RangeError> {
    let s = s.trim();
    if s == "*" {
        return Ok((1, MAX_DEPTH));
    }
    match s.find('-') {
        None => match s.parse::<i32>() {
            Ok(n) if n > 0 => Ok((n, n)),
            _ => Err(RangeError::BadDepth(s.to_string())),
        },
        Some(hy) => {
            let lo = s[..hy].trim().parse::<i32>().unwrap_or(0);
            let tail = s[hy + 1..].trim();
            let hi = if tail.is_empty() { MAX_DEPTH } else { tail.parse::<i32>().unwrap_or(0) };
            if lo <= 0 || hi <= 0 || lo > hi {
                return Err(RangeError::BadDepthRange(s.to_string()));
            }
            Ok((lo, hi))
        },
    }
}

/// Parse a comma-separated list of ranges (`D:1-5, D:8, !D:3`).
pub fn parse_depth_ranges(list: &str) -> Result<Vec<LevelRange>, RangeError> {
    list.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(LevelRange::parse)
        .collect()
}
