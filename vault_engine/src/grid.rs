//! The glyph grid of a map and its queue of pending transforms.

use std::cell::Cell;

use rand::Rng;
use thiserror::Error;
use vault_data::MapSection;

use crate::spec::SpecError;
use crate::transform::{ShuffleSpec, SubstSpec, Transform};

/// Fill used when a grid is squared up before rotation or placement.
pub const DEFAULT_FILL: char = 'x';

/// Glyphs that count as solid wall for border checks.
pub const SOLID_GLYPHS: [char; 4] = ['x', 'c', 'b', 'v'];

/// A grid position; `x` is the column and `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("({x},{y}) is out of bounds (0-{max_x},0-{max_y})")]
    OutOfBounds { x: i32, y: i32, max_x: i64, max_y: i64 },
    #[error("Map is empty")]
    MapEmpty,
    #[error("Line {line} out of range (0-{max})")]
    LineOutOfRange { line: i64, max: usize },
    #[error("Index {0} out of range")]
    IndexOutOfRange(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Borders {
    north: bool,
    east: bool,
    south: bool,
    west: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MapLines {
    lines: Vec<Vec<char>>,
    width: usize,
    transforms: Vec<Transform>,
    borders: Cell<Option<Borders>>,
}

impl PartialEq for MapLines {
    fn eq(&self, other: &Self) -> bool {
        self.lines == other.lines && self.transforms == other.transforms
    }
}

impl MapLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Self {
        let mut map = Self::new();
        for row in rows {
            map.add_line(row.as_ref());
        }
        map
    }

    fn touch(&mut self) {
        self.borders.set(None);
    }

    fn recompute_width(&mut self) {
        self.width = self.lines.iter().map(Vec::len).max().unwrap_or(0);
    }

    pub fn add_line(&mut self, s: &str) {
        let row: Vec<char> = s.chars().collect();
        self.width = self.width.max(row.len());
        self.lines.push(row);
        self.touch();
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn rows(&self) -> &[Vec<char>] {
        &self.lines
    }

    pub fn get_lines(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.iter().collect()).collect()
    }

    /// Resolve a possibly negative line index (counting from the end).
    fn line_index(&self, index: i64) -> i64 {
        if index < 0 {
            index + i64::try_from(self.lines.len()).unwrap_or(i64::MAX)
        } else {
            index
        }
    }

    /// Read a line; negative indices count from the bottom.
    ///
    /// # Errors
    /// Fails when the grid is empty or the index is outside it.
    pub fn line_at(&self, index: i64) -> Result<String, GridError> {
        let idx = self.line_index(index);
        match usize::try_from(idx).ok().and_then(|i| self.lines.get(i)) {
            Some(line) => Ok(line.iter().collect()),
            None if self.lines.is_empty() => Err(GridError::MapEmpty),
            None => Err(GridError::LineOutOfRange {
                line: idx,
                max: self.lines.len() - 1,
            }),
        }
    }

    /// Replace a line, growing the grid with empty lines if needed.
    ///
    /// # Errors
    /// Fails for an index that is still negative after counting from the end.
    pub fn set_line_at(&mut self, index: i64, s: &str) -> Result<(), GridError> {
        let idx = self.line_index(index);
        let idx = usize::try_from(idx).map_err(|_| GridError::IndexOutOfRange(idx))?;
        if idx >= self.lines.len() {
            self.lines.resize_with(idx + 1, Vec::new);
        }
        self.lines[idx] = s.chars().collect();
        self.recompute_width();
        self.touch();
        Ok(())
    }

    /// Remove a line if it exists; true if one was removed.
    pub fn remove_line_at(&mut self, index: i64) -> bool {
        let idx = self.line_index(index);
        match usize::try_from(idx) {
            Ok(i) if i < self.lines.len() => {
                self.lines.remove(i);
                self.recompute_width();
                self.touch();
                true
            },
            _ => false,
        }
    }

    /// Drop every line and every queued transform.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.transforms.clear();
        self.width = 0;
        self.touch();
    }

    /// Pad every line to the full width with `fill`.
    pub fn normalise(&mut self, fill: char) {
        let width = self.width;
        for line in &mut self.lines {
            line.resize(width, fill);
        }
        self.touch();
    }

    /// Rotate a quarter turn. Width and height swap.
    pub fn rotate(&mut self, clockwise: bool) {
        self.normalise(DEFAULT_FILL);
        let height = self.lines.len();
        let mut rotated = Vec::with_capacity(self.width);
        for x in 0..self.width {
            let col = if clockwise { x } else { self.width - 1 - x };
            let line: Vec<char> = if clockwise {
                (0..height).rev().map(|y| self.lines[y][col]).collect()
            } else {
                (0..height).map(|y| self.lines[y][col]).collect()
            };
            rotated.push(line);
        }
        self.lines = rotated;
        self.width = height;
        self.touch();
    }

    /// Mirror left to right.
    pub fn hmirror(&mut self) {
        self.normalise(DEFAULT_FILL);
        for line in &mut self.lines {
            line.reverse();
        }
        self.touch();
    }

    /// Mirror top to bottom.
    pub fn vmirror(&mut self) {
        self.lines.reverse();
        self.touch();
    }

    fn in_bounds(&self, x: i32, y: i32) -> Option<(usize, usize)> {
        let (ux, uy) = (usize::try_from(x).ok()?, usize::try_from(y).ok()?);
        (ux < self.width && uy < self.lines.len()).then_some((ux, uy))
    }

    fn out_of_bounds(&self, x: i32, y: i32) -> GridError {
        let to_max = |n: usize| i64::try_from(n).unwrap_or(i64::MAX) - 1;
        GridError::OutOfBounds {
            x,
            y,
            max_x: to_max(self.width),
            max_y: to_max(self.lines.len()),
        }
    }

    /// Glyph at (x, y). Cells past the end of a short line read as a space.
    ///
    /// # Errors
    /// Returns [`GridError::OutOfBounds`] outside the grid rectangle.
    pub fn glyph(&self, x: i32, y: i32) -> Result<char, GridError> {
        let (ux, uy) = self.in_bounds(x, y).ok_or_else(|| self.out_of_bounds(x, y))?;
        Ok(self.lines[uy].get(ux).copied().unwrap_or(' '))
    }

    pub fn glyph_at(&self, c: Coord) -> Option<char> {
        self.glyph(c.x, c.y).ok()
    }

    /// # Errors
    /// Returns [`GridError::OutOfBounds`] outside the grid rectangle.
    pub fn set_glyph(&mut self, x: i32, y: i32, glyph: char) -> Result<(), GridError> {
        let (ux, uy) = self.in_bounds(x, y).ok_or_else(|| self.out_of_bounds(x, y))?;
        let line = &mut self.lines[uy];
        if ux >= line.len() {
            line.resize(ux + 1, ' ');
        }
        line[ux] = glyph;
        self.touch();
        Ok(())
    }

    pub fn find_glyph(&self, glyph: char) -> Vec<Coord> {
        self.cells().filter(|(_, g)| *g == glyph).map(|(c, _)| c).collect()
    }

    pub fn find_first_glyph(&self, glyph: char) -> Option<Coord> {
        self.cells().find(|(_, g)| *g == glyph).map(|(c, _)| c)
    }

    fn cells(&self) -> impl Iterator<Item = (Coord, char)> + '_ {
        self.lines.iter().enumerate().flat_map(|(y, line)| {
            line.iter().enumerate().map(move |(x, g)| {
                let c = Coord::new(i32::try_from(x).unwrap_or(i32::MAX), i32::try_from(y).unwrap_or(i32::MAX));
                (c, *g)
            })
        })
    }

    pub fn is_solid(glyph: char) -> bool {
        SOLID_GLYPHS.contains(&glyph)
    }

    fn check_borders(&self) -> Borders {
        if let Some(b) = self.borders.get() {
            return b;
        }
        let solid_row = |row: Option<&Vec<char>>| {
            row.is_some_and(|r| r.len() == self.width && r.iter().all(|g| Self::is_solid(*g)))
        };
        let solid_col = |x: usize| {
            !self.lines.is_empty() && self.lines.iter().all(|r| r.get(x).is_some_and(|g| Self::is_solid(*g)))
        };
        let borders = if self.width == 0 {
            Borders {
                north: false,
                east: false,
                south: false,
                west: false,
            }
        } else {
            Borders {
                north: solid_row(self.lines.first()),
                south: solid_row(self.lines.last()),
                west: solid_col(0),
                east: solid_col(self.width - 1),
            }
        };
        self.borders.set(Some(borders));
        borders
    }

    /// Whether the given edge (or both edges of a corner) is solid wall.
    pub fn solid_borders(&self, section: MapSection) -> bool {
        let b = self.check_borders();
        match section {
            MapSection::North => b.north,
            MapSection::South => b.south,
            MapSection::East => b.east,
            MapSection::West => b.west,
            MapSection::Northwest => b.north && b.west,
            MapSection::Northeast => b.north && b.east,
            MapSection::Southwest => b.south && b.west,
            MapSection::Southeast => b.south && b.east,
            MapSection::None | MapSection::Encompass | MapSection::Float => false,
        }
    }

    /// Queue a substitution.
    ///
    /// # Errors
    /// Returns the parse error; nothing is queued in that case.
    pub fn add_subst(&mut self, s: &str) -> Result<(), SpecError> {
        if s.trim().is_empty() {
            return Ok(());
        }
        self.transforms.push(Transform::Subst(SubstSpec::parse(s)?));
        Ok(())
    }

    /// Queue a shuffle.
    ///
    /// # Errors
    /// Returns the parse error; nothing is queued in that case.
    pub fn add_shuffle(&mut self, s: &str) -> Result<(), SpecError> {
        if s.trim().is_empty() {
            return Ok(());
        }
        self.transforms.push(Transform::Shuffle(ShuffleSpec::parse(s)?));
        Ok(())
    }

    pub fn push_transform(&mut self, t: Transform) {
        self.transforms.push(t);
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    /// Remove the first substitution whose description matches `s`.
    pub fn remove_subst(&mut self, s: &str) {
        let wanted = SubstSpec::parse(s).map_or_else(|_| s.trim().to_string(), |spec| spec.describe());
        self.remove_first(|t| t.is_subst() && t.describe() == wanted);
    }

    /// Remove the first shuffle whose description matches `s`.
    pub fn remove_shuffle(&mut self, s: &str) {
        let wanted = ShuffleSpec::parse(s).map_or_else(|_| s.trim().to_string(), |spec| spec.describe());
        self.remove_first(|t| t.is_shuffle() && t.describe() == wanted);
    }

    fn remove_first(&mut self, pred: impl Fn(&Transform) -> bool) {
        if let Some(pos) = self.transforms.iter().position(pred) {
            self.transforms.remove(pos);
        }
    }

    pub fn clear_substs(&mut self) {
        self.transforms.retain(|t| !t.is_subst());
    }

    pub fn clear_shuffles(&mut self) {
        self.transforms.retain(|t| !t.is_shuffle());
    }

    pub fn get_subst_strings(&self) -> Vec<String> {
        self.transforms.iter().filter(|t| t.is_subst()).map(Transform::describe).collect()
    }

    pub fn get_shuffle_strings(&self) -> Vec<String> {
        self.transforms.iter().filter(|t| t.is_shuffle()).map(Transform::describe).collect()
    }

    /// Replay every queued transform in the order it was added.
    pub fn apply_transforms<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut transforms = std::mem::take(&mut self.transforms);
        for t in &mut transforms {
            t.apply(&mut self.lines, rng);
        }
        self.transforms = transforms;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn normalise_pads_short_lines() {
        let mut map = MapLines::from_rows(&["xxxx", "x.", ""]);
        map.normalise('x');
        assert_eq!(map.get_lines(), vec!["xxxx", "x.xx", "xxxx"]);
        assert_eq!(map.width(), 4);
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let mut map = MapLines::from_rows(&["abc", "def"]);
        map.rotate(true);
        assert_eq!(map.get_lines(), vec!["da", "eb", "fc"]);
        assert_eq!((map.width(), map.height()), (2, 3));
        map.rotate(false);
        assert_eq!(map.get_lines(), vec!["abc", "def"]);
    }

    #[test]
    fn mirrors_reverse_one_axis() {
        let mut map = MapLines::from_rows(&["ab", "cd"]);
        map.hmirror();
        assert_eq!(map.get_lines(), vec!["ba", "dc"]);
        map.vmirror();
        assert_eq!(map.get_lines(), vec!["dc", "ba"]);
    }

    #[test]
    fn glyph_access_is_bounds_checked() {
        let map = MapLines::from_rows(&["ab", "c"]);
        assert_eq!(map.glyph(1, 0), Ok('b'));
        assert_eq!(map.glyph(1, 1), Ok(' '));
        assert!(matches!(map.glyph(2, 0), Err(GridError::OutOfBounds { .. })));
        assert!(matches!(map.glyph(-1, 0), Err(GridError::OutOfBounds { .. })));
        assert_eq!(map.glyph(0, 5).unwrap_err().to_string(), "(0,5) is out of bounds (0-1,0-1)");
    }

    #[test]
    fn glyph_search() {
        let map = MapLines::from_rows(&["a.a", ".a."]);
        assert_eq!(map.find_glyph('a'), vec![Coord::new(0, 0), Coord::new(2, 0), Coord::new(1, 1)]);
        assert_eq!(map.find_first_glyph('.'), Some(Coord::new(1, 0)));
        assert_eq!(map.find_first_glyph('z'), None);
    }

    #[test]
    fn north_border_tracks_changes() {
        let mut map = MapLines::from_rows(&["xxxx", "x..x", "x..."]);
        assert!(map.solid_borders(MapSection::North));
        assert!(map.solid_borders(MapSection::West));
        assert!(!map.solid_borders(MapSection::East));
        assert!(map.solid_borders(MapSection::Northwest));
        assert!(!map.solid_borders(MapSection::Float));
        map.set_glyph(2, 0, '.').unwrap();
        assert!(!map.solid_borders(MapSection::North));
    }

    #[test]
    fn empty_grid_has_no_solid_borders() {
        let map = MapLines::new();
        assert!(!map.solid_borders(MapSection::North));
        assert!(!map.solid_borders(MapSection::West));
    }

    #[test]
    fn line_access_by_index() {
        let mut map = MapLines::new();
        assert_eq!(map.line_at(0), Err(GridError::MapEmpty));
        map.add_line("abc");
        map.add_line("def");
        assert_eq!(map.line_at(-1).unwrap(), "def");
        assert_eq!(map.line_at(2).unwrap_err().to_string(), "Line 2 out of range (0-1)");
        map.set_line_at(3, "ghijk").unwrap();
        assert_eq!(map.height(), 4);
        assert_eq!(map.width(), 5);
        assert_eq!(map.set_line_at(-9, "x"), Err(GridError::IndexOutOfRange(-5)));
        assert!(map.remove_line_at(2));
        assert!(!map.remove_line_at(7));
        assert_eq!(map.get_lines(), vec!["abc", "def", "ghijk"]);
    }

    #[test]
    fn transforms_are_managed_by_description() {
        let mut map = MapLines::from_rows(&["ab"]);
        map.add_subst("a = x").unwrap();
        map.add_subst("b = y").unwrap();
        map.add_shuffle("xy").unwrap();
        assert!(map.add_subst("ab = c").is_err());
        assert_eq!(map.get_subst_strings(), vec!["a = x", "b = y"]);
        map.remove_subst("a=x");
        assert_eq!(map.get_subst_strings(), vec!["b = y"]);
        map.remove_shuffle("x y");
        assert!(map.get_shuffle_strings().is_empty());
    }

    #[test]
    fn transforms_replay_in_order() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut map = MapLines::from_rows(&["aaa"]);
        map.add_subst("a = b").unwrap();
        map.add_subst("b = c").unwrap();
        map.apply_transforms(&mut rng);
        assert_eq!(map.get_lines(), vec!["ccc"]);
        assert_eq!(map.transforms().len(), 2);
    }

    fn row(len: impl Into<prop::collection::SizeRange>) -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(vec!['x', '.', '+', '@']), len).prop_map(|g| g.into_iter().collect())
    }

    fn rect_grid() -> impl Strategy<Value = Vec<String>> {
        (1usize..8, 1usize..8).prop_flat_map(|(w, h)| prop::collection::vec(row(w), h))
    }

    fn ragged_grid() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(row(0..8), 0..8)
    }

    proptest! {
        #[test]
        fn normalise_is_idempotent(rows in ragged_grid()) {
            let mut once = MapLines::from_rows(&rows);
            once.normalise('x');
            let mut twice = once.clone();
            twice.normalise('x');
            prop_assert_eq!(once.get_lines(), twice.get_lines());
        }

        #[test]
        fn four_clockwise_rotations_are_identity(rows in rect_grid()) {
            let mut map = MapLines::from_rows(&rows);
            for _ in 0..4 {
                map.rotate(true);
            }
            prop_assert_eq!(map.get_lines(), rows.clone());
            prop_assert_eq!(map.height(), rows.len());
        }
    }
}
