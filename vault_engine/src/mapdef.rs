//! The map definition: everything one `NAME:` block in a level file
//! describes, plus the operations that run its scripts, resolve its random
//! choices and check that the result can be placed.

use std::collections::{BTreeMap, HashSet, VecDeque};

use log::{debug, warn};
use mlua::Value;
use rand::Rng;
use thiserror::Error;
use vault_data::{ChunkKind, LevelId, LevelRange, MapSection, RangeError};

use crate::catalog::Catalog;
use crate::chunk::{ChunkError, ChunkRun, LuaChunk};
use crate::grid::{Coord, DEFAULT_FILL, GridError, MapLines};
use crate::host::ScriptHost;
use crate::idgen::MapId;
use crate::keyed::KeyedMapSpec;
use crate::spec::{ItemList, MonsList, SpecError};
use crate::transform::split_key_item;

/// Level width used for placement and size limits.
pub const GXM: i32 = 80;
/// Level height used for placement and size limits.
pub const GYM: i32 = 70;
/// Ring of the level kept clear of vaults.
pub const MAPGEN_BORDER: i32 = 2;
/// `CHANCE:` of a map that does not set one.
pub const DEFAULT_CHANCE: i32 = 10;

/// Tag that lets a map appear on any ordinary level.
pub const ANY_DEPTH_TAG: &str = "any_depth";
/// Tag given to maps that had no orientation.
pub const MINIVAULT_TAG: &str = "minivault";

#[derive(Debug, Error)]
pub enum MapError {
    #[error(transparent)]
    Script(#[from] ChunkError),
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("{0}")]
    Validation(String),
    #[error("map '{0}' is only indexed; load it before use")]
    NotLoaded(String),
    #[error("a map named '{0}' already exists")]
    DuplicateName(String),
}

impl MapError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, MapError::Script(e) if e.is_fatal())
    }
}

/// A map's tags: whitespace-separated words with set semantics, kept in
/// the order they were first added.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tags(Vec<String>);

impl Tags {
    /// Add every word of `s`.
    pub fn add(&mut self, s: &str) {
        for word in s.split_whitespace() {
            if !self.has(word) {
                self.0.push(word.to_string());
            }
        }
    }

    /// Remove every word of `s`.
    pub fn remove(&mut self, s: &str) {
        for word in s.split_whitespace() {
            self.0.retain(|t| t != word);
        }
    }

    pub fn has(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.iter().any(|t| t.starts_with(prefix))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn describe(&self) -> String {
        self.0.join(" ")
    }
}

/// The four script chunks of a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapChunks {
    pub prelude: LuaChunk,
    pub main: LuaChunk,
    pub validate: LuaChunk,
    pub veto: LuaChunk,
}

impl Default for MapChunks {
    fn default() -> Self {
        Self {
            prelude: LuaChunk::for_kind(ChunkKind::Prelude),
            main: LuaChunk::for_kind(ChunkKind::Main),
            validate: LuaChunk::for_kind(ChunkKind::Validate),
            veto: LuaChunk::for_kind(ChunkKind::Veto),
        }
    }
}

impl MapChunks {
    pub fn get(&self, kind: ChunkKind) -> &LuaChunk {
        match kind {
            ChunkKind::Prelude => &self.prelude,
            ChunkKind::Main => &self.main,
            ChunkKind::Validate => &self.validate,
            ChunkKind::Veto => &self.veto,
        }
    }

    pub fn get_mut(&mut self, kind: ChunkKind) -> &mut LuaChunk {
        match kind {
            ChunkKind::Prelude => &mut self.prelude,
            ChunkKind::Main => &mut self.main,
            ChunkKind::Validate => &mut self.validate,
            ChunkKind::Veto => &mut self.veto,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &LuaChunk> {
        ChunkKind::ALL.into_iter().map(|k| self.get(k))
    }
}

/// Which per-glyph field a `K*:` line sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    Feat,
    Mons,
    Item,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapDef {
    pub name: String,
    pub tags: Tags,
    /// Named place this map is bound to; empty for ordinary maps.
    pub place: String,
    pub depths: Vec<LevelRange>,
    /// Depths inherited from `default-depth` when the map sets none.
    pub default_depths: Vec<LevelRange>,
    pub orient: MapSection,
    pub chance: i32,
    pub map: MapLines,
    pub mons: MonsList,
    pub items: ItemList,
    pub keyspecs: BTreeMap<char, KeyedMapSpec>,
    pub chunks: MapChunks,
    /// The template this map was instantiated from.
    pub original: Option<MapId>,
    file: String,
    cache_offset: u64,
    index_only: bool,
    resolved: bool,
    float_pos: Option<Coord>,
}

impl Default for MapDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            tags: Tags::default(),
            place: String::new(),
            depths: Vec::new(),
            default_depths: Vec::new(),
            orient: MapSection::None,
            chance: DEFAULT_CHANCE,
            map: MapLines::new(),
            mons: MonsList::new(),
            items: ItemList::new(),
            keyspecs: BTreeMap::new(),
            chunks: MapChunks::default(),
            original: None,
            file: String::new(),
            cache_offset: 0,
            index_only: false,
            resolved: false,
            float_pos: None,
        }
    }
}

impl MapDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Reset to a blank definition.
    pub fn init(&mut self) {
        *self = Self::default();
    }

    pub fn id(&self) -> MapId {
        MapId::from_name(&self.name)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Record the level file this map came from; script errors are reported against it.
    pub fn set_file(&mut self, file: &str) {
        self.file = file.to_string();
        for kind in ChunkKind::ALL {
            self.chunks.get_mut(kind).set_file(file);
        }
    }

    pub fn cache_offset(&self) -> u64 {
        self.cache_offset
    }

    pub(crate) fn set_cache_offset(&mut self, offset: u64) {
        self.cache_offset = offset;
    }

    /// True while only the index record is loaded; the grid and specs are missing.
    pub fn is_index_only(&self) -> bool {
        self.index_only
    }

    pub(crate) fn set_index_only(&mut self, index_only: bool) {
        self.index_only = index_only;
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Where a floating map was put by [`MapDef::resolve`].
    pub fn float_pos(&self) -> Option<Coord> {
        self.float_pos
    }

    /// Append script text from line `line` of the level file.
    pub fn add_lua_line(&mut self, kind: ChunkKind, line: i32, text: &str) {
        self.chunks.get_mut(kind).add(line, text);
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.has(tag)
    }

    pub fn has_tag_prefix(&self, prefix: &str) -> bool {
        self.tags.has_prefix(prefix)
    }

    pub fn is_minivault(&self) -> bool {
        self.has_tag(MINIVAULT_TAG)
    }

    /// Add the comma-separated ranges in `s` to the map's depths.
    ///
    /// # Errors
    /// Returns the first bad range; ranges before it are kept.
    pub fn add_depths(&mut self, s: &str) -> Result<(), RangeError> {
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            self.depths.push(LevelRange::parse(part)?);
        }
        Ok(())
    }

    /// Depths that decide where the map may appear.
    pub fn effective_depths(&self) -> &[LevelRange] {
        if self.depths.is_empty() { &self.default_depths } else { &self.depths }
    }

    /// Whether the map may be used on `level`.
    ///
    /// A matching deny range always wins. Otherwise a matching allow range,
    /// or the `any_depth` tag, admits the map.
    pub fn is_usable_in(&self, level: &LevelId) -> bool {
        let ranges = self.effective_depths();
        if ranges.iter().any(|r| r.deny && r.matches(level)) {
            return false;
        }
        ranges.iter().any(|r| !r.deny && r.matches(level)) || self.has_tag(ANY_DEPTH_TAG)
    }

    /// Pad ragged lines out to the map width.
    pub fn normalise(&mut self) {
        self.map.normalise(DEFAULT_FILL);
    }

    /// Rotate a quarter turn if the rotated map still fits a level.
    /// Returns whether it rotated.
    pub fn rotate(&mut self, clockwise: bool) -> bool {
        let limit = usize::try_from(GYM).unwrap_or(usize::MAX);
        if self.map.width() > limit || self.map.height() > limit {
            debug!("{}: too large to rotate", self.name);
            return false;
        }
        self.map.rotate(clockwise);
        self.orient = self.orient.rotated(clockwise);
        true
    }

    pub fn hmirror(&mut self) {
        self.map.hmirror();
        self.orient = self.orient.hmirrored();
    }

    pub fn vmirror(&mut self) {
        self.map.vmirror();
        self.orient = self.orient.vmirrored();
    }

    /// Normalise, and turn an unoriented map into a floating minivault.
    pub fn fixup(&mut self) {
        self.normalise();
        if self.orient == MapSection::None {
            self.orient = MapSection::Float;
            self.tags.add(MINIVAULT_TAG);
        }
    }

    /// Apply queued transforms and pick a floating position.
    /// Calling it again on a resolved map changes nothing.
    pub fn resolve<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.resolved {
            return;
        }
        self.map.apply_transforms(rng);
        self.normalise();
        if self.orient == MapSection::Float {
            self.float_pos = Some(self.float_place(rng));
        }
        self.resolved = true;
    }

    pub fn glyph_at(&self, c: Coord) -> Option<char> {
        self.map.glyph_at(c)
    }

    pub fn find_glyph(&self, glyph: char) -> Vec<Coord> {
        self.map.find_glyph(glyph)
    }

    pub fn find_first_glyph(&self, glyph: char) -> Option<Coord> {
        self.map.find_first_glyph(glyph)
    }

    /// True if every cell in `targets` can be reached from `from` by
    /// 8-way steps over cells that are not wall glyphs.
    pub fn points_connected(&self, from: Coord, targets: &[Coord]) -> bool {
        let passable = |c: Coord| self.map.glyph_at(c).is_some_and(|g| !MapLines::is_solid(g) && g != 'X');
        if !passable(from) {
            return targets.is_empty();
        }
        let mut pending: HashSet<Coord> = targets.iter().copied().collect();
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(c) = queue.pop_front() {
            pending.remove(&c);
            if pending.is_empty() {
                return true;
            }
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let next = Coord::new(c.x + dx, c.y + dy);
                    if passable(next) && seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        pending.is_empty()
    }

    pub fn get_shuffle_strings(&self) -> Vec<String> {
        self.map.get_shuffle_strings()
    }

    pub fn get_subst_strings(&self) -> Vec<String> {
        self.map.get_subst_strings()
    }

    pub fn mapspec_for_key(&mut self, key: char) -> Option<&mut KeyedMapSpec> {
        self.keyspecs.get_mut(&key)
    }

    /// Apply a `KFEAT`/`KMONS`/`KITEM` value such as `A = altar` or `O : orc`.
    ///
    /// # Errors
    /// Fails for a missing key or separator, or if the value does not parse.
    /// The key's entry exists afterwards either way.
    pub fn add_key_field<R: Rng + ?Sized>(
        &mut self,
        s: &str,
        field: KeyField,
        catalog: &Catalog,
        rng: &mut R,
    ) -> Result<(), SpecError> {
        let (key, fix, arg) = split_key_item(s)?;
        let spec = self.keyspecs.entry(key).or_insert_with(|| KeyedMapSpec::new(key));
        match field {
            KeyField::Feat => spec.set_feat(&arg, fix, catalog, rng),
            KeyField::Mons => spec.set_mons(&arg, fix, catalog, rng),
            KeyField::Item => spec.set_item(&arg, fix, catalog, rng),
        }
    }

    /// Rewrite chunk references in a script error so they name the level file.
    pub fn rewrite_chunk_errors(&self, msg: &str) -> String {
        let mut out = msg.to_string();
        for chunk in self.chunks.iter() {
            if chunk.rewrite_chunk_errors(&mut out) {
                break;
            }
        }
        out
    }

    fn script_error(&self, err: ChunkError) -> MapError {
        MapError::Script(err.map_message(|m| self.rewrite_chunk_errors(&m)))
    }

    /// Run the prelude, and the main chunk when `run_main` is set, against this map.
    ///
    /// # Errors
    /// Returns the first script error, rewritten to point at the level file.
    pub fn run_lua<R: Rng + ?Sized>(&mut self, host: &ScriptHost, rng: &mut R, run_main: bool) -> Result<(), MapError> {
        let mut chunks = std::mem::take(&mut self.chunks);
        let result = host.with_map(self, rng, |h| -> Result<(), ChunkError> {
            h.call_chunk::<()>(&mut chunks.prelude)?;
            if run_main {
                h.call_chunk::<()>(&mut chunks.main)?;
            }
            Ok(())
        });
        self.chunks = chunks;
        result.map_err(|e| self.script_error(e))
    }

    fn test_lua_boolchunk<R: Rng + ?Sized>(
        &mut self,
        kind: ChunkKind,
        host: &ScriptHost,
        rng: &mut R,
    ) -> Result<Option<bool>, MapError> {
        let mut chunks = std::mem::take(&mut self.chunks);
        let result = host.with_map(self, rng, |h| h.call_chunk::<Value>(chunks.get_mut(kind)));
        self.chunks = chunks;
        match result {
            Ok(ChunkRun::Empty) => Ok(None),
            Ok(ChunkRun::Returned(v)) => Ok(Some(!matches!(v, Value::Nil | Value::Boolean(false)))),
            Err(e) => {
                let err = self.script_error(e);
                warn!("{} chunk of '{}' failed: {err}", kind.context(), self.name);
                Err(err)
            },
        }
    }

    /// Run the validate chunk. A map without one is valid.
    ///
    /// # Errors
    /// A script error is returned as an error, never as `false`.
    pub fn test_lua_validate<R: Rng + ?Sized>(&mut self, host: &ScriptHost, rng: &mut R) -> Result<bool, MapError> {
        Ok(self.test_lua_boolchunk(ChunkKind::Validate, host, rng)?.unwrap_or(true))
    }

    /// Run the veto chunk. True when the map may be used: a veto chunk
    /// returning a true value rejects it.
    ///
    /// # Errors
    /// A script error is returned as an error, never as a veto.
    pub fn test_lua_veto<R: Rng + ?Sized>(&mut self, host: &ScriptHost, rng: &mut R) -> Result<bool, MapError> {
        Ok(!self.test_lua_boolchunk(ChunkKind::Veto, host, rng)?.unwrap_or(false))
    }

    /// Load-time check: run the scripts, resolve, and check the size limits
    /// for the map's orientation. The map is resolved afterwards, so callers
    /// that want to keep the template validate a copy.
    ///
    /// # Errors
    /// Returns script errors as they are, and size problems as
    /// [`MapError::Validation`].
    pub fn validate_map_def<R: Rng + ?Sized>(&mut self, host: &ScriptHost, rng: &mut R) -> Result<(), MapError> {
        self.run_lua(host, rng, true)?;
        self.fixup();
        self.resolve(rng);
        self.test_lua_validate(host, rng)?;
        self.check_size()
    }

    fn check_size(&self) -> Result<(), MapError> {
        let width = i32::try_from(self.map.width()).unwrap_or(i32::MAX);
        let height = i32::try_from(self.map.height()).unwrap_or(i32::MAX);
        let fail = |msg: String| Err(MapError::Validation(msg));

        if self.orient == MapSection::Float || self.is_minivault() {
            let (max_w, max_h) = (GXM - MAPGEN_BORDER * 2, GYM - MAPGEN_BORDER * 2);
            if width > max_w || height > max_h {
                let what = if self.is_minivault() { "Minivault" } else { "Float" };
                return fail(format!("{what} is too big: {width}x{height} - max {max_w}x{max_h}"));
            }
        } else if width > GXM || height > GYM {
            return fail(format!("Map is too big: {width}x{height} - max {GXM}x{GYM}"));
        }

        let (dock_w, dock_h) = (GXM * 2 / 3, GYM * 2 / 3);
        match self.orient {
            MapSection::North | MapSection::South if height > dock_h => {
                fail(format!("Map too large - height {height} (max {dock_h})"))
            },
            MapSection::East | MapSection::West if width > dock_w => {
                fail(format!("Map too large - width {width} (max {dock_w})"))
            },
            section if section.is_corner() && (width > dock_w || height > dock_h) => {
                fail(format!("Map too large - {width}x{height} (max {dock_w}x{dock_h})"))
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use vault_data::Branch;

    fn host() -> ScriptHost {
        ScriptHost::new(&EngineConfig::default(), Catalog::builtin().unwrap()).unwrap()
    }

    #[test]
    fn tags_behave_like_a_set() {
        let mut tags = Tags::default();
        tags.add("lit  no_rotate lit");
        assert_eq!(tags.describe(), "lit no_rotate");
        tags.remove("lit");
        assert!(!tags.has("lit"));
        assert!(tags.has_prefix("no_"));
    }

    #[test]
    fn deny_ranges_win() {
        let mut map = MapDef::new("lairish");
        map.add_depths("Lair:1-5, !Lair:3").unwrap();
        assert!(map.is_usable_in(&LevelId::new(Branch::Lair, 2)));
        assert!(!map.is_usable_in(&LevelId::new(Branch::Lair, 3)));
        assert!(!map.is_usable_in(&LevelId::dungeon(2)));
    }

    #[test]
    fn default_depths_apply_only_without_depths() {
        let mut map = MapDef::new("d");
        map.default_depths = vec![LevelRange::parse("D:2-4").unwrap()];
        assert!(map.is_usable_in(&LevelId::dungeon(3)));
        map.add_depths("D:9").unwrap();
        assert!(!map.is_usable_in(&LevelId::dungeon(3)));
    }

    #[test]
    fn no_depths_is_unusable_unless_any_depth() {
        let mut map = MapDef::new("nowhere");
        assert!(!map.is_usable_in(&LevelId::dungeon(1)));
        map.tags.add(ANY_DEPTH_TAG);
        assert!(map.is_usable_in(&LevelId::dungeon(1)));
    }

    #[test]
    fn fixup_turns_unoriented_maps_into_minivaults() {
        let mut map = MapDef::new("mini");
        map.map.add_line("x.");
        map.map.add_line("...");
        map.fixup();
        assert_eq!(map.orient, MapSection::Float);
        assert!(map.is_minivault());
        assert_eq!(map.map.get_lines(), vec!["x.x", "..."]);
    }

    #[test]
    fn rotation_turns_the_orientation() {
        let mut map = MapDef::new("north");
        map.orient = MapSection::North;
        map.map.add_line("ab");
        assert!(map.rotate(true));
        assert_eq!(map.orient, MapSection::East);
        assert_eq!(map.map.get_lines(), vec!["a", "b"]);
    }

    #[test]
    fn resolving_twice_changes_nothing() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut map = MapDef::new("r");
        map.orient = MapSection::Encompass;
        map.map.add_line("?????");
        map.map.add_subst("? = ab").unwrap();
        map.resolve(&mut rng);
        let once = map.map.get_lines();
        map.resolve(&mut rng);
        assert_eq!(map.map.get_lines(), once);
        assert!(once[0].chars().all(|c| c == 'a' || c == 'b'));
    }

    #[test]
    fn key_fields_create_entries() {
        let cat = Catalog::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut map = MapDef::new("k");
        map.add_key_field("A = altar", KeyField::Feat, &cat, &mut rng).unwrap();
        map.add_key_field("O : orc", KeyField::Mons, &cat, &mut rng).unwrap();
        assert!(map.add_key_field("=orc", KeyField::Mons, &cat, &mut rng).is_err());
        assert_eq!(map.keyspecs.len(), 2);
        assert!(map.mapspec_for_key('O').is_some_and(|k| k.mons.slots()[0].is_frozen()));
    }

    #[test]
    fn connectivity_follows_open_cells() {
        let mut map = MapDef::new("c");
        for row in ["xxxxxxx", "x.x...x", "x.x.x.x", "x...x.x", "xxxxxxx"] {
            map.map.add_line(row);
        }
        assert!(map.points_connected(Coord::new(1, 1), &[Coord::new(5, 3)]));
        map.map.set_glyph(3, 3, 'x').unwrap();
        map.map.set_glyph(2, 3, 'x').unwrap();
        assert!(!map.points_connected(Coord::new(1, 1), &[Coord::new(5, 3)]));
        assert!(!map.points_connected(Coord::new(0, 0), &[Coord::new(1, 1)]));
    }

    #[test]
    fn validate_and_veto_default_to_usable() {
        let host = host();
        let mut rng = StdRng::seed_from_u64(1);
        let mut map = MapDef::new("plain");
        assert!(map.test_lua_validate(&host, &mut rng).unwrap());
        assert!(map.test_lua_veto(&host, &mut rng).unwrap());

        map.add_lua_line(ChunkKind::Veto, 3, "return true");
        assert!(!map.test_lua_veto(&host, &mut rng).unwrap());
        map.add_lua_line(ChunkKind::Validate, 4, "return false");
        assert!(!map.test_lua_validate(&host, &mut rng).unwrap());
    }

    #[test]
    fn validate_script_errors_are_errors() {
        let host = host();
        let mut rng = StdRng::seed_from_u64(1);
        let mut map = MapDef::new("oops");
        map.set_file("oops.des");
        map.add_lua_line(ChunkKind::Validate, 10, "error('nope')");
        let err = map.test_lua_validate(&host, &mut rng).unwrap_err();
        assert!(err.to_string().starts_with("oops.des:10:"), "{err}");
    }

    #[test]
    fn oversized_docked_maps_fail_validation() {
        let host = host();
        let mut rng = StdRng::seed_from_u64(1);
        let mut map = MapDef::new("tall");
        map.orient = MapSection::North;
        for _ in 0..50 {
            map.map.add_line("xxxx");
        }
        let err = map.validate_map_def(&host, &mut rng).unwrap_err();
        assert_eq!(err.to_string(), "Map too large - height 50 (max 46)");
    }

    #[test]
    fn oversized_floats_fail_validation() {
        let host = host();
        let mut rng = StdRng::seed_from_u64(1);
        let mut map = MapDef::new("wide");
        map.map.add_line(&"x".repeat(77));
        let err = map.validate_map_def(&host, &mut rng).unwrap_err();
        assert_eq!(err.to_string(), "Minivault is too big: 77x1 - max 76x66");
    }
}
