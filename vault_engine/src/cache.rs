//! Binary map cache: an index file with what map selection needs and a data
//! file with everything else.
//!
//! `<stem>.idx` holds one index record per map. `<stem>.dsc` holds the full
//! records; each index record carries the offset of its map's full record so
//! a map can be loaded on demand. Both files start with [`MAP_CACHE_VERSION`].

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;
use vault_data::{Branch, LevelRange, MapSection};

use crate::catalog::Catalog;
use crate::keyed::KeyedMapSpec;
use crate::mapdef::MapDef;
use crate::marshal::{
    STRING_MAX, read_bool, read_char, read_i32, read_string, read_u8, read_u16, read_u32, read_u64, write_bool,
    write_char, write_i32, write_string, write_u8, write_u16, write_u32, write_u64,
};
use crate::spec::{FeatureSlot, ItemList, ItemSlot, MonsList, MonsSlot, SpecError};
use crate::transform::{ShuffleSpec, SubstSpec, Transform};

pub const MAP_CACHE_VERSION: u16 = 1;

/// Upper bound on list lengths read back from a cache file.
const LIST_MAX: u32 = 1 << 16;

const TR_SUBST: u8 = 0;
const TR_SHUFFLE: u8 = 1;

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn bad_spec(e: SpecError) -> io::Error {
    invalid(e.to_string())
}

fn len_u32(n: usize) -> io::Result<u32> {
    u32::try_from(n).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn read_len<R: Read + ?Sized>(r: &mut R) -> io::Result<u32> {
    let n = read_u32(r)?;
    if n > LIST_MAX {
        return Err(invalid(format!("list length {n} exceeds {LIST_MAX}")));
    }
    Ok(n)
}

fn write_version<W: Write + ?Sized>(w: &mut W) -> io::Result<()> {
    write_u16(w, MAP_CACHE_VERSION)
}

fn check_version<R: Read + ?Sized>(r: &mut R) -> io::Result<()> {
    match read_u16(r)? {
        MAP_CACHE_VERSION => Ok(()),
        other => Err(invalid(format!("cache version {other}, expected {MAP_CACHE_VERSION}"))),
    }
}

fn write_ranges<W: Write + ?Sized>(w: &mut W, ranges: &[LevelRange]) -> io::Result<()> {
    write_u32(w, len_u32(ranges.len())?)?;
    for range in ranges {
        write_string(w, range.branch.abbrev(), STRING_MAX)?;
        write_i32(w, range.shallowest)?;
        write_i32(w, range.deepest)?;
        write_bool(w, range.deny)?;
    }
    Ok(())
}

fn read_ranges<R: Read + ?Sized>(r: &mut R) -> io::Result<Vec<LevelRange>> {
    let count = read_len(r)?;
    let mut ranges = Vec::new();
    for _ in 0..count {
        let abbrev = read_string(r, STRING_MAX)?;
        let branch = Branch::from_abbrev(&abbrev).ok_or_else(|| invalid(format!("unknown branch '{abbrev}'")))?;
        let mut range = LevelRange::new(branch, read_i32(r)?, read_i32(r)?);
        range.deny = read_bool(r)?;
        ranges.push(range);
    }
    Ok(ranges)
}

fn write_sources<'a, W: Write + ?Sized>(w: &mut W, slots: impl ExactSizeIterator<Item = (&'a str, bool)>) -> io::Result<()> {
    write_u32(w, len_u32(slots.len())?)?;
    for (source, fix) in slots {
        write_string(w, source, STRING_MAX)?;
        write_bool(w, fix)?;
    }
    Ok(())
}

fn read_sources<R: Read + ?Sized>(r: &mut R) -> io::Result<Vec<(String, bool)>> {
    let count = read_len(r)?;
    (0..count)
        .map(|_| -> io::Result<(String, bool)> { Ok((read_string(r, STRING_MAX)?, read_bool(r)?)) })
        .collect()
}

fn write_mons<W: Write + ?Sized>(w: &mut W, mons: &MonsList) -> io::Result<()> {
    write_sources(w, mons.slots().iter().map(|s| (s.source(), s.fix_slot)))
}

fn read_mons<R: Read + ?Sized>(r: &mut R, catalog: &Catalog) -> io::Result<MonsList> {
    let mut list = MonsList::new();
    for (source, fix) in read_sources(r)? {
        let mut slot = MonsSlot::parse(&source, catalog).map_err(bad_spec)?;
        slot.fix_slot = fix;
        list.push_slot(slot);
    }
    Ok(list)
}

fn write_items<W: Write + ?Sized>(w: &mut W, items: &ItemList) -> io::Result<()> {
    write_sources(w, items.slots().iter().map(|s| (s.source(), s.fix_slot)))
}

fn read_items<R: Read + ?Sized>(r: &mut R, catalog: &Catalog) -> io::Result<ItemList> {
    let mut list = ItemList::new();
    for (source, fix) in read_sources(r)? {
        let mut slot = ItemSlot::parse(&source, catalog).map_err(bad_spec)?;
        slot.fix_slot = fix;
        list.push_slot(slot);
    }
    Ok(list)
}

fn write_keyspec<W: Write + ?Sized>(w: &mut W, spec: &KeyedMapSpec) -> io::Result<()> {
    write_char(w, spec.key_glyph)?;
    write_string(w, spec.feat.source(), STRING_MAX)?;
    write_bool(w, spec.feat.fix_slot)?;
    write_mons(w, &spec.mons)?;
    write_items(w, &spec.item)
}

fn read_keyspec<R: Read + ?Sized>(r: &mut R, catalog: &Catalog) -> io::Result<KeyedMapSpec> {
    let mut spec = KeyedMapSpec::new(read_char(r)?);
    let source = read_string(r, STRING_MAX)?;
    spec.feat = FeatureSlot::parse(&source, catalog).map_err(bad_spec)?;
    spec.feat.fix_slot = read_bool(r)?;
    spec.mons = read_mons(r, catalog)?;
    spec.item = read_items(r, catalog)?;
    Ok(spec)
}

impl MapDef {
    /// Write the fields map selection needs, plus the prelude.
    ///
    /// # Errors
    /// Fails on I/O errors or oversized fields.
    pub fn write_index<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        write_string(w, &self.name, STRING_MAX)?;
        write_string(w, self.file(), STRING_MAX)?;
        write_string(w, &self.place, STRING_MAX)?;
        write_u64(w, self.cache_offset())?;
        write_string(w, &self.tags.describe(), STRING_MAX)?;
        write_string(w, self.orient.name(), STRING_MAX)?;
        write_i32(w, self.chance)?;
        write_ranges(w, &self.depths)?;
        write_ranges(w, &self.default_depths)?;
        self.chunks.prelude.write(w)
    }

    /// Read an index record. The map comes back index-only.
    ///
    /// # Errors
    /// Fails on I/O errors or malformed records.
    pub fn read_index<R: Read + ?Sized>(r: &mut R) -> io::Result<MapDef> {
        let mut map = MapDef::new(&read_string(r, STRING_MAX)?);
        let file = read_string(r, STRING_MAX)?;
        map.place = read_string(r, STRING_MAX)?;
        map.set_cache_offset(read_u64(r)?);
        map.tags.add(&read_string(r, STRING_MAX)?);
        let orient = read_string(r, STRING_MAX)?;
        map.orient = MapSection::from_name(&orient).ok_or_else(|| invalid(format!("bad orient '{orient}'")))?;
        map.chance = read_i32(r)?;
        map.depths = read_ranges(r)?;
        map.default_depths = read_ranges(r)?;
        map.chunks.prelude.read(r)?;
        map.set_file(&file);
        map.set_index_only(true);
        Ok(map)
    }

    /// Write the grid, transforms, slots, keyed specs and remaining chunks.
    ///
    /// # Errors
    /// Fails on I/O errors or oversized fields.
    pub fn write_full<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        write_version(w)?;
        write_string(w, &self.name, STRING_MAX)?;

        let lines = self.map.get_lines();
        write_u32(w, len_u32(lines.len())?)?;
        for line in &lines {
            write_string(w, line, STRING_MAX)?;
        }
        let transforms = self.map.transforms();
        write_u32(w, len_u32(transforms.len())?)?;
        for t in transforms {
            write_u8(w, if t.is_subst() { TR_SUBST } else { TR_SHUFFLE })?;
            write_string(w, &t.describe(), STRING_MAX)?;
        }

        write_mons(w, &self.mons)?;
        write_items(w, &self.items)?;
        write_u32(w, len_u32(self.keyspecs.len())?)?;
        for spec in self.keyspecs.values() {
            write_keyspec(w, spec)?;
        }

        self.chunks.main.write(w)?;
        self.chunks.validate.write(w)?;
        self.chunks.veto.write(w)
    }

    /// Fill in the rest of an index-only map from its full record.
    ///
    /// # Errors
    /// Fails on I/O errors, a version or name mismatch, or specs the
    /// catalog no longer knows.
    pub fn read_full<R: Read + ?Sized>(&mut self, r: &mut R, catalog: &Catalog) -> io::Result<()> {
        check_version(r)?;
        let name = read_string(r, STRING_MAX)?;
        if name != self.name {
            return Err(invalid(format!("expected map '{}' in cache, found '{name}'", self.name)));
        }

        self.map.clear();
        for _ in 0..read_len(r)? {
            self.map.add_line(&read_string(r, STRING_MAX)?);
        }
        for _ in 0..read_len(r)? {
            let kind = read_u8(r)?;
            let text = read_string(r, STRING_MAX)?;
            let transform = match kind {
                TR_SUBST => Transform::Subst(SubstSpec::parse(&text).map_err(bad_spec)?),
                TR_SHUFFLE => Transform::Shuffle(ShuffleSpec::parse(&text).map_err(bad_spec)?),
                other => return Err(invalid(format!("unknown transform kind {other}"))),
            };
            self.map.push_transform(transform);
        }

        self.mons = read_mons(r, catalog)?;
        self.items = read_items(r, catalog)?;
        self.keyspecs.clear();
        for _ in 0..read_len(r)? {
            let spec = read_keyspec(r, catalog)?;
            self.keyspecs.insert(spec.key_glyph, spec);
        }

        self.chunks.main.read(r)?;
        self.chunks.validate.read(r)?;
        self.chunks.veto.read(r)?;
        self.set_index_only(false);
        Ok(())
    }

    /// Load the full record of an index-only map from `dsc_path`.
    ///
    /// # Errors
    /// Fails if the data file cannot be opened or its record is bad.
    pub fn load(&mut self, dsc_path: &Path, catalog: &Catalog) -> Result<()> {
        let file = File::open(dsc_path).with_context(|| format!("opening map cache '{}'", dsc_path.display()))?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.cache_offset()))
            .with_context(|| format!("seeking to '{}' in '{}'", self.name, dsc_path.display()))?;
        self.read_full(&mut reader, catalog)
            .with_context(|| format!("reading '{}' from '{}'", self.name, dsc_path.display()))
    }
}

/// Paths of the index and data files for `stem` in `dir`.
pub fn cache_paths(dir: &Path, stem: &str) -> (PathBuf, PathBuf) {
    (dir.join(format!("{stem}.idx")), dir.join(format!("{stem}.dsc")))
}

/// Write `maps` to `<stem>.dsc` and `<stem>.idx` in `dir`, recording each
/// map's data offset on the map.
///
/// # Errors
/// Fails if the directory or files cannot be written.
pub fn write_cache(maps: &mut [MapDef], dir: &Path, stem: &str) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_context(|| format!("creating cache directory '{}'", dir.display()))?;
    let (idx_path, dsc_path) = cache_paths(dir, stem);

    let mut data = Cursor::new(Vec::new());
    write_version(&mut data)?;
    for map in maps.iter_mut() {
        map.set_cache_offset(data.position());
        map.write_full(&mut data).with_context(|| format!("encoding map '{}'", map.name))?;
    }
    fs::write(&dsc_path, data.into_inner()).with_context(|| format!("writing '{}'", dsc_path.display()))?;

    let file = File::create(&idx_path).with_context(|| format!("creating '{}'", idx_path.display()))?;
    let mut w = BufWriter::new(file);
    write_version(&mut w)?;
    write_u32(&mut w, len_u32(maps.len())?)?;
    for map in maps.iter() {
        map.write_index(&mut w).with_context(|| format!("indexing map '{}'", map.name))?;
    }
    w.flush().with_context(|| format!("writing '{}'", idx_path.display()))?;

    info!("cached {} maps to '{}'", maps.len(), dsc_path.display());
    Ok((idx_path, dsc_path))
}

/// Read every index record of `<stem>.idx` in `dir`.
///
/// # Errors
/// Fails if the index is missing, from another version, or malformed.
pub fn read_cache_index(dir: &Path, stem: &str) -> Result<Vec<MapDef>> {
    let (idx_path, _) = cache_paths(dir, stem);
    let file = File::open(&idx_path).with_context(|| format!("opening '{}'", idx_path.display()))?;
    let mut r = BufReader::new(file);
    check_version(&mut r).with_context(|| format!("reading '{}'", idx_path.display()))?;
    let count = read_len(&mut r)?;
    let mut maps = Vec::new();
    for i in 0..count {
        let map = MapDef::read_index(&mut r).with_context(|| format!("index record {i} of '{}'", idx_path.display()))?;
        maps.push(map);
    }
    if maps.is_empty() {
        bail!("'{}' lists no maps", idx_path.display());
    }
    Ok(maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;
    use vault_data::ChunkKind;

    use crate::mapdef::KeyField;

    fn sample() -> MapDef {
        let cat = Catalog::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let mut map = MapDef::new("cached");
        map.set_file("cached.des");
        map.tags.add("lit no_rotate");
        map.add_depths("D:3-7, !D:5").unwrap();
        map.orient = MapSection::West;
        map.chance = 4;
        map.map.add_line("xxxx");
        map.map.add_line("x1Ax");
        map.map.add_subst("A : ab").unwrap();
        map.map.add_shuffle("12/34").unwrap();
        map.mons.add_mons_list("orc / goblin w:5, fix_slot ogre", false, &cat, &mut rng).unwrap();
        map.items.add_item_list("2 ration", false, &cat, &mut rng).unwrap();
        map.add_key_field("Z = lava", KeyField::Feat, &cat, &mut rng).unwrap();
        map.add_lua_line(ChunkKind::Prelude, 3, "x = 1");
        map.add_lua_line(ChunkKind::Validate, 12, "return true");
        map
    }

    #[test]
    fn index_then_load_restores_the_map() -> Result<()> {
        let cat = Catalog::builtin()?;
        let dir = tempdir()?;
        let mut maps = vec![sample(), MapDef::new("second")];
        let (_, dsc) = write_cache(&mut maps, dir.path(), "levels")?;

        let mut index = read_cache_index(dir.path(), "levels")?;
        assert_eq!(index.len(), 2);
        let mut loaded = index.remove(0);
        assert!(loaded.is_index_only());
        assert_eq!(loaded.depths, maps[0].depths);
        assert_eq!(loaded.orient, MapSection::West);
        assert_eq!(loaded.chance, 4);
        assert!(loaded.has_tag("no_rotate"));
        assert_eq!(loaded.file(), "cached.des");
        assert_eq!(loaded.chunks.prelude.source(), maps[0].chunks.prelude.source());

        loaded.load(&dsc, &cat)?;
        assert!(!loaded.is_index_only());
        assert_eq!(loaded.map, maps[0].map);
        assert_eq!(loaded.mons.len(), 2);
        assert!(loaded.mons.slots()[1].fix_slot);
        assert_eq!(loaded.items.slots()[0].source(), "2 ration");
        assert_eq!(loaded.keyspecs[&'Z'].feat.source(), "lava");
        assert_eq!(loaded.chunks.validate.first(), 12);
        assert_eq!(loaded.chunks.validate.file(), "cached.des");
        Ok(())
    }

    #[test]
    fn name_mismatch_is_rejected() -> Result<()> {
        let cat = Catalog::builtin()?;
        let mut buf = Vec::new();
        sample().write_full(&mut buf)?;
        let mut other = MapDef::new("someone_else");
        let err = other.read_full(&mut Cursor::new(buf), &cat).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        Ok(())
    }

    #[test]
    fn wrong_version_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let (idx, _) = cache_paths(dir.path(), "old");
        fs::write(&idx, [9u8, 0, 0, 0, 0, 0])?;
        assert!(read_cache_index(dir.path(), "old").is_err());
        Ok(())
    }
}
