//! All loaded map definitions, and the choices made among them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use rand::Rng;
use vault_data::LevelId;

use crate::cache::{cache_paths, read_cache_index, write_cache};
use crate::catalog::Catalog;
use crate::idgen::MapId;
use crate::mapdef::{MapDef, MapError};
use crate::weighted::pick_weighted;

fn chance_weight(map: &MapDef) -> u32 {
    u32::try_from(map.chance).unwrap_or(0)
}

/// Map templates in load order, addressable by id.
#[derive(Debug, Default)]
pub struct MapRegistry {
    maps: Vec<MapDef>,
    by_id: HashMap<MapId, usize>,
    /// Data file of each map that was read from a cache index.
    data_files: HashMap<MapId, PathBuf>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template.
    ///
    /// # Errors
    /// Map names must be unique.
    pub fn add(&mut self, map: MapDef) -> Result<MapId, MapError> {
        let id = map.id();
        if self.by_id.contains_key(&id) {
            return Err(MapError::DuplicateName(map.name));
        }
        self.by_id.insert(id, self.maps.len());
        self.maps.push(map);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapDef> {
        self.maps.iter()
    }

    pub fn get(&self, id: MapId) -> Option<&MapDef> {
        self.by_id.get(&id).map(|&i| &self.maps[i])
    }

    pub fn get_mut(&mut self, id: MapId) -> Option<&mut MapDef> {
        self.by_id.get(&id).map(|&i| &mut self.maps[i])
    }

    pub fn find_by_name(&self, name: &str) -> Option<&MapDef> {
        self.get(MapId::from_name(name))
    }

    /// The first map bound to `place`.
    pub fn find_by_place(&self, place: &str) -> Option<&MapDef> {
        self.maps.iter().find(|m| m.place == place)
    }

    /// Chance-weighted choice among the maps bound to `place`.
    pub fn random_map_for_place<R: Rng + ?Sized>(&self, place: &str, rng: &mut R) -> Option<MapId> {
        pick_weighted(self.maps.iter().filter(|m| m.place == place), chance_weight, rng).map(MapDef::id)
    }

    /// Chance-weighted choice among the ordinary maps usable on `level`:
    /// no place binding, not a minivault, positive chance.
    pub fn random_map_for_level<R: Rng + ?Sized>(&self, level: &LevelId, rng: &mut R) -> Option<MapId> {
        let candidates = self
            .maps
            .iter()
            .filter(|m| m.place.is_empty() && !m.is_minivault() && m.is_usable_in(level));
        let picked = pick_weighted(candidates, chance_weight, rng).map(MapDef::id);
        debug!("map for {level}: {:?}", picked.and_then(|id| self.get(id)).map(|m| m.name.as_str()));
        picked
    }

    /// Like [`MapRegistry::random_map_for_level`], restricted to minivaults.
    pub fn random_minivault_for_level<R: Rng + ?Sized>(&self, level: &LevelId, rng: &mut R) -> Option<MapId> {
        let candidates = self
            .maps
            .iter()
            .filter(|m| m.place.is_empty() && m.is_minivault() && m.is_usable_in(level));
        pick_weighted(candidates, chance_weight, rng).map(MapDef::id)
    }

    /// A working copy of a template, remembering where it came from.
    ///
    /// # Errors
    /// Fails for an unknown id or a template that is only indexed.
    pub fn instantiate(&self, id: MapId) -> Result<MapDef, MapError> {
        let template = self.get(id).ok_or_else(|| MapError::NotLoaded(id.to_string()))?;
        if template.is_index_only() {
            return Err(MapError::NotLoaded(template.name.clone()));
        }
        let mut copy = template.clone();
        copy.original = Some(id);
        Ok(copy)
    }

    /// The template `map` was instantiated from.
    pub fn original_of(&self, map: &MapDef) -> Option<&MapDef> {
        map.original.and_then(|id| self.get(id))
    }

    /// Make sure the full record of `id` is in memory.
    ///
    /// # Errors
    /// Fails if the map is unknown or its cache record cannot be read.
    pub fn load_map(&mut self, id: MapId, catalog: &Catalog) -> Result<()> {
        let path = self.data_files.get(&id).cloned();
        let map = self.get_mut(id).with_context(|| format!("no map with id {id}"))?;
        if !map.is_index_only() {
            return Ok(());
        }
        let path = path.with_context(|| format!("map '{}' has no data file", map.name))?;
        map.load(&path, catalog)
    }

    /// Write every map to `<stem>.idx` and `<stem>.dsc` in `dir`.
    ///
    /// # Errors
    /// Fails if any map is only indexed, or the files cannot be written.
    pub fn write_cache(&mut self, dir: &Path, stem: &str) -> Result<()> {
        if let Some(map) = self.maps.iter().find(|m| m.is_index_only()) {
            return Err(MapError::NotLoaded(map.name.clone()).into());
        }
        write_cache(&mut self.maps, dir, stem)?;
        Ok(())
    }

    /// Add index-only entries for every map in `<stem>.idx`; returns how many.
    ///
    /// # Errors
    /// Fails if the index cannot be read or names a map that is already loaded.
    pub fn read_cache(&mut self, dir: &Path, stem: &str) -> Result<usize> {
        let (_, dsc_path) = cache_paths(dir, stem);
        let maps = read_cache_index(dir, stem)?;
        let count = maps.len();
        for map in maps {
            let id = self.add(map).with_context(|| format!("reading cache '{stem}'"))?;
            self.data_files.insert(id, dsc_path.clone());
        }
        info!("{count} maps indexed from '{}'", dsc_path.display());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;
    use vault_data::MapSection;

    fn map(name: &str, depths: &str, chance: i32) -> MapDef {
        let mut m = MapDef::new(name);
        m.add_depths(depths).unwrap();
        m.chance = chance;
        m.orient = MapSection::Encompass;
        m.map.add_line("x.x");
        m
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut reg = MapRegistry::new();
        reg.add(MapDef::new("a")).unwrap();
        assert!(matches!(reg.add(MapDef::new("a")), Err(MapError::DuplicateName(_))));
    }

    #[test]
    fn level_picks_respect_depth_place_and_chance() {
        let mut reg = MapRegistry::new();
        reg.add(map("shallow", "D:1-3", 10)).unwrap();
        reg.add(map("deep", "D:10-12", 10)).unwrap();
        reg.add(map("never", "D:1-3", 0)).unwrap();
        let mut temple = map("temple", "D:1-3", 10);
        temple.place = "Temple".to_string();
        reg.add(temple).unwrap();

        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..50 {
            let id = reg.random_map_for_level(&LevelId::dungeon(2), &mut rng).unwrap();
            assert_eq!(reg.get(id).unwrap().name, "shallow");
        }
        assert!(reg.random_map_for_level(&LevelId::dungeon(6), &mut rng).is_none());
        assert_eq!(reg.find_by_place("Temple").map(|m| m.name.as_str()), Some("temple"));
        assert!(reg.random_map_for_place("Temple", &mut rng).is_some());
    }

    #[test]
    fn instances_remember_their_template() {
        let mut reg = MapRegistry::new();
        let id = reg.add(map("tmpl", "D:1", 10)).unwrap();
        let copy = reg.instantiate(id).unwrap();
        assert_eq!(copy.original, Some(id));
        assert_eq!(reg.original_of(&copy).map(|m| m.name.as_str()), Some("tmpl"));
    }

    #[test]
    fn cached_maps_load_on_demand() -> Result<()> {
        let cat = Catalog::builtin()?;
        let dir = tempdir()?;
        let mut reg = MapRegistry::new();
        reg.add(map("one", "D:1-2", 10))?;
        reg.add(map("two", "D:3", 5))?;
        reg.write_cache(dir.path(), "test")?;

        let mut cached = MapRegistry::new();
        assert_eq!(cached.read_cache(dir.path(), "test")?, 2);
        let id = MapId::from_name("two");
        assert!(matches!(cached.instantiate(id), Err(MapError::NotLoaded(_))));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(cached.random_map_for_level(&LevelId::dungeon(3), &mut rng), Some(id));

        cached.load_map(id, &cat)?;
        let copy = cached.instantiate(id)?;
        assert_eq!(copy.map.get_lines(), vec!["x.x"]);
        Ok(())
    }
}
