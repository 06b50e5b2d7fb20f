//! Turns parsed level files into map definitions.
//!
//! A bad directive is reported against its file and line and skipped; the
//! rest of the map, and the rest of the file, still build.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use rand::Rng;
use thiserror::Error;
use vault_data::{MapSection, parse_depth_ranges};
use vault_script::{DesFileAst, DirectiveAst, MapAst, MapEntryAst, canonical_directive, parse_des};

use crate::catalog::Catalog;
use crate::mapdef::{KeyField, MapDef};

/// A problem with one line of a level file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}:{line}: {map}: {message}")]
pub struct BuildError {
    pub file: String,
    pub line: usize,
    pub map: String,
    pub message: String,
}

fn line_i32(line: usize) -> i32 {
    i32::try_from(line).unwrap_or(i32::MAX)
}

struct MapBuilder<'a, R: Rng + ?Sized> {
    file: &'a str,
    catalog: &'a Catalog,
    rng: &'a mut R,
    errors: Vec<BuildError>,
}

impl<R: Rng + ?Sized> MapBuilder<'_, R> {
    fn report(&mut self, map: &MapDef, line: usize, message: impl ToString) {
        let err = BuildError {
            file: self.file.to_string(),
            line,
            map: map.name.clone(),
            message: message.to_string(),
        };
        warn!("{err}");
        self.errors.push(err);
    }

    fn build(&mut self, ast: &MapAst) -> MapDef {
        let mut map = MapDef::new(&ast.name);
        map.set_file(self.file);
        if let Some(default_depth) = &ast.default_depth {
            match parse_depth_ranges(default_depth) {
                Ok(ranges) => map.default_depths = ranges,
                Err(e) => self.report(&map, ast.line, e),
            }
        }

        for entry in &ast.entries {
            match entry {
                MapEntryAst::Directive(d) => {
                    if let Err(message) = self.apply_directive(&mut map, d) {
                        self.report(&map, d.line, message);
                    }
                },
                MapEntryAst::Map(rows) => {
                    for row in &rows.rows {
                        map.map.add_line(row);
                    }
                },
                MapEntryAst::Lua(block) => {
                    for (line, text) in &block.lines {
                        map.add_lua_line(block.kind, line_i32(*line), text);
                    }
                },
            }
        }

        map.fixup();
        map
    }

    fn apply_directive(&mut self, map: &mut MapDef, d: &DirectiveAst) -> Result<(), String> {
        let value = d.value.trim();
        let Some(key) = canonical_directive(&d.key) else {
            return Err(format!("unknown directive '{}'", d.key));
        };
        match key {
            "NAME" | "default-depth" => {},
            "TAGS" => map.tags.add(value),
            "DEPTH" => map.add_depths(value).map_err(|e| e.to_string())?,
            "PLACE" => map.place = value.to_string(),
            "ORIENT" => {
                map.orient = MapSection::from_name(value).ok_or_else(|| format!("Bad orient: {value}"))?;
            },
            "CHANCE" | "WEIGHT" => {
                map.chance = value.parse().map_err(|_| format!("Bad {}: {value}", key.to_ascii_lowercase()))?;
            },
            "SHUFFLE" => map.map.add_shuffle(value).map_err(|e| e.to_string())?,
            "SUBST" => {
                let mut first_err = None;
                for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    if let Err(e) = map.map.add_subst(part) {
                        first_err.get_or_insert(e.to_string());
                    }
                }
                if let Some(e) = first_err {
                    return Err(e);
                }
            },
            "MONS" => map
                .mons
                .add_mons_list(value, false, self.catalog, self.rng)
                .map_err(|e| e.to_string())?,
            "ITEM" => map
                .items
                .add_item_list(value, false, self.catalog, self.rng)
                .map_err(|e| e.to_string())?,
            "KFEAT" => self.key_field(map, value, KeyField::Feat)?,
            "KMONS" => self.key_field(map, value, KeyField::Mons)?,
            "KITEM" => self.key_field(map, value, KeyField::Item)?,
            other => return Err(format!("unhandled directive '{other}'")),
        }
        Ok(())
    }

    fn key_field(&mut self, map: &mut MapDef, value: &str, field: KeyField) -> Result<(), String> {
        map.add_key_field(value, field, self.catalog, self.rng).map_err(|e| e.to_string())
    }
}

/// Build every map of a parsed level file. Maps are returned even when
/// some of their lines were rejected; the rejections come back alongside.
pub fn build_maps<R: Rng + ?Sized>(
    ast: &DesFileAst,
    file: &str,
    catalog: &Catalog,
    rng: &mut R,
) -> (Vec<MapDef>, Vec<BuildError>) {
    let mut builder = MapBuilder {
        file,
        catalog,
        rng,
        errors: Vec::new(),
    };
    let maps = ast.maps.iter().map(|m| builder.build(m)).collect();
    (maps, builder.errors)
}

/// Read, parse and build one level file.
///
/// # Errors
/// Fails if the file cannot be read or does not parse. Problems inside
/// individual maps are returned as [`BuildError`]s instead.
pub fn load_des_file<R: Rng + ?Sized>(
    path: &Path,
    catalog: &Catalog,
    rng: &mut R,
) -> Result<(Vec<MapDef>, Vec<BuildError>)> {
    let source = fs::read_to_string(path).with_context(|| format!("reading level file '{}'", path.display()))?;
    let ast = parse_des(&source).with_context(|| format!("parsing level file '{}'", path.display()))?;
    let (maps, errors) = build_maps(&ast, &path.display().to_string(), catalog, rng);
    info!("{} maps built from '{}' ({} problems)", maps.len(), path.display(), errors.len());
    Ok((maps, errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use vault_data::{ChunkKind, LevelId};

    const SRC: &str = "\
default-depth: D:2-9

NAME: guard_room
TAGS: no_monster_gen
ORIENT: float
SUBST: ? = x., ! : ab
MONS: orc / goblin w:5, 3-5 kobold
KFEAT: A = altar
MAP
xxxxx
x?1!x
x.A.x
xxxxx
ENDMAP
: dgn.tags('lit')

NAME: broken
DEPTH: Lair:1-3
ORIENT: sideways
MONS: unicorn
CHANCE: 3
MAP
...
ENDMAP
";

    fn build(src: &str) -> (Vec<MapDef>, Vec<BuildError>) {
        let cat = Catalog::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        build_maps(&parse_des(src).unwrap(), "test.des", &cat, &mut rng)
    }

    #[test]
    fn directives_fill_the_map() {
        let (maps, errors) = build(SRC);
        let guard = &maps[0];
        assert_eq!(guard.orient, MapSection::Float);
        assert!(guard.has_tag("no_monster_gen"));
        assert!(!guard.is_minivault());
        assert_eq!(guard.get_subst_strings(), vec!["? = x .", "! : a b"]);
        assert_eq!(guard.mons.len(), 2);
        assert!(guard.keyspecs.contains_key(&'A'));
        assert_eq!(guard.map.height(), 4);
        assert_eq!(guard.chunks.get(ChunkKind::Main).first(), 15);
        assert_eq!(guard.chunks.main.file(), "test.des");
        assert!(guard.is_usable_in(&LevelId::dungeon(5)));
        assert!(errors.iter().all(|e| e.map == "broken"));
    }

    #[test]
    fn bad_lines_are_reported_and_skipped() {
        let (maps, errors) = build(SRC);
        let broken = &maps[1];
        assert_eq!(broken.chance, 3);
        assert_eq!(broken.orient, MapSection::Float);
        assert!(broken.is_minivault());
        assert!(!broken.is_usable_in(&LevelId::dungeon(5)));

        let lines: Vec<_> = errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![19, 20]);
        assert_eq!(errors[0].to_string(), "test.des:19: broken: Bad orient: sideways");
    }

    #[test]
    fn unknown_directives_are_errors() {
        let (maps, errors) = build("NAME: a\nFLAVOUR: sweet\nMAP\nx\nENDMAP\n");
        assert_eq!(maps.len(), 1);
        assert_eq!(errors[0].message, "unknown directive 'FLAVOUR'");
    }
}
