//! vault_script: reader for level description (`.des`) files.
//!
//! A level file holds any number of maps:
//! - `NAME: some_map` starts a map; `default-depth: D:2-5` applies to maps after it
//! - `KEY: value` lines set map properties (`DEPTH`, `TAGS`, `SUBST`, `MONS`, ...)
//! - `MAP` ... `ENDMAP` holds the glyph grid, rows kept verbatim
//! - `{{ ... }}` and `: ...` lines are main-chunk script
//! - `prelude {{ }}`, `validate {{ }}` and `veto {{ }}` fill the other chunks
//!
//! The parser only checks shape. Interpreting values is left to the engine's
//! map builder, which reports problems against the line numbers kept here.

mod parser;
pub use parser::{AstError, parse_des};

use serde::Serialize;
use vault_data::ChunkKind;

/// Directive keys a level file may use.
pub const KNOWN_DIRECTIVES: [&str; 15] = [
    "default-depth",
    "NAME",
    "TAGS",
    "DEPTH",
    "PLACE",
    "ORIENT",
    "CHANCE",
    "WEIGHT",
    "SHUFFLE",
    "SUBST",
    "MONS",
    "ITEM",
    "KFEAT",
    "KMONS",
    "KITEM",
];

/// A whole level file.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct DesFileAst {
    pub maps: Vec<MapAst>,
}

/// One map, from its `NAME:` line up to the next map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapAst {
    pub name: String,
    /// 1-based line of the `NAME:` directive.
    pub line: usize,
    /// The `default-depth` in force when the map started.
    pub default_depth: Option<String>,
    /// Everything else, in file order.
    pub entries: Vec<MapEntryAst>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MapEntryAst {
    Directive(DirectiveAst),
    Map(MapRowsAst),
    Lua(LuaBlockAst),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectiveAst {
    pub key: String,
    pub value: String,
    pub line: usize,
}

/// Rows of one `MAP` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapRowsAst {
    /// Line of the first row.
    pub first_line: usize,
    pub rows: Vec<String>,
}

/// Script text bound for one chunk, with the line each text line came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LuaBlockAst {
    pub kind: ChunkKind,
    pub lines: Vec<(usize, String)>,
}

impl MapAst {
    pub fn directives(&self) -> impl Iterator<Item = &DirectiveAst> {
        self.entries.iter().filter_map(|e| match e {
            MapEntryAst::Directive(d) => Some(d),
            _ => None,
        })
    }

    /// Value of the last occurrence of `key`.
    pub fn directive(&self, key: &str) -> Option<&DirectiveAst> {
        self.directives().filter(|d| d.key.eq_ignore_ascii_case(key)).last()
    }

    pub fn rows(&self) -> impl Iterator<Item = &String> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                MapEntryAst::Map(m) => Some(m.rows.iter()),
                _ => None,
            })
            .flatten()
    }

    pub fn lua_blocks(&self, kind: ChunkKind) -> impl Iterator<Item = &LuaBlockAst> {
        self.entries.iter().filter_map(move |e| match e {
            MapEntryAst::Lua(l) if l.kind == kind => Some(l),
            _ => None,
        })
    }
}

/// Canonical spelling of a directive key, if it is one we know.
pub fn canonical_directive(key: &str) -> Option<&'static str> {
    KNOWN_DIRECTIVES.iter().copied().find(|k| k.eq_ignore_ascii_case(key))
}
