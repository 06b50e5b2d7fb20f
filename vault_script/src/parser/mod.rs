//! Parser and AST builders for level description files.
//!
//! Wraps the Pest-generated grammar and groups the flat sequence of lines
//! into maps, keeping the source line of everything the engine may need
//! to report on later.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser as PestParser;

use vault_data::ChunkKind;

use crate::{DesFileAst, DirectiveAst, LuaBlockAst, MapAst, MapEntryAst, MapRowsAst};

mod helpers;

use helpers::{body_lines, line_of};

#[derive(PestParser)]
#[grammar = "src/grammar.pest"]
struct DesParser;

/// Errors that can happen when reading a level file.
#[derive(Debug, thiserror::Error)]
pub enum AstError {
    #[error("parse error: {0}")]
    Pest(String),
    #[error("unexpected grammar shape: {0}")]
    Shape(&'static str),
    #[error("{msg} (line {line})")]
    ShapeAt { msg: &'static str, line: usize },
}

/// Parse a whole level file.
///
/// # Errors
/// Returns an error if the text does not match the grammar, or if map
/// content appears before the first `NAME:` line.
pub fn parse_des(source: &str) -> Result<DesFileAst, AstError> {
    let mut pairs = DesParser::parse(Rule::file, source).map_err(|e| AstError::Pest(e.to_string()))?;
    let file = pairs.next().ok_or(AstError::Shape("expected file"))?;

    let mut out = DesFileAst::default();
    let mut default_depth: Option<String> = None;

    for pair in file.into_inner() {
        let line = line_of(&pair);
        let entry = match pair.as_rule() {
            Rule::directive => {
                let directive = parse_directive_pair(pair)?;
                if directive.key.eq_ignore_ascii_case("default-depth") {
                    default_depth = Some(directive.value);
                    continue;
                }
                if directive.key.eq_ignore_ascii_case("NAME") {
                    if directive.value.is_empty() {
                        return Err(AstError::ShapeAt {
                            msg: "map name is empty",
                            line,
                        });
                    }
                    out.maps.push(MapAst {
                        name: directive.value,
                        line,
                        default_depth: default_depth.clone(),
                        entries: Vec::new(),
                    });
                    continue;
                }
                MapEntryAst::Directive(directive)
            },
            Rule::map_block => MapEntryAst::Map(parse_map_pair(pair)),
            Rule::lua_block => MapEntryAst::Lua(parse_lua_block_pair(pair)?),
            Rule::lua_line => MapEntryAst::Lua(parse_lua_line_pair(pair)?),
            Rule::EOI => continue,
            _ => return Err(AstError::Shape("unexpected top-level entry")),
        };

        let Some(map) = out.maps.last_mut() else {
            return Err(AstError::ShapeAt {
                msg: "map content before the first NAME",
                line,
            });
        };
        map.entries.push(entry);
    }
    Ok(out)
}

fn parse_directive_pair(pair: Pair<Rule>) -> Result<DirectiveAst, AstError> {
    let line = line_of(&pair);
    let mut it = pair.into_inner();
    let key = it.next().ok_or(AstError::Shape("expected directive key"))?;
    let value = it.next().ok_or(AstError::Shape("expected directive value"))?;
    Ok(DirectiveAst {
        key: key.as_str().to_string(),
        value: value.as_str().trim().to_string(),
        line,
    })
}

fn parse_map_pair(pair: Pair<Rule>) -> MapRowsAst {
    let first_line = line_of(&pair) + 1;
    let rows = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::map_row)
        .map(|row| row.as_str().trim_end_matches(['\r', '\n']).to_string())
        .collect();
    MapRowsAst { first_line, rows }
}

fn parse_lua_block_pair(pair: Pair<Rule>) -> Result<LuaBlockAst, AstError> {
    let mut kind = ChunkKind::Main;
    let mut lines = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::lua_kind => {
                kind = match inner.as_str() {
                    "prelude" => ChunkKind::Prelude,
                    "validate" => ChunkKind::Validate,
                    "veto" => ChunkKind::Veto,
                    _ => ChunkKind::Main,
                };
            },
            Rule::lua_body => lines = body_lines(line_of(&inner), inner.as_str()),
            _ => return Err(AstError::Shape("unexpected script block part")),
        }
    }
    Ok(LuaBlockAst { kind, lines })
}

fn parse_lua_line_pair(pair: Pair<Rule>) -> Result<LuaBlockAst, AstError> {
    let line = line_of(&pair);
    let text = pair
        .into_inner()
        .next()
        .ok_or(AstError::Shape("expected script text"))?;
    Ok(LuaBlockAst {
        kind: ChunkKind::Main,
        lines: vec![(line, text.as_str().trim_end().to_string())],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_before_a_name_are_rejected() {
        let err = parse_des("TAGS: x\nNAME: a\n").unwrap_err();
        assert!(matches!(err, AstError::ShapeAt { line: 1, .. }), "{err}");
    }

    #[test]
    fn default_depth_is_captured_per_map() {
        let src = "default-depth: D:2-4\nNAME: first\ndefault-depth: Lair\nNAME: second\n";
        let file = parse_des(src).unwrap();
        assert_eq!(file.maps[0].default_depth.as_deref(), Some("D:2-4"));
        assert_eq!(file.maps[1].default_depth.as_deref(), Some("Lair"));
    }

    #[test]
    fn map_rows_keep_leading_spaces() {
        let src = "NAME: a\nMAP\n  xx\nx..x\nENDMAP\n";
        let file = parse_des(src).unwrap();
        let rows: Vec<_> = file.maps[0].rows().cloned().collect();
        assert_eq!(rows, vec!["  xx".to_string(), "x..x".to_string()]);
        match &file.maps[0].entries[0] {
            MapEntryAst::Map(m) => assert_eq!(m.first_line, 3),
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn script_lines_keep_their_source_lines() {
        let src = "NAME: a\n: x = 1\nveto {{\n  return true\n}}\n";
        let file = parse_des(src).unwrap();
        let map = &file.maps[0];
        let main: Vec<_> = map.lua_blocks(ChunkKind::Main).collect();
        assert_eq!(main[0].lines, vec![(2, " x = 1".to_string())]);
        let veto: Vec<_> = map.lua_blocks(ChunkKind::Veto).collect();
        assert_eq!(veto[0].lines, vec![(4, "  return true".to_string())]);
    }
}
