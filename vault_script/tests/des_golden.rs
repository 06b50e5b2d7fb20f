use vault_data::ChunkKind;
use vault_script::{MapEntryAst, canonical_directive, parse_des};

const SRC: &str = r#"# Sample level file
default-depth: D:2-9

NAME:   guard_room
TAGS:   no_monster_gen
ORIENT: float
SUBST:  ? = x.
MONS:   orc / goblin w:5, 3-5 kobold
KFEAT:  A = altar
prelude {{
  function room_helper() return 1 end
}}
MAP
xxxxx
x?1?x
x.A.x
xxxxx
ENDMAP
: dgn.tags("lit")
validate {{ return true }}

NAME: second
DEPTH: Lair:1-3, !Lair:2
MAP
...
ENDMAP
"#;

#[test]
fn sample_file_golden() {
    let file = parse_des(SRC).expect("parse ok");
    assert_eq!(file.maps.len(), 2);

    let guard = &file.maps[0];
    assert_eq!(guard.name, "guard_room");
    assert_eq!(guard.line, 4);
    assert_eq!(guard.default_depth.as_deref(), Some("D:2-9"));
    assert_eq!(guard.directive("orient").map(|d| d.value.as_str()), Some("float"));
    assert_eq!(
        guard.directive("MONS").map(|d| d.value.as_str()),
        Some("orc / goblin w:5, 3-5 kobold")
    );
    let rows: Vec<_> = guard.rows().cloned().collect();
    assert_eq!(rows, vec!["xxxxx", "x?1?x", "x.A.x", "xxxxx"]);

    let prelude: Vec<_> = guard.lua_blocks(ChunkKind::Prelude).collect();
    assert_eq!(prelude.len(), 1);
    assert_eq!(prelude[0].lines, vec![(11, "  function room_helper() return 1 end".to_string())]);

    let main: Vec<_> = guard.lua_blocks(ChunkKind::Main).collect();
    assert_eq!(main[0].lines, vec![(19, " dgn.tags(\"lit\")".to_string())]);

    let validate: Vec<_> = guard.lua_blocks(ChunkKind::Validate).collect();
    assert_eq!(validate[0].lines, vec![(20, " return true".to_string())]);

    let second = &file.maps[1];
    assert_eq!(second.directive("DEPTH").map(|d| d.line), Some(23));
    assert!(matches!(second.entries.last(), Some(MapEntryAst::Map(m)) if m.first_line == 25));
}

#[test]
fn unknown_keys_parse_but_are_not_canonical() {
    let file = parse_des("NAME: a\nFLAVOUR: sweet\n").expect("parse ok");
    let d = file.maps[0].directive("FLAVOUR").expect("directive kept");
    assert_eq!(canonical_directive(&d.key), None);
    assert_eq!(canonical_directive("subst"), Some("SUBST"));
}

#[test]
fn unterminated_map_is_a_parse_error() {
    assert!(parse_des("NAME: a\nMAP\nxxx\n").is_err());
}
