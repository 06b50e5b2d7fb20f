use serde::{Deserialize, Serialize};
use std::fmt;

/// Where on the level a map wants to be placed (`ORIENT:`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MapSection {
    #[default]
    None,
    North,
    South,
    East,
    West,
    Northwest,
    Northeast,
    Southwest,
    Southeast,
    Encompass,
    Float,
}

impl MapSection {
    pub const ALL: [MapSection; 11] = [
        MapSection::None,
        MapSection::North,
        MapSection::South,
        MapSection::East,
        MapSection::West,
        MapSection::Northwest,
        MapSection::Northeast,
        MapSection::Southwest,
        MapSection::Southeast,
        MapSection::Encompass,
        MapSection::Float,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MapSection::None => "",
            MapSection::North => "north",
            MapSection::South => "south",
            MapSection::East => "east",
            MapSection::West => "west",
            MapSection::Northwest => "northwest",
            MapSection::Northeast => "northeast",
            MapSection::Southwest => "southwest",
            MapSection::Southeast => "southeast",
            MapSection::Encompass => "encompass",
            MapSection::Float => "float",
        }
    }

    /// Look up an orientation by name; the empty string means no orientation.
    pub fn from_name(name: &str) -> Option<MapSection> {
        let name = name.trim();
        MapSection::ALL.into_iter().find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Orientation after rotating the map a quarter turn.
    pub fn rotated(self, clockwise: bool) -> MapSection {
        use MapSection::*;
        let cw = match self {
            North => East,
            Northeast => Southeast,
            East => South,
            Southeast => Southwest,
            South => West,
            Southwest => Northwest,
            West => North,
            Northwest => Northeast,
            other => return other,
        };
        if clockwise { cw } else { cw.opposite() }
    }

    /// Orientation after flipping the map top to bottom.
    pub fn vmirrored(self) -> MapSection {
        use MapSection::*;
        match self {
            North => South,
            South => North,
            Northeast => Southeast,
            Southeast => Northeast,
            Northwest => Southwest,
            Southwest => Northwest,
            other => other,
        }
    }

    /// Orientation after flipping the map left to right.
    pub fn hmirrored(self) -> MapSection {
        use MapSection::*;
        match self {
            East => West,
            West => East,
            Northeast => Northwest,
            Northwest => Northeast,
            Southeast => Southwest,
            Southwest => Southeast,
            other => other,
        }
    }

    pub fn opposite(self) -> MapSection {
        use MapSection::*;
        match self {
            North => South,
            South => North,
            East => West,
            West => East,
            Northeast => Southwest,
            Southwest => Northeast,
            Northwest => Southeast,
            Southeast => Northwest,
            other => other,
        }
    }

    pub fn is_corner(self) -> bool {
        matches!(
            self,
            MapSection::Northeast | MapSection::Northwest | MapSection::Southeast | MapSection::Southwest
        )
    }
}

impl fmt::Display for MapSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four script chunks a map can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Prelude,
    Main,
    Validate,
    Veto,
}

impl ChunkKind {
    pub const ALL: [ChunkKind; 4] = [ChunkKind::Prelude, ChunkKind::Main, ChunkKind::Validate, ChunkKind::Veto];

    /// Chunk name the script runtime reports in error positions.
    pub fn context(self) -> &'static str {
        match self {
            ChunkKind::Prelude => "dlprelude",
            ChunkKind::Main => "dlmain",
            ChunkKind::Validate => "dlvalidate",
            ChunkKind::Veto => "dlveto",
        }
    }

    /// Block keyword used in level files; the main chunk uses a bare `{{ }}` block.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            ChunkKind::Prelude => Some("prelude"),
            ChunkKind::Main => None,
            ChunkKind::Validate => Some("validate"),
            ChunkKind::Veto => Some("veto"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_clockwise_turns_return_home() {
        for s in MapSection::ALL {
            let turned = s.rotated(true).rotated(true).rotated(true).rotated(true);
            assert_eq!(turned, s);
            assert_eq!(s.rotated(true).rotated(false), s);
        }
    }

    #[test]
    fn mirrors_swap_the_expected_sides() {
        assert_eq!(MapSection::Northeast.vmirrored(), MapSection::Southeast);
        assert_eq!(MapSection::Northeast.hmirrored(), MapSection::Northwest);
        assert_eq!(MapSection::Float.hmirrored(), MapSection::Float);
    }

    #[test]
    fn names_round_trip() {
        for s in MapSection::ALL {
            assert_eq!(MapSection::from_name(s.name()), Some(s));
        }
        assert_eq!(MapSection::from_name("sideways"), None);
    }
}
