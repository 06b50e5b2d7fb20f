//! Where a floating map lands on an empty level: docked against one edge
//! when its borders allow, otherwise somewhere clear of the level edge.

use log::debug;
use rand::Rng;
use vault_data::MapSection;

use crate::grid::Coord;
use crate::mapdef::{GXM, GYM, MAPGEN_BORDER, MapDef};

/// Gap left between a docked map and the level edge.
const DOCK_BORDER: i32 = 6;
/// Extra room kept around a randomly placed float.
const FLOAT_MARGIN: i32 = 11;

const DOCK_SECTIONS: [MapSection; 4] = [MapSection::North, MapSection::South, MapSection::East, MapSection::West];

fn dim(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

impl MapDef {
    /// Whether the map is small enough to dock against `section`.
    pub fn can_dock(&self, section: MapSection) -> bool {
        let (width, height) = (dim(self.map.width()), dim(self.map.height()));
        match section {
            MapSection::North | MapSection::South => width <= GXM * 2 / 3,
            MapSection::East | MapSection::West => height <= GYM * 2 / 3,
            s if s.is_corner() => width <= GXM * 2 / 3 && height <= GYM * 2 / 3,
            _ => false,
        }
    }

    /// Top-left corner of the map when docked against `section`.
    pub fn dock_pos(&self, section: MapSection) -> Option<Coord> {
        let (width, height) = (dim(self.map.width()), dim(self.map.height()));
        let centre_x = (GXM - width) / 2;
        let centre_y = (GYM - height) / 2;
        let far_x = GXM - DOCK_BORDER - width;
        let far_y = GYM - DOCK_BORDER - height;
        let pos = match section {
            MapSection::North => Coord::new(centre_x, DOCK_BORDER),
            MapSection::South => Coord::new(centre_x, far_y),
            MapSection::East => Coord::new(far_x, centre_y),
            MapSection::West => Coord::new(DOCK_BORDER, centre_y),
            MapSection::Northwest => Coord::new(DOCK_BORDER, DOCK_BORDER),
            MapSection::Northeast => Coord::new(far_x, DOCK_BORDER),
            MapSection::Southwest => Coord::new(DOCK_BORDER, far_y),
            MapSection::Southeast => Coord::new(far_x, far_y),
            MapSection::None | MapSection::Encompass | MapSection::Float => return None,
        };
        Some(pos)
    }

    /// Dock against a uniformly chosen edge whose border is solid wall.
    pub fn float_dock<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Coord> {
        let mut chosen = None;
        let mut candidates = 0;
        for section in DOCK_SECTIONS {
            if self.map.solid_borders(section) && self.can_dock(section) {
                candidates += 1;
                if rng.random_range(0..candidates) == 0 {
                    chosen = Some(section);
                }
            }
        }
        let section = chosen?;
        debug!("docking floating map {} to {section}", self.name);
        self.dock_pos(section)
    }

    /// A random position leaving room around the map where the level allows it.
    pub fn float_random_place<R: Rng + ?Sized>(&self, rng: &mut R) -> Coord {
        let (width, height) = (dim(self.map.width()), dim(self.map.height()));
        let mut hborder = MAPGEN_BORDER + FLOAT_MARGIN;
        let mut vborder = hborder;
        if GXM - 2 * hborder < width {
            hborder = (GXM - width) / 2 - 1;
        }
        if GYM - 2 * vborder < height {
            vborder = (GYM - height) / 2 - 1;
        }
        let pick = |rng: &mut R, lo: i32, hi: i32| if hi > lo { rng.random_range(lo..=hi) } else { lo.max(0) };
        let x = pick(rng, hborder, GXM - hborder - width);
        let y = pick(rng, vborder, GYM - vborder - height);
        Coord::new(x, y)
    }

    /// Half the time try docking; otherwise, or if no edge fits, place at random.
    pub fn float_place<R: Rng + ?Sized>(&self, rng: &mut R) -> Coord {
        let docked = if rng.random_bool(0.5) { self.float_dock(rng) } else { None };
        docked.unwrap_or_else(|| self.float_random_place(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn boxed(width: usize, height: usize) -> MapDef {
        let mut map = MapDef::new("box");
        for y in 0..height {
            let row = if y == 0 || y + 1 == height {
                "x".repeat(width)
            } else {
                format!("x{}x", ".".repeat(width - 2))
            };
            map.map.add_line(&row);
        }
        map
    }

    #[test]
    fn dock_positions_hug_the_edges() {
        let map = boxed(10, 6);
        assert_eq!(map.dock_pos(MapSection::North), Some(Coord::new(35, 6)));
        assert_eq!(map.dock_pos(MapSection::South), Some(Coord::new(35, 58)));
        assert_eq!(map.dock_pos(MapSection::East), Some(Coord::new(64, 32)));
        assert_eq!(map.dock_pos(MapSection::West), Some(Coord::new(6, 32)));
        assert_eq!(map.dock_pos(MapSection::Float), None);
    }

    #[test]
    fn wide_maps_cannot_dock_north() {
        let map = boxed(60, 4);
        assert!(!map.can_dock(MapSection::North));
        assert!(map.can_dock(MapSection::West));
    }

    #[test]
    fn open_borders_never_dock() {
        let mut map = MapDef::new("open");
        map.map.add_line("...");
        map.map.add_line("...");
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(map.float_dock(&mut rng), None);
    }

    #[test]
    fn random_places_stay_inside_the_level() {
        let map = boxed(20, 10);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let pos = map.float_place(&mut rng);
            assert!(pos.x >= MAPGEN_BORDER && pos.x + 20 <= GXM - MAPGEN_BORDER, "{pos:?}");
            assert!(pos.y >= MAPGEN_BORDER && pos.y + 10 <= GYM - MAPGEN_BORDER, "{pos:?}");
        }
    }
}
