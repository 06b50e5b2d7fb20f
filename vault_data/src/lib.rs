//! Shared data model for vault level descriptions.

pub mod defs;
pub mod levels;
pub mod map;
pub mod validate;

pub use defs::*;
pub use levels::{Branch, LevelId, LevelKind, LevelRange, MAX_DEPTH, RangeError, parse_depth_range, parse_depth_ranges};
pub use map::{ChunkKind, MapSection};
pub use validate::{ValidationError, validate_catalog};
