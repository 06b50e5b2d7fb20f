#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]

pub const VAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

// Spec resolution and grids
pub mod catalog;
pub mod grid;
pub mod keyed;
pub mod spec;
pub mod transform;
pub mod weighted;

// Scripts
pub mod chunk;
mod dgn;
pub mod host;

// Map definitions and their storage
pub mod builder;
pub mod cache;
pub mod config;
pub mod idgen;
pub mod mapdef;
pub mod marshal;
pub mod placement;
pub mod registry;

// Re-exports for convenience
pub use builder::{BuildError, build_maps, load_des_file};
pub use catalog::Catalog;
pub use chunk::{ChunkError, ChunkRun, LuaChunk};
pub use config::{EngineConfig, load_config};
pub use grid::{Coord, MapLines};
pub use host::{ScriptFatal, ScriptHost};
pub use idgen::MapId;
pub use mapdef::{MapDef, MapError};
pub use registry::MapRegistry;
