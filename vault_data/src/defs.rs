use serde::{Deserialize, Serialize};

/// Stable identifier used across catalog references.
pub type Id = String;

/// Feature id every catalog must define; unkeyed glyph slots fall back to it.
pub const DEFAULT_FEATURE: &str = "floor";

/// Names the level compiler resolves monster, item and feature specs against.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogDef {
    #[serde(default)]
    pub monsters: Vec<MonsterDef>,
    #[serde(default)]
    pub item_classes: Vec<ItemClassDef>,
    #[serde(default)]
    pub features: Vec<FeatureDef>,
    #[serde(default)]
    pub shops: Vec<ShopDef>,
    #[serde(default)]
    pub traps: Vec<TrapDef>,
}

/// Body size; decides whether a derived undead is the small or large kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodySize {
    Tiny,
    Small,
    #[default]
    Medium,
    Large,
    Huge,
}

impl BodySize {
    pub fn is_large(self) -> bool {
        self >= BodySize::Large
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonsterDef {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub size: BodySize,
    /// Whether zombies, skeletons and simulacra can be made of this monster.
    #[serde(default = "default_true")]
    pub has_corpse: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemClassDef {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub items: Vec<ItemDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: Id,
    pub name: String,
}

/// Dungeon feature; `glyph` is the map glyph that already means this feature, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDef {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub glyph: Option<char>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopDef {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrapDef {
    pub id: Id,
    pub name: String,
}

fn default_true() -> bool {
    true
}
