//! Monster, item and feature names the slot parsers resolve against.
//!
//! A default catalog is compiled in; `vault.toml` may point at a RON file
//! with the same shape to replace it.

use anyhow::{Context, Result, bail};
use log::info;
use std::fs;
use std::path::Path;

use vault_data::{CatalogDef, DEFAULT_FEATURE, FeatureDef, ItemClassDef, ItemDef, MonsterDef, ShopDef, TrapDef, validate_catalog};

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.ron");

/// A validated catalog with case-insensitive lookups.
#[derive(Debug, Clone)]
pub struct Catalog {
    def: CatalogDef,
}

impl Catalog {
    /// Wrap a definition, rejecting it if validation finds problems.
    ///
    /// # Errors
    /// Returns an error listing every validation problem.
    pub fn from_def(def: CatalogDef) -> Result<Self> {
        let errors = validate_catalog(&def);
        if !errors.is_empty() {
            let list = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            bail!("catalog failed validation: {list}");
        }
        Ok(Self { def })
    }

    /// The catalog compiled into the engine.
    ///
    /// # Errors
    /// Returns an error if the embedded RON does not parse or validate.
    pub fn builtin() -> Result<Self> {
        let def: CatalogDef = ron::from_str(BUILTIN_CATALOG).context("parsing built-in catalog")?;
        Self::from_def(def)
    }

    /// Load a catalog from a RON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading catalog from '{}'", path.display()))?;
        let def: CatalogDef =
            ron::from_str(&text).with_context(|| format!("parsing catalog from '{}'", path.display()))?;
        let catalog = Self::from_def(def).with_context(|| format!("validating catalog '{}'", path.display()))?;
        info!(
            "{} monsters, {} item classes, {} features loaded from '{}'",
            catalog.def.monsters.len(),
            catalog.def.item_classes.len(),
            catalog.def.features.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn def(&self) -> &CatalogDef {
        &self.def
    }

    pub fn monster(&self, name: &str) -> Option<&MonsterDef> {
        let name = name.trim();
        self.def
            .monsters
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name) || m.id.eq_ignore_ascii_case(name))
    }

    /// Item class by id, name, or plural name (`weapon`, `weapons`).
    pub fn item_class(&self, name: &str) -> Option<&ItemClassDef> {
        let name = name.trim();
        let singular = name.strip_suffix('s').unwrap_or(name);
        self.def.item_classes.iter().find(|c| {
            c.id.eq_ignore_ascii_case(name)
                || c.name.eq_ignore_ascii_case(name)
                || c.id.eq_ignore_ascii_case(singular)
                || c.name.eq_ignore_ascii_case(singular)
        })
    }

    /// Item by exact name or id, with the class it belongs to.
    pub fn item(&self, name: &str) -> Option<(&ItemClassDef, &ItemDef)> {
        let name = name.trim();
        self.def.item_classes.iter().find_map(|c| {
            c.items
                .iter()
                .find(|i| i.name.eq_ignore_ascii_case(name) || i.id.eq_ignore_ascii_case(name))
                .map(|i| (c, i))
        })
    }

    /// Features named exactly `pattern`, or failing that every feature whose name contains it.
    pub fn features_matching(&self, pattern: &str) -> Vec<&FeatureDef> {
        let pattern = pattern.trim().to_ascii_lowercase();
        let exact: Vec<_> = self
            .def
            .features
            .iter()
            .filter(|f| f.id.eq_ignore_ascii_case(&pattern) || f.name.eq_ignore_ascii_case(&pattern))
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        self.def
            .features
            .iter()
            .filter(|f| f.name.to_ascii_lowercase().contains(&pattern))
            .collect()
    }

    pub fn feature_for_glyph(&self, glyph: char) -> Option<&FeatureDef> {
        self.def.features.iter().find(|f| f.glyph == Some(glyph))
    }

    pub fn default_feature(&self) -> Option<&FeatureDef> {
        self.def.features.iter().find(|f| f.id == DEFAULT_FEATURE)
    }

    pub fn shop(&self, name: &str) -> Option<&ShopDef> {
        let name = name.trim();
        self.def
            .shops
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name) || s.id.eq_ignore_ascii_case(name))
    }

    pub fn trap(&self, name: &str) -> Option<&TrapDef> {
        let name = name.trim();
        self.def
            .traps
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name) || t.id.eq_ignore_ascii_case(name))
    }
}
