//! Glyph-keyed overrides from `KFEAT:`, `KMONS:` and `KITEM:`.

use rand::Rng;

use crate::catalog::Catalog;
use crate::spec::{FeatureSlot, FeatureSpec, ItemList, MonsList, SpecError};

/// What a single map glyph stands for when the default glyph meaning is not wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedMapSpec {
    pub key_glyph: char,
    pub feat: FeatureSlot,
    pub item: ItemList,
    pub mons: MonsList,
}

impl KeyedMapSpec {
    pub fn new(key_glyph: char) -> Self {
        Self {
            key_glyph,
            feat: FeatureSlot::default(),
            item: ItemList::new(),
            mons: MonsList::new(),
        }
    }

    /// Replace the feature slot.
    ///
    /// # Errors
    /// Returns the parse error and leaves the previous slot in place.
    pub fn set_feat<R: Rng + ?Sized>(&mut self, s: &str, fix: bool, catalog: &Catalog, rng: &mut R) -> Result<(), SpecError> {
        let mut slot = FeatureSlot::parse(s, catalog)?;
        if fix {
            slot.fix_slot = true;
            slot.get_feat(self.key_glyph, rng);
        }
        self.feat = slot;
        Ok(())
    }

    /// Replace the monster list with the comma-separated slots in `s`.
    ///
    /// # Errors
    /// Returns the first slot error; valid sibling slots are still kept.
    pub fn set_mons<R: Rng + ?Sized>(&mut self, s: &str, fix: bool, catalog: &Catalog, rng: &mut R) -> Result<(), SpecError> {
        self.mons.clear();
        self.mons.add_mons_list(s, fix, catalog, rng)
    }

    /// Replace the item list with the comma-separated slots in `s`.
    ///
    /// # Errors
    /// Returns the first slot error; valid sibling slots are still kept.
    pub fn set_item<R: Rng + ?Sized>(&mut self, s: &str, fix: bool, catalog: &Catalog, rng: &mut R) -> Result<(), SpecError> {
        self.item.clear();
        self.item.add_item_list(s, fix, catalog, rng)
    }

    /// The feature this glyph produces; with no `KFEAT` it is the glyph itself.
    pub fn get_feat<R: Rng + ?Sized>(&mut self, rng: &mut R) -> FeatureSpec {
        self.feat.get_feat(self.key_glyph, rng)
    }

    pub fn get_monsters(&mut self) -> &mut MonsList {
        &mut self.mons
    }

    pub fn get_items(&mut self) -> &mut ItemList {
        &mut self.item
    }
}
