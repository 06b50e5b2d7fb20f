//! Item slots: `ITEM: good_item long sword / any wand w:5, nothing`.

use log::warn;
use rand::Rng;

use super::{
    CountRange, DEFAULT_WEIGHT, SpecError, clean_spec, find_weight, split_slots, strip_count, strip_leading_fix,
    strip_number_tag, strip_tag, strip_tag_prefix,
};
use crate::catalog::Catalog;
use crate::weighted::pick_weighted;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemChoice {
    Random,
    /// Explicitly place nothing.
    Nothing,
    AnyOfClass { class: String },
    Named { class: String, id: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemLevel {
    /// Level of the dungeon the item is placed on.
    #[default]
    Default,
    Good,
    Superb,
    Level(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRace {
    Elven,
    Dwarven,
    Orcish,
    Plain,
}

impl ItemRace {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "elven" => Some(ItemRace::Elven),
            "dwarven" => Some(ItemRace::Dwarven),
            "orcish" => Some(ItemRace::Orcish),
            "none" | "plain" => Some(ItemRace::Plain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSpec {
    pub choice: ItemChoice,
    pub genweight: u32,
    pub count: CountRange,
    pub level: ItemLevel,
    /// 0 forbids unique items; higher values allow them.
    pub allow_uniq: u32,
    /// `None` lets the builder pick a race.
    pub race: Option<ItemRace>,
}

impl ItemSpec {
    pub fn new(choice: ItemChoice) -> Self {
        Self {
            choice,
            genweight: DEFAULT_WEIGHT,
            count: CountRange::default(),
            level: ItemLevel::Default,
            allow_uniq: 1,
            race: None,
        }
    }

    pub fn random() -> Self {
        Self::new(ItemChoice::Random)
    }

    pub fn describe(&self) -> String {
        let name = match &self.choice {
            ItemChoice::Random => "random".to_string(),
            ItemChoice::Nothing => "nothing".to_string(),
            ItemChoice::AnyOfClass { class } => format!("any {class}"),
            ItemChoice::Named { name, .. } => name.clone(),
        };
        let name = match self.level {
            ItemLevel::Good => format!("good_item {name}"),
            ItemLevel::Superb => format!("superb_item {name}"),
            ItemLevel::Level(n) => format!("level:{n} {name}"),
            ItemLevel::Default => name,
        };
        match self.count.describe() {
            Some(count) => format!("{count} {name}"),
            None => name,
        }
    }
}

/// A slot of weighted item alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemSlot {
    pub alternatives: Vec<ItemSpec>,
    pub fix_slot: bool,
    frozen: Option<ItemSpec>,
    source: String,
}

impl ItemSlot {
    /// Parse one slot (`/`-separated alternatives).
    ///
    /// # Errors
    /// Returns the first alternative that fails to parse.
    pub fn parse(spec: &str, catalog: &Catalog) -> Result<Self, SpecError> {
        let mut text = clean_spec(&spec.to_ascii_lowercase());
        let mut fix_slot = strip_tag(&mut text, "fix_slot");
        fix_slot |= strip_leading_fix(&mut text);

        let mut alternatives = Vec::new();
        if !text.is_empty() {
            for alt in text.split('/') {
                alternatives.push(parse_single_spec(alt, catalog)?);
            }
        }
        Ok(Self {
            alternatives,
            fix_slot,
            frozen: None,
            source: spec.trim().to_string(),
        })
    }

    /// Choose an alternative; a fixed slot keeps returning its first choice.
    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ItemSpec {
        if let Some(frozen) = &self.frozen {
            return frozen.clone();
        }
        let chosen = pick_weighted(&self.alternatives, |i| i.genweight, rng)
            .cloned()
            .unwrap_or_else(ItemSpec::random);
        if self.fix_slot {
            self.frozen = Some(chosen.clone());
        }
        chosen
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

fn parse_single_spec(alt: &str, catalog: &Catalog) -> Result<ItemSpec, SpecError> {
    let mut s = clean_spec(alt);
    let mut spec = ItemSpec::random();

    if let Some(w) = find_weight(&mut s)? {
        if w <= 0 {
            return Err(SpecError::BadItemWeight(w));
        }
        spec.genweight = u32::try_from(w).unwrap_or(u32::MAX);
    }

    if strip_tag(&mut s, "good_item") {
        spec.level = ItemLevel::Good;
    } else if strip_tag(&mut s, "superb_item") {
        spec.level = ItemLevel::Superb;
    } else if let Some(n) = strip_number_tag(&mut s, "level:")? {
        spec.level = ItemLevel::Level(u32::try_from(n).ok().filter(|&n| n > 0).ok_or(SpecError::BadItemLevel(n))?);
    }

    if strip_tag(&mut s, "no_uniq") {
        spec.allow_uniq = 0;
    }
    if strip_tag(&mut s, "allow_uniq") {
        spec.allow_uniq = 1;
    } else if let Some(n) = strip_number_tag(&mut s, "uniq:")? {
        spec.allow_uniq = u32::try_from(n).ok().filter(|&n| n > 0).ok_or(SpecError::BadUniq(n))?;
    }

    if let Some(race) = strip_tag_prefix(&mut s, "race:") {
        spec.race = Some(ItemRace::parse(&race).ok_or(SpecError::BadRace(race))?);
    }

    spec.count = strip_count(&mut s)?;

    match s.as_str() {
        "random" | "any" | "random item" | "any item" => {},
        "good item" => spec.level = ItemLevel::Good,
        "superb item" => spec.level = ItemLevel::Superb,
        "nothing" => spec.choice = ItemChoice::Nothing,
        other => {
            if let Some(class) = other.strip_prefix("any ").or_else(|| other.strip_prefix("random ")) {
                let def = catalog
                    .item_class(class)
                    .ok_or_else(|| SpecError::UnknownItemClass(class.to_string()))?;
                spec.choice = ItemChoice::AnyOfClass { class: def.id.clone() };
            } else {
                let (class, item) = catalog.item(other).ok_or_else(|| SpecError::UnknownItem(other.to_string()))?;
                spec.choice = ItemChoice::Named {
                    class: class.id.clone(),
                    id: item.id.clone(),
                    name: item.name.clone(),
                };
            }
        },
    }
    Ok(spec)
}

/// Ordered item slots, indexed by the letters `d`-`k` on the map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemList {
    slots: Vec<ItemSlot>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one slot. With `fix` the slot is fixed and drawn immediately.
    ///
    /// # Errors
    /// Returns the parse error; the list is unchanged in that case.
    pub fn add_item<R: Rng + ?Sized>(&mut self, s: &str, fix: bool, catalog: &Catalog, rng: &mut R) -> Result<(), SpecError> {
        let mut slot = ItemSlot::parse(s, catalog)?;
        if fix {
            slot.fix_slot = true;
            slot.pick(rng);
        }
        self.slots.push(slot);
        Ok(())
    }

    /// Append every comma-separated slot in `s`; see [`MonsList::add_mons_list`](super::MonsList::add_mons_list).
    ///
    /// # Errors
    /// Returns the first slot error encountered.
    pub fn add_item_list<R: Rng + ?Sized>(
        &mut self,
        s: &str,
        fix: bool,
        catalog: &Catalog,
        rng: &mut R,
    ) -> Result<(), SpecError> {
        if s.trim().is_empty() {
            self.clear();
            return Ok(());
        }
        let mut first_err = None;
        for part in split_slots(s) {
            if let Err(e) = self.add_item(part, fix, catalog, rng) {
                warn!("skipping item slot '{part}': {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Replace slot `index`, growing the list with empty slots if needed.
    ///
    /// # Errors
    /// Returns an error for a negative index or a bad spec.
    pub fn set_item(&mut self, index: i64, s: &str, catalog: &Catalog) -> Result<(), SpecError> {
        let idx = usize::try_from(index).map_err(|_| SpecError::IndexOutOfRange(index))?;
        let slot = ItemSlot::parse(s, catalog)?;
        if idx >= self.slots.len() {
            self.slots.resize_with(idx + 1, ItemSlot::default);
        }
        self.slots[idx] = slot;
        Ok(())
    }

    /// Draw from slot `index`; a missing or empty slot yields a random item.
    pub fn get_item<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) -> ItemSpec {
        match self.slots.get_mut(index) {
            Some(slot) => slot.pick(rng),
            None => ItemSpec::random(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn slots(&self) -> &[ItemSlot] {
        &self.slots
    }

    pub(crate) fn push_slot(&mut self, slot: ItemSlot) {
        self.slots.push(slot);
    }
}
