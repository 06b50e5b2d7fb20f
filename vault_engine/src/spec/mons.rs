//! Monster slots: `MONS: orc w:20 / goblin, fix_slot 3-5 kobold, 8`.

use log::warn;
use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

use super::{
    CountRange, DEFAULT_WEIGHT, SpecError, clean_spec, find_weight, split_slots, strip_count, strip_leading_fix,
    strip_tag,
};
use crate::catalog::Catalog;
use crate::weighted::pick_weighted;

static HYDRA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-headed hydra$").expect("hydra pattern must compile"));

const MAX_HYDRA_HEADS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndeadKind {
    Zombie,
    Skeleton,
    Simulacrum,
    SpectralThing,
}

impl UndeadKind {
    fn suffix(self) -> &'static str {
        match self {
            UndeadKind::Zombie => "zombie",
            UndeadKind::Skeleton => "skeleton",
            UndeadKind::Simulacrum => "simulacrum",
            UndeadKind::SpectralThing => "thing",
        }
    }
}

/// What a monster alternative asks for. Sentinels are left for the level
/// builder to resolve when it actually places the monster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonsterChoice {
    Named { id: String, name: String },
    Random,
    /// `8`: a random monster from somewhat deeper.
    OutOfDepth,
    /// `9`: a random monster from much deeper.
    FarOutOfDepth,
    Hydra { heads: u32 },
    Undead { kind: UndeadKind, base: Option<String>, large: bool },
}

/// One weighted alternative within a monster slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonsSpec {
    pub choice: MonsterChoice,
    pub genweight: u32,
    pub count: CountRange,
    /// Every placement of a random choice uses the same monster.
    pub fix_mons: bool,
    pub generate_awake: bool,
}

impl MonsSpec {
    pub fn new(choice: MonsterChoice) -> Self {
        Self {
            choice,
            genweight: DEFAULT_WEIGHT,
            count: CountRange::default(),
            fix_mons: false,
            generate_awake: false,
        }
    }

    pub fn random() -> Self {
        Self::new(MonsterChoice::Random)
    }

    pub fn describe(&self) -> String {
        let name = match &self.choice {
            MonsterChoice::Named { name, .. } => name.clone(),
            MonsterChoice::Random => "random".to_string(),
            MonsterChoice::OutOfDepth => "8".to_string(),
            MonsterChoice::FarOutOfDepth => "9".to_string(),
            MonsterChoice::Hydra { heads } => format!("{heads}-headed hydra"),
            MonsterChoice::Undead {
                kind: UndeadKind::SpectralThing,
                base,
                ..
            } => match base {
                Some(base) => format!("spectral {base}"),
                None => "spectral thing".to_string(),
            },
            MonsterChoice::Undead { kind, base, large } => match base {
                Some(base) => format!("{base} {}", kind.suffix()),
                None => format!("{} {}", if *large { "large" } else { "small" }, kind.suffix()),
            },
        };
        match self.count.describe() {
            Some(count) => format!("{count} {name}"),
            None => name,
        }
    }
}

/// A slot: weighted alternatives, optionally frozen after the first pick.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonsSlot {
    pub alternatives: Vec<MonsSpec>,
    pub fix_slot: bool,
    frozen: Option<MonsSpec>,
    source: String,
}

impl MonsSlot {
    /// Parse one slot (`/`-separated alternatives).
    ///
    /// # Errors
    /// Returns the first alternative that fails to parse.
    pub fn parse(spec: &str, catalog: &Catalog) -> Result<Self, SpecError> {
        let mut text = clean_spec(spec);
        let mut fix_slot = strip_tag(&mut text, "fix_slot");
        fix_slot |= strip_leading_fix(&mut text);

        let mut alternatives = Vec::new();
        if !text.is_empty() {
            for alt in text.split('/') {
                alternatives.push(parse_alternative(alt, catalog)?);
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
    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> MonsSpec {
        if let Some(frozen) = &self.frozen {
            return frozen.clone();
        }
        let chosen = pick_weighted(&self.alternatives, |m| m.genweight, rng)
            .cloned()
            .unwrap_or_else(MonsSpec::random);
        if self.fix_slot {
            self.frozen = Some(chosen.clone());
        }
        chosen
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// The text this slot was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn parse_alternative(alt: &str, catalog: &Catalog) -> Result<MonsSpec, SpecError> {
    let mut s = clean_spec(alt);
    let genweight = match find_weight(&mut s)? {
        Some(w) if w > 0 => u32::try_from(w).unwrap_or(u32::MAX),
        _ => DEFAULT_WEIGHT,
    };
    let fix_mons = strip_tag(&mut s, "fix_mons");
    let generate_awake = strip_tag(&mut s, "generate_awake");
    let count = strip_count(&mut s)?;
    let choice = parse_choice(&s, catalog)?;
    Ok(MonsSpec {
        choice,
        genweight,
        count,
        fix_mons,
        generate_awake,
    })
}

fn parse_choice(s: &str, catalog: &Catalog) -> Result<MonsterChoice, SpecError> {
    let lower = s.to_ascii_lowercase();
    match lower.as_str() {
        "" | "random" | "random monster" => return Ok(MonsterChoice::Random),
        "8" => return Ok(MonsterChoice::OutOfDepth),
        "9" => return Ok(MonsterChoice::FarOutOfDepth),
        "spectral thing" => {
            return Ok(MonsterChoice::Undead {
                kind: UndeadKind::SpectralThing,
                base: None,
                large: true,
            });
        },
        _ => {},
    }

    if let Some(caps) = HYDRA_RE.captures(&lower) {
        let heads: u32 = caps[1].parse().unwrap_or(0);
        if heads == 0 || heads > MAX_HYDRA_HEADS {
            return Err(SpecError::BadHydra(s.to_string()));
        }
        return Ok(MonsterChoice::Hydra { heads });
    }

    if let Some(base) = lower.strip_prefix("spectral ") {
        let def = undead_base(base, catalog)?;
        return Ok(MonsterChoice::Undead {
            kind: UndeadKind::SpectralThing,
            base: Some(def.0),
            large: true,
        });
    }

    for kind in [UndeadKind::Zombie, UndeadKind::Skeleton, UndeadKind::Simulacrum] {
        let Some(base) = lower.strip_suffix(kind.suffix()).and_then(|b| b.strip_suffix(' ')) else {
            continue;
        };
        let (base, large) = match base {
            "small" => (None, false),
            "large" => (None, true),
            other => {
                let (name, large) = undead_base(other, catalog)?;
                (Some(name), large)
            },
        };
        return Ok(MonsterChoice::Undead { kind, base, large });
    }

    catalog
        .monster(s)
        .map(|m| MonsterChoice::Named {
            id: m.id.clone(),
            name: m.name.clone(),
        })
        .ok_or_else(|| SpecError::UnknownMonster(s.to_string()))
}

/// Base monster for a derived undead: its name and whether the undead is the large kind.
fn undead_base(base: &str, catalog: &Catalog) -> Result<(String, bool), SpecError> {
    let def = catalog
        .monster(base)
        .ok_or_else(|| SpecError::UnknownMonster(base.to_string()))?;
    if !def.has_corpse {
        return Err(SpecError::BadUndeadBase(base.to_string()));
    }
    Ok((def.name.clone(), def.size.is_large()))
}

/// Ordered monster slots, indexed by the digits `0`-`9` on the map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonsList {
    slots: Vec<MonsSlot>,
}

impl MonsList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one slot. With `fix` the slot is fixed and drawn immediately.
    ///
    /// # Errors
    /// Returns the parse error; the list is unchanged in that case.
    pub fn add_mons<R: Rng + ?Sized>(&mut self, s: &str, fix: bool, catalog: &Catalog, rng: &mut R) -> Result<(), SpecError> {
        let mut slot = MonsSlot::parse(s, catalog)?;
        if fix {
            slot.fix_slot = true;
            slot.pick(rng);
        }
        self.slots.push(slot);
        Ok(())
    }

    /// Append every comma-separated slot in `s`. A bad slot does not stop its
    /// siblings; the first error is returned after all slots were tried.
    /// An empty `s` clears the list.
    ///
    /// # Errors
    /// Returns the first slot error encountered.
    pub fn add_mons_list<R: Rng + ?Sized>(
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
            if let Err(e) = self.add_mons(part, fix, catalog, rng) {
                warn!("skipping monster slot '{part}': {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Replace slot `index`, growing the list with empty slots if needed.
    ///
    /// # Errors
    /// Returns an error for a negative index or a bad spec.
    pub fn set_mons(&mut self, index: i64, s: &str, catalog: &Catalog) -> Result<(), SpecError> {
        let idx = usize::try_from(index).map_err(|_| SpecError::IndexOutOfRange(index))?;
        let slot = MonsSlot::parse(s, catalog)?;
        if idx >= self.slots.len() {
            self.slots.resize_with(idx + 1, MonsSlot::default);
        }
        self.slots[idx] = slot;
        Ok(())
    }

    /// Draw from slot `index`; a missing or empty slot yields a random monster.
    pub fn get_monster<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) -> MonsSpec {
        match self.slots.get_mut(index) {
            Some(slot) => slot.pick(rng),
            None => MonsSpec::random(),
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

    pub fn slots(&self) -> &[MonsSlot] {
        &self.slots
    }

    pub(crate) fn push_slot(&mut self, slot: MonsSlot) {
        self.slots.push(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn catalog() -> Catalog {
        Catalog::builtin().expect("builtin catalog")
    }

    #[test]
    fn alternatives_weights_and_counts() {
        let slot = MonsSlot::parse("orc w:20 / 3-5 goblin generate_awake", &catalog()).unwrap();
        assert_eq!(slot.alternatives.len(), 2);
        assert_eq!(slot.alternatives[0].genweight, 20);
        assert_eq!(slot.alternatives[1].genweight, DEFAULT_WEIGHT);
        assert_eq!(slot.alternatives[1].count, CountRange { min: 3, max: 5 });
        assert!(slot.alternatives[1].generate_awake);
        assert_eq!(slot.alternatives[1].describe(), "3-5 goblin");
    }

    #[test]
    fn sentinels_are_not_catalog_lookups() {
        let cat = catalog();
        let choice = |s: &str| MonsSlot::parse(s, &cat).unwrap().alternatives[0].choice.clone();
        assert_eq!(choice("8"), MonsterChoice::OutOfDepth);
        assert_eq!(choice("9"), MonsterChoice::FarOutOfDepth);
        assert_eq!(choice("random monster"), MonsterChoice::Random);
        assert_eq!(choice("7-headed hydra"), MonsterChoice::Hydra { heads: 7 });
        assert!(MonsSlot::parse("27-headed hydra", &cat).is_err());
    }

    #[test]
    fn undead_size_follows_the_base() {
        let cat = catalog();
        let choice = |s: &str| MonsSlot::parse(s, &cat).unwrap().alternatives[0].choice.clone();
        assert_eq!(
            choice("troll zombie"),
            MonsterChoice::Undead {
                kind: UndeadKind::Zombie,
                base: Some("troll".into()),
                large: true
            }
        );
        assert_eq!(
            choice("goblin skeleton"),
            MonsterChoice::Undead {
                kind: UndeadKind::Skeleton,
                base: Some("goblin".into()),
                large: false
            }
        );
        assert_eq!(
            MonsSlot::parse("wraith zombie", &cat),
            Err(SpecError::BadUndeadBase("wraith".into()))
        );
    }

    #[test]
    fn unknown_names_are_reported() {
        let err = MonsSlot::parse("orc / gruffalo", &catalog()).unwrap_err();
        assert_eq!(err.to_string(), "unknown monster: \"gruffalo\"");
    }

    #[test]
    fn fixed_slot_returns_the_same_spec() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut list = MonsList::new();
        list.add_mons("fix_slot orc / goblin / kobold / rat", false, &catalog(), &mut rng)
            .unwrap();
        let first = list.get_monster(0, &mut rng);
        for _ in 0..20 {
            assert_eq!(list.get_monster(0, &mut rng), first);
        }
    }

    #[test]
    fn multi_slot_errors_do_not_stop_siblings() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut list = MonsList::new();
        let err = list
            .add_mons_list("orc, gruffalo, goblin", false, &catalog(), &mut rng)
            .unwrap_err();
        assert_eq!(err, SpecError::UnknownMonster("gruffalo".into()));
        assert_eq!(list.len(), 2);
        list.add_mons_list("  ", false, &catalog(), &mut rng).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn set_mons_grows_and_rejects_negative_indices() {
        let mut list = MonsList::new();
        list.set_mons(2, "ogre", &catalog()).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.slots()[0].alternatives.is_empty());
        assert_eq!(
            list.set_mons(-1, "ogre", &catalog()).unwrap_err().to_string(),
            "Index out of range: -1"
        );
    }

    #[test]
    fn missing_slots_give_random_monsters() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut list = MonsList::new();
        assert_eq!(list.get_monster(4, &mut rng), MonsSpec::random());
    }
}
