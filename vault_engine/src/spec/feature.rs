//! Feature slots for `KFEAT:`: a glyph, a named feature, a shop or a trap.

use rand::Rng;

use super::{DEFAULT_WEIGHT, SpecError, clean_spec, find_weight, strip_leading_fix, strip_tag};
use crate::catalog::Catalog;
use crate::weighted::pick_weighted;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureKind {
    /// Place whatever the glyph would normally produce.
    Glyph(char),
    Feature { id: String, name: String },
    /// `None` means a random shop.
    Shop(Option<String>),
    /// `None` means a random trap.
    Trap(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSpec {
    pub kind: FeatureKind,
    pub genweight: u32,
}

impl FeatureSpec {
    pub fn glyph(glyph: char) -> Self {
        Self {
            kind: FeatureKind::Glyph(glyph),
            genweight: DEFAULT_WEIGHT,
        }
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            FeatureKind::Glyph(c) => c.to_string(),
            FeatureKind::Feature { name, .. } => name.clone(),
            FeatureKind::Shop(None) => "any shop".to_string(),
            FeatureKind::Shop(Some(id)) => format!("{id} shop"),
            FeatureKind::Trap(None) => "trap".to_string(),
            FeatureKind::Trap(Some(id)) => format!("{id} trap"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureSlot {
    pub feats: Vec<FeatureSpec>,
    pub fix_slot: bool,
    frozen: Option<FeatureSpec>,
    source: String,
}

impl FeatureSlot {
    /// Parse a `/`-separated feature slot.
    ///
    /// # Errors
    /// Returns the first alternative that names no known feature, shop or trap.
    pub fn parse(spec: &str, catalog: &Catalog) -> Result<Self, SpecError> {
        let mut text = clean_spec(spec);
        let mut fix_slot = strip_tag(&mut text, "fix_slot");
        fix_slot |= strip_leading_fix(&mut text);

        let mut feats = Vec::new();
        if !text.is_empty() {
            for alt in text.split('/') {
                feats.extend(parse_single_spec(alt, catalog)?);
            }
        }
        Ok(Self {
            feats,
            fix_slot,
            frozen: None,
            source: spec.trim().to_string(),
        })
    }

    /// Choose a feature; an empty slot falls back to `default_glyph`.
    pub fn get_feat<R: Rng + ?Sized>(&mut self, default_glyph: char, rng: &mut R) -> FeatureSpec {
        if let Some(frozen) = &self.frozen {
            return frozen.clone();
        }
        let chosen = pick_weighted(&self.feats, |f| f.genweight, rng)
            .cloned()
            .unwrap_or_else(|| FeatureSpec::glyph(default_glyph));
        if self.fix_slot && !self.feats.is_empty() {
            self.frozen = Some(chosen.clone());
        }
        chosen
    }

    pub fn is_empty(&self) -> bool {
        self.feats.is_empty()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

fn parse_single_spec(alt: &str, catalog: &Catalog) -> Result<Vec<FeatureSpec>, SpecError> {
    let mut s = clean_spec(alt);
    let genweight = match find_weight(&mut s)? {
        Some(w) if w > 0 => u32::try_from(w).unwrap_or(u32::MAX),
        _ => DEFAULT_WEIGHT,
    };

    let mut chars = s.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(vec![FeatureSpec {
            kind: FeatureKind::Glyph(c),
            genweight,
        }]);
    }

    let lower = s.to_ascii_lowercase();
    let kind = if lower.contains("trap") {
        Some(parse_trap(&lower, catalog)?)
    } else if lower.contains("shop") && lower != "abandoned shop" {
        Some(parse_shop(&lower, catalog)?)
    } else {
        None
    };
    if let Some(kind) = kind {
        return Ok(vec![FeatureSpec { kind, genweight }]);
    }

    let matches = catalog.features_matching(&lower);
    if matches.is_empty() {
        return Err(SpecError::UnknownFeature(s));
    }
    Ok(matches
        .into_iter()
        .map(|f| FeatureSpec {
            kind: FeatureKind::Feature {
                id: f.id.clone(),
                name: f.name.clone(),
            },
            genweight,
        })
        .collect())
}

fn parse_trap(s: &str, catalog: &Catalog) -> Result<FeatureKind, SpecError> {
    if matches!(s, "trap" | "random trap" | "any trap") {
        return Ok(FeatureKind::Trap(None));
    }
    let base = s.strip_suffix(" trap").unwrap_or(s);
    catalog
        .trap(s)
        .or_else(|| catalog.trap(base))
        .map(|t| FeatureKind::Trap(Some(t.id.clone())))
        .ok_or_else(|| SpecError::UnknownTrap(s.to_string()))
}

fn parse_shop(s: &str, catalog: &Catalog) -> Result<FeatureKind, SpecError> {
    if matches!(s, "shop" | "random shop" | "any shop") {
        return Ok(FeatureKind::Shop(None));
    }
    let base = s.strip_suffix(" shop").unwrap_or(s);
    catalog
        .shop(s)
        .or_else(|| catalog.shop(base))
        .map(|sh| FeatureKind::Shop(Some(sh.id.clone())))
        .ok_or_else(|| SpecError::UnknownShop(s.to_string()))
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
    fn single_characters_are_glyphs() {
        let slot = FeatureSlot::parse("W", &catalog()).unwrap();
        assert_eq!(slot.feats, vec![FeatureSpec::glyph('W')]);
    }

    #[test]
    fn shops_traps_and_named_features() {
        let cat = catalog();
        let slot = FeatureSlot::parse("weapon shop / trap / dart trap w:30 / abandoned shop", &cat).unwrap();
        let kinds: Vec<_> = slot.feats.iter().map(|f| f.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                FeatureKind::Shop(Some("weapon".into())),
                FeatureKind::Trap(None),
                FeatureKind::Trap(Some("dart".into())),
                FeatureKind::Feature {
                    id: "abandoned_shop".into(),
                    name: "abandoned shop".into()
                },
            ]
        );
        assert_eq!(slot.feats[2].genweight, 30);
    }

    #[test]
    fn fuzzy_feature_names_expand() {
        let slot = FeatureSlot::parse("fountain", &catalog()).unwrap();
        assert_eq!(slot.feats.len(), 2);
        assert!(FeatureSlot::parse("moon gate", &catalog()).is_err());
        assert_eq!(
            FeatureSlot::parse("pizza shop", &catalog()).unwrap_err(),
            SpecError::UnknownShop("pizza shop".into())
        );
    }

    #[test]
    fn empty_slots_use_the_default_glyph() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut slot = FeatureSlot::default();
        assert_eq!(slot.get_feat('.', &mut rng), FeatureSpec::glyph('.'));
    }

    #[test]
    fn fixed_slots_freeze() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut slot = FeatureSlot::parse("fix_slot lava / deep water / granite statue", &catalog()).unwrap();
        let first = slot.get_feat('.', &mut rng);
        for _ in 0..8 {
            assert_eq!(slot.get_feat('.', &mut rng), first);
        }
    }
}
