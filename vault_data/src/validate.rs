use std::collections::HashSet;
use std::fmt;

use crate::*;

/// Validation error for duplicate or missing entries in a `CatalogDef`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateId { kind: &'static str, id: String },
    MissingReference { kind: &'static str, id: String, context: String },
    InvalidValue { context: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateId { kind, id } => {
                write!(f, "duplicate {kind} id '{id}'")
            },
            ValidationError::MissingReference { kind, id, context } => {
                write!(f, "missing {kind} '{id}' ({context})")
            },
            ValidationError::InvalidValue { context } => {
                write!(f, "invalid value ({context})")
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check a catalog for duplicate ids, blank names and missing required entries.
///
/// ```
/// use vault_data::{CatalogDef, FeatureDef, MonsterDef, validate_catalog};
///
/// let catalog = CatalogDef {
///     monsters: vec![MonsterDef {
///         id: "orc".into(),
///         name: "orc".into(),
///         size: Default::default(),
///         has_corpse: true,
///     }],
///     features: vec![FeatureDef {
///         id: "floor".into(),
///         name: "floor".into(),
///         glyph: Some('.'),
///     }],
///     ..CatalogDef::default()
/// };
/// assert!(validate_catalog(&catalog).is_empty());
/// ```
pub fn validate_catalog(catalog: &CatalogDef) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut monsters = HashSet::new();
    let mut classes = HashSet::new();
    let mut items = HashSet::new();
    let mut features = HashSet::new();
    let mut shops = HashSet::new();
    let mut traps = HashSet::new();

    track_ids(
        "monster",
        catalog.monsters.iter().map(|m| m.id.as_str()),
        &mut monsters,
        &mut errors,
    );
    track_ids(
        "item class",
        catalog.item_classes.iter().map(|c| c.id.as_str()),
        &mut classes,
        &mut errors,
    );
    track_ids(
        "item",
        catalog.item_classes.iter().flat_map(|c| c.items.iter().map(|i| i.id.as_str())),
        &mut items,
        &mut errors,
    );
    track_ids(
        "feature",
        catalog.features.iter().map(|f| f.id.as_str()),
        &mut features,
        &mut errors,
    );
    track_ids("shop", catalog.shops.iter().map(|s| s.id.as_str()), &mut shops, &mut errors);
    track_ids("trap", catalog.traps.iter().map(|t| t.id.as_str()), &mut traps, &mut errors);

    check_ref(
        "feature",
        DEFAULT_FEATURE,
        &features,
        "default floor feature".to_string(),
        &mut errors,
    );

    let named = catalog
        .monsters
        .iter()
        .map(|m| ("monster", m.id.as_str(), m.name.as_str()))
        .chain(catalog.item_classes.iter().map(|c| ("item class", c.id.as_str(), c.name.as_str())))
        .chain(
            catalog
                .item_classes
                .iter()
                .flat_map(|c| c.items.iter().map(|i| ("item", i.id.as_str(), i.name.as_str()))),
        )
        .chain(catalog.features.iter().map(|f| ("feature", f.id.as_str(), f.name.as_str())))
        .chain(catalog.shops.iter().map(|s| ("shop", s.id.as_str(), s.name.as_str())))
        .chain(catalog.traps.iter().map(|t| ("trap", t.id.as_str(), t.name.as_str())));
    for (kind, id, name) in named {
        if name.trim().is_empty() {
            errors.push(ValidationError::InvalidValue {
                context: format!("{kind} '{id}' has an empty name"),
            });
        }
    }

    let mut glyphs = HashSet::new();
    for feature in &catalog.features {
        if let Some(glyph) = feature.glyph
            && !glyphs.insert(glyph)
        {
            errors.push(ValidationError::DuplicateId {
                kind: "feature glyph",
                id: glyph.to_string(),
            });
        }
    }

    errors
}

fn track_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
    set: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    for id in ids {
        if !set.insert(id.to_string()) {
            errors.push(ValidationError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
}

fn check_ref(kind: &'static str, id: &str, set: &HashSet<String>, context: String, errors: &mut Vec<ValidationError>) {
    if !set.contains(id) {
        errors.push(ValidationError::MissingReference {
            kind,
            id: id.to_string(),
            context,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor() -> FeatureDef {
        FeatureDef {
            id: "floor".into(),
            name: "floor".into(),
            glyph: Some('.'),
        }
    }

    #[test]
    fn duplicate_monster_ids_are_reported() {
        let orc = MonsterDef {
            id: "orc".into(),
            name: "orc".into(),
            size: BodySize::Medium,
            has_corpse: true,
        };
        let catalog = CatalogDef {
            monsters: vec![orc.clone(), orc],
            features: vec![floor()],
            ..CatalogDef::default()
        };
        let errors = validate_catalog(&catalog);
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateId {
                kind: "monster",
                id: "orc".into()
            }]
        );
    }

    #[test]
    fn missing_floor_and_shared_glyphs_are_reported() {
        let catalog = CatalogDef {
            features: vec![
                FeatureDef {
                    id: "rock_wall".into(),
                    name: "rock wall".into(),
                    glyph: Some('x'),
                },
                FeatureDef {
                    id: "stone_wall".into(),
                    name: "stone wall".into(),
                    glyph: Some('x'),
                },
            ],
            ..CatalogDef::default()
        };
        let errors = validate_catalog(&catalog);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].to_string(), "missing feature 'floor' (default floor feature)");
        assert_eq!(errors[1].to_string(), "duplicate feature glyph id 'x'");
    }

    #[test]
    fn blank_names_are_invalid() {
        let catalog = CatalogDef {
            features: vec![floor()],
            traps: vec![TrapDef {
                id: "dart".into(),
                name: "  ".into(),
            }],
            ..CatalogDef::default()
        };
        let errors = validate_catalog(&catalog);
        assert_eq!(
            errors,
            vec![ValidationError::InvalidValue {
                context: "trap 'dart' has an empty name".into()
            }]
        );
    }
}
