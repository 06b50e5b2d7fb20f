//! ** idgen module **
//! Stable v5 uuids for map definitions, so a map keeps its id across
//! reloads and cache rebuilds.
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NAMESPACE_MAP: Uuid = uuid::uuid!("5b0e2f6a-8d1c-4e37-9a41-c2f7d3b96e08");

/// Identity of a loaded map definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId(pub Uuid);

impl MapId {
    /// Id for the map named `name`. Map names are unique, so this is too.
    pub fn from_name(name: &str) -> Self {
        MapId(uuid_from_token(&NAMESPACE_MAP, name))
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a v5 UUID for `token` within `namespace`.
pub fn uuid_from_token(namespace: &Uuid, token: &str) -> Uuid {
    Uuid::new_v5(namespace, token.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_per_name() {
        assert_eq!(MapId::from_name("guard_room"), MapId::from_name("guard_room"));
        assert_ne!(MapId::from_name("guard_room"), MapId::from_name("guard_room2"));
        assert_eq!(MapId::from_name("x").0.get_version_num(), 5);
    }
}
