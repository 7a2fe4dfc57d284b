use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two membership sets a principal owns.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Favorites,
    Watchlist,
}

impl ListKind {
    pub const ALL: [ListKind; 2] = [ListKind::Favorites, ListKind::Watchlist];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Favorites => "favorites",
            ListKind::Watchlist => "watchlist",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for ListKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "favorites" => Ok(ListKind::Favorites),
            "watchlist" => Ok(ListKind::Watchlist),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Kind of catalogue item an entry points at.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Movie,
    Tv,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Movie => "movie",
            ResourceKind::Tv => "tv",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ResourceKind::Movie),
            "tv" => Ok(ResourceKind::Tv),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// One member of a favorites or watchlist set. Identity is the
/// `(resource_id, resource_kind)` pair.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MembershipEntry {
    pub resource_id: i64,
    pub resource_kind: ResourceKind,
}

impl MembershipEntry {
    pub fn new(resource_id: i64, resource_kind: ResourceKind) -> Self {
        MembershipEntry {
            resource_id,
            resource_kind,
        }
    }

    pub fn movie(resource_id: i64) -> Self {
        Self::new(resource_id, ResourceKind::Movie)
    }

    pub fn tv(resource_id: i64) -> Self {
        Self::new(resource_id, ResourceKind::Tv)
    }
}

impl fmt::Display for MembershipEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_kind, self.resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_uses_lowercase_kind_on_the_wire() {
        let json = serde_json::to_value(MembershipEntry::movie(42)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "resource_id": 42, "resource_kind": "movie" })
        );
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        assert!("music".parse::<ResourceKind>().is_err());
        assert!(serde_json::from_value::<MembershipEntry>(
            serde_json::json!({ "resource_id": 1, "resource_kind": "music" })
        )
        .is_err());
        assert_eq!("watchlist".parse::<ListKind>().unwrap(), ListKind::Watchlist);
    }
}
