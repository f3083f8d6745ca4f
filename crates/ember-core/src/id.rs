//! Stable particle group identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Small integer identifier of a particle group inside one particle system.
///
/// Ids are handed out densely in registration order and stay valid until the
/// owning system re-initializes its groups. The unnamed default group is
/// always `GroupId::DEFAULT`.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl GroupId {
    /// The implicit default group (empty name)
    pub const DEFAULT: Self = Self(0);

    /// Create a GroupId from a raw value (for deserialization/testing)
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Position of this group in a dense per-system table
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<usize> for GroupId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero() {
        assert_eq!(GroupId::default(), GroupId::DEFAULT);
        assert_eq!(GroupId::DEFAULT.index(), 0);
    }

    #[test]
    fn test_from_index() {
        let id = GroupId::from(3usize);
        assert_eq!(id.raw(), 3);
        assert_eq!(id.index(), 3);
        assert_eq!(format!("{id:?}"), "GroupId(3)");
    }
}
