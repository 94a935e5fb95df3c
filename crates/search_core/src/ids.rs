//! Opaque identifiers.
//!
//! Spots and groups never hold references to agents or to vision-map
//! entries. Everything crosses module boundaries as a plain integer id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an agent (or any entity the agent directory knows about).
///
/// `AgentId::NONE` (0) means "no entity", matching how the game layer
/// encodes a missing target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct AgentId(pub u64);

impl AgentId {
    /// The null entity.
    pub const NONE: Self = Self(0);

    /// Returns true if this is the null entity.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Identifier of a tactical group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// Handle issued by the vision map for an observer or an observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VisionId(pub u32);

impl fmt::Display for VisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vision#{}", self.0)
    }
}
