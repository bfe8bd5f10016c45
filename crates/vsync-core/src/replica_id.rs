//! ReplicaId: Stable identifier of one replica of a synchronized tree.
//!
//! Chosen by the user at `init` time ("Laptop", "Main Library", ...) and used
//! as the key of every version vector.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplicaIdError {
    #[error("Replica ID must not be empty")]
    Empty,
    #[error("Replica ID contains a control character: {0:?}")]
    ControlCharacter(String),
}

/// A validated replica identifier.
///
/// Any non-empty string without control characters is accepted. Ordering is
/// plain byte-wise string ordering, which is what the merge tie-break uses.
///
/// # Examples
/// ```
/// use vsync_core::ReplicaId;
///
/// let id: ReplicaId = "Laptop".parse().unwrap();
/// assert_eq!(id.as_str(), "Laptop");
/// assert!("".parse::<ReplicaId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ReplicaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReplicaId {
    type Err = ReplicaIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ReplicaIdError::Empty);
        }
        if s.chars().any(char::is_control) {
            return Err(ReplicaIdError::ControlCharacter(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<&str> for ReplicaId {
    type Error = ReplicaIdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl AsRef<str> for ReplicaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Serialize as a plain string so it also works as a JSON map key
impl serde::Serialize for ReplicaId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ReplicaId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
