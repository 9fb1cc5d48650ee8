use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Digit-group lengths of a business registration number: `DDD-DD-DDDDD`.
const GROUPS: [usize; 3] = [3, 2, 5];

/// A business registration number in its hyphenated `DDD-DD-DDDDD` form.
///
/// Only [`Identifier::parse`] builds one, so a held value always matches the
/// pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Malformed business registration number: '{0}'")]
    Malformed(String),
}

impl Identifier {
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let groups: Vec<&str> = s.split('-').collect();
        let well_formed = groups.len() == GROUPS.len()
            && groups
                .iter()
                .zip(GROUPS)
                .all(|(g, len)| g.len() == len && g.bytes().all(|b| b.is_ascii_digit()));
        if well_formed {
            Ok(Identifier(s.to_string()))
        } else {
            Err(IdentifierError::Malformed(s.to_string()))
        }
    }

    /// Hyphenated form, as it appeared in the document.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 10 bare digits sent to the registry.
    pub fn digits(&self) -> String {
        self.0.chars().filter(|c| *c != '-').collect()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Identifier {
    type Err = IdentifierError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Identifier::parse(&s)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

/// Business status pulled out of a registry response.
///
/// Either field may be missing when the response did not have the expected
/// shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: Option<String>,
    pub description: Option<String>,
}

impl StatusRecord {
    pub fn new(status: Option<String>, description: Option<String>) -> Self {
        Self { status, description }
    }

    /// Neither field could be found: the response shape was not recognized.
    pub fn is_unparsable(&self) -> bool {
        self.status.is_none() && self.description.is_none()
    }

    /// Exactly one of the two fields was found.
    pub fn is_partial(&self) -> bool {
        self.status.is_some() != self.description.is_some()
    }
}
