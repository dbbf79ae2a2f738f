//! Discipline tag validation.
//!
//! A discipline names a document type within a project (e.g. `villa_plan`,
//! `structural`). It doubles as a directory name in the blob tree, so valid
//! tags:
//! - are 1 to 64 characters after trimming
//! - contain only lowercase ASCII letters, digits, `_` and `-`
//! - start with a letter or digit
//!
//! Input is trimmed and lowercased before validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum length of a discipline tag.
pub const MAX_DISCIPLINE_LEN: usize = 64;

/// A validated document-type tag.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Discipline(String);

impl Discipline {
    /// Validate and normalize a discipline tag.
    ///
    /// ```
    /// use dossier_types::Discipline;
    ///
    /// assert_eq!(Discipline::new(" Villa_Plan ").unwrap().as_str(), "villa_plan");
    /// assert!(Discipline::new("").is_err());
    /// assert!(Discipline::new("../etc").is_err());
    /// ```
    pub fn new(tag: impl AsRef<str>) -> Result<Self, TypeError> {
        let raw = tag.as_ref();
        let tag = raw.trim().to_ascii_lowercase();
        let invalid = |reason: &str| TypeError::InvalidDiscipline {
            tag: raw.to_string(),
            reason: reason.into(),
        };

        if tag.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if tag.len() > MAX_DISCIPLINE_LEN {
            return Err(invalid("longer than 64 characters"));
        }
        if let Some(ch) = tag
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
        {
            return Err(invalid(&format!("contains forbidden character: {ch:?}")));
        }
        if !tag.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(invalid("must start with a letter or digit"));
        }

        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Discipline {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Discipline {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Discipline> for String {
    fn from(value: Discipline) -> Self {
        value.0
    }
}

impl AsRef<str> for Discipline {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Discipline({})", self.0)
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
