//! # ISRC
//! Validated International Standard Recording Code.
//!
//! Layout (12 ASCII chars after normalization):
//! `CC` country (letters) · `XXX` registrant (alphanumeric) · `YY` year (digits) ·
//! `NNNNN` designation (digits).
//!
//! The display form `US-RC1-76-07839` is accepted; hyphens and spaces are
//! stripped and letters upper-cased before validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const ISRC_LEN: usize = 12;

/// Structural validation failure. Carries the offending segment so callers
/// can report it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsrcError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier must be {ISRC_LEN} characters, got {actual}")]
    Length { actual: usize },
    #[error("country code must be two letters, got '{0}'")]
    Country(String),
    #[error("registrant code must be three letters or digits, got '{0}'")]
    Registrant(String),
    #[error("year must be two digits, got '{0}'")]
    Year(String),
    #[error("designation code must be five digits, got '{0}'")]
    Designation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isrc(String);

impl Isrc {
    pub fn parse(raw: &str) -> Result<Self, IsrcError> {
        let code: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if code.is_empty() {
            return Err(IsrcError::Empty);
        }
        let len = code.chars().count();
        if len != ISRC_LEN || !code.is_ascii() {
            return Err(IsrcError::Length { actual: len });
        }

        let (country, rest) = code.split_at(2);
        let (registrant, rest) = rest.split_at(3);
        let (year, designation) = rest.split_at(2);

        if !country.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(IsrcError::Country(country.to_string()));
        }
        if !registrant
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(IsrcError::Registrant(registrant.to_string()));
        }
        if !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(IsrcError::Year(year.to_string()));
        }
        if !designation.chars().all(|c| c.is_ascii_digit()) {
            return Err(IsrcError::Designation(designation.to_string()));
        }

        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Country of the registrant (not necessarily the artist's country).
    pub fn country_code(&self) -> &str {
        &self.0[0..2]
    }

    pub fn registrant(&self) -> &str {
        &self.0[2..5]
    }

    /// Two-digit year of reference.
    pub fn year(&self) -> &str {
        &self.0[5..7]
    }

    pub fn designation(&self) -> &str {
        &self.0[7..12]
    }

    /// Hyphenated display form, e.g. `US-RC1-76-07839`.
    pub fn hyphenated(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.country_code(),
            self.registrant(),
            self.year(),
            self.designation()
        )
    }
}

impl fmt::Display for Isrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isrc {
    type Err = IsrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Isrc {
    type Error = IsrcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Isrc> for String {
    fn from(value: Isrc) -> Self {
        value.0
    }
}
