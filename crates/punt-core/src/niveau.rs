//! Dutch reference levels (referentieniveaus) for writing skills.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Niveau {
    #[serde(rename = "1F")]
    F1,
    #[serde(rename = "2F")]
    F2,
    #[serde(rename = "3F")]
    F3,
    #[serde(rename = "4F")]
    F4,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown niveau {0:?} (expected 1F, 2F, 3F or 4F)")]
pub struct ParseNiveauError(String);

impl Niveau {
    pub const ALL: [Niveau; 4] = [Niveau::F1, Niveau::F2, Niveau::F3, Niveau::F4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F1 => "1F",
            Self::F2 => "2F",
            Self::F3 => "3F",
            Self::F4 => "4F",
        }
    }

    /// Display name as shown to teachers.
    pub fn level_name(&self) -> &'static str {
        match self {
            Self::F1 => "1F - Basisniveau",
            Self::F2 => "2F - Midden",
            Self::F3 => "3F - Gevorderd",
            Self::F4 => "4F - Expert",
        }
    }
}

impl fmt::Display for Niveau {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Niveau {
    type Err = ParseNiveauError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1F" => Ok(Self::F1),
            "2F" => Ok(Self::F2),
            "3F" => Ok(Self::F3),
            "4F" => Ok(Self::F4),
            _ => Err(ParseNiveauError(s.to_string())),
        }
    }
}
