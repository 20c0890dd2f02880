use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gender tag carried by a generated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which genders a generation session may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderFilter {
    Male,
    Female,
    /// Random gender per record.
    #[default]
    Any,
}

impl GenderFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Any => "any",
        }
    }

    /// Returns the fixed gender for a restricted filter, `None` for `Any`.
    pub fn fixed(self) -> Option<Gender> {
        match self {
            Self::Male => Some(Gender::Male),
            Self::Female => Some(Gender::Female),
            Self::Any => None,
        }
    }
}

impl fmt::Display for GenderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown gender filter '{0}' (expected male, female or any)")]
pub struct ParseGenderError(pub String);

impl FromStr for GenderFilter {
    type Err = ParseGenderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            "any" | "both" | "mixed" => Ok(Self::Any),
            _ => Err(ParseGenderError(value.to_string())),
        }
    }
}

/// One synthetic contact entry.
///
/// Records are built once by the generator and then shared read-only
/// (typically behind an `Arc`) between the worker, the coordinator and
/// observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    display_name: String,
    phone: String,
    email: String,
    gender: Gender,
    #[serde(default, with = "hex_image", skip_serializing_if = "Option::is_none")]
    image: Option<Vec<u8>>,
}

impl Record {
    pub fn new(
        display_name: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
        gender: Gender,
        image: Option<Vec<u8>>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            phone: phone.into(),
            email: email.into(),
            gender,
            image,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }

    /// True when the email domain equals `marker` (case-insensitive).
    pub fn has_marker(&self, marker: &str) -> bool {
        self.email
            .rsplit_once('@')
            .is_some_and(|(_, domain)| domain.eq_ignore_ascii_case(marker))
    }
}

mod hex_image {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|value| hex::decode(value).map_err(serde::de::Error::custom))
            .transpose()
    }
}
