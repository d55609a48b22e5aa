//! Vote entity. One row per voter fingerprint.

use std::fmt;
use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use tally_common::AppError;

/// The two possible answers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    #[sea_orm(string_value = "yes")]
    Yes,
    #[sea_orm(string_value = "no")]
    No,
}

impl Choice {
    /// Wire and storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Choice {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            other => Err(AppError::Validation(format!("Invalid choice: {other:?}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "votes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub choice: Choice,

    /// Salted hash of the voter's IP and user agent.
    #[sea_orm(unique)]
    pub fingerprint: String,

    pub user_agent: Option<String>,

    pub ip: Option<String>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_parse() {
        assert_eq!("yes".parse::<Choice>().ok(), Some(Choice::Yes));
        assert_eq!("no".parse::<Choice>().ok(), Some(Choice::No));
    }

    #[test]
    fn test_choice_rejects_other_values() {
        for raw in ["maybe", "", "YES", " yes", "No"] {
            assert!(matches!(raw.parse::<Choice>(), Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn test_choice_display() {
        assert_eq!(Choice::Yes.to_string(), "yes");
        assert_eq!(Choice::No.to_string(), "no");
    }
}
