use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapDataRuleType {
    OnlyAllowed,
    NotAllowed,
}

impl MapDataRuleType {
    /// `only_*` values allow a single manoeuvre. Anything else, a missing value
    /// included, prohibits.
    pub fn from_restriction(restriction: Option<&str>) -> Self {
        match restriction {
            Some(value) if value.starts_with("only_") => MapDataRuleType::OnlyAllowed,
            _ => MapDataRuleType::NotAllowed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionKind {
    NoLeftTurn,
    NoRightTurn,
    NoStraightOn,
    NoUTurn,
    NoEntry,
    NoExit,
    OnlyLeftTurn,
    OnlyRightTurn,
    OnlyStraightOn,
    OnlyUTurn,
}

impl RestrictionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestrictionKind::NoLeftTurn => "no_left_turn",
            RestrictionKind::NoRightTurn => "no_right_turn",
            RestrictionKind::NoStraightOn => "no_straight_on",
            RestrictionKind::NoUTurn => "no_u_turn",
            RestrictionKind::NoEntry => "no_entry",
            RestrictionKind::NoExit => "no_exit",
            RestrictionKind::OnlyLeftTurn => "only_left_turn",
            RestrictionKind::OnlyRightTurn => "only_right_turn",
            RestrictionKind::OnlyStraightOn => "only_straight_on",
            RestrictionKind::OnlyUTurn => "only_u_turn",
        }
    }

    pub fn rule_type(&self) -> MapDataRuleType {
        MapDataRuleType::from_restriction(Some(self.as_str()))
    }
}

impl Display for RestrictionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("Unknown restriction '{value}'")]
pub struct UnknownRestrictionError {
    pub value: String,
}

impl FromStr for RestrictionKind {
    type Err = UnknownRestrictionError;

    /// Conditional values such as `no_left_turn @ (Mo-Fr 07:00-09:00)` parse by their first word.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split(' ').next() {
            Some("no_left_turn") => Ok(RestrictionKind::NoLeftTurn),
            Some("no_right_turn") => Ok(RestrictionKind::NoRightTurn),
            Some("no_straight_on") => Ok(RestrictionKind::NoStraightOn),
            Some("no_u_turn") => Ok(RestrictionKind::NoUTurn),
            Some("no_entry") => Ok(RestrictionKind::NoEntry),
            Some("no_exit") => Ok(RestrictionKind::NoExit),
            Some("only_left_turn") => Ok(RestrictionKind::OnlyLeftTurn),
            Some("only_right_turn") => Ok(RestrictionKind::OnlyRightTurn),
            Some("only_straight_on") => Ok(RestrictionKind::OnlyStraightOn),
            Some("only_u_turn") => Ok(RestrictionKind::OnlyUTurn),
            _ => Err(UnknownRestrictionError {
                value: value.to_string(),
            }),
        }
    }
}
