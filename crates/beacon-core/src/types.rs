//! Shared types used across Beacon crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a textual tier or table name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind}: {value:?}")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseLabelError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ── Access tiers ──────────────────────────────────────────────────

/// Access label attached to every credential.
///
/// Tiers are unordered: `Owner` does not imply `Admin`. Every privileged
/// operation lists the tiers it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    System,
    Client,
    Admin,
    Owner,
}

impl AccessTier {
    pub const ALL: [AccessTier; 4] = [
        AccessTier::System,
        AccessTier::Client,
        AccessTier::Admin,
        AccessTier::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::System => "system",
            AccessTier::Client => "client",
            AccessTier::Admin => "admin",
            AccessTier::Owner => "owner",
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessTier {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(AccessTier::System),
            "client" => Ok(AccessTier::Client),
            "admin" => Ok(AccessTier::Admin),
            "owner" => Ok(AccessTier::Owner),
            other => Err(ParseLabelError::new("access tier", other)),
        }
    }
}

/// Which credentials a lookup considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierFilter {
    /// Only a credential stored with exactly this tier.
    Only(AccessTier),
    /// Any credential with the given id, whatever its tier.
    Any,
}

impl TierFilter {
    pub fn matches(&self, tier: AccessTier) -> bool {
        match self {
            TierFilter::Only(t) => *t == tier,
            TierFilter::Any => true,
        }
    }
}

impl From<AccessTier> for TierFilter {
    fn from(tier: AccessTier) -> Self {
        TierFilter::Only(tier)
    }
}

impl fmt::Display for TierFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierFilter::Only(t) => t.fmt(f),
            TierFilter::Any => f.write_str("any"),
        }
    }
}

impl FromStr for TierFilter {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "any" {
            return Ok(TierFilter::Any);
        }
        s.parse::<AccessTier>()
            .map(TierFilter::Only)
            .map_err(|_| ParseLabelError::new("access tier", s))
    }
}

// ── Tables ────────────────────────────────────────────────────────

/// The two persisted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Credentials,
    SystemRecords,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Credentials => "credentials",
            Table::SystemRecords => "system_records",
        }
    }

    /// Ordered column names. The first column is always the row id.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Credentials => &["id", "password_hash", "access_tier"],
            Table::SystemRecords => &["id", "display_name", "heartbeat", "telemetry"],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credentials" => Ok(Table::Credentials),
            "system_records" => Ok(Table::SystemRecords),
            other => Err(ParseLabelError::new("table", other)),
        }
    }
}
