//! Table and column identifiers
//!
//! Tables are a closed set; columns are validated identifiers. Neither is ever
//! built from unchecked input, so both are safe to splice into SQL.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Postgres truncates identifiers beyond this length
const MAX_COLUMN_LEN: usize = 63;

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("invalid identifier regex"));

/// Tables the tooling is allowed to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Organizations,
    Campaigns,
    Leads,
    Contacts,
    Calls,
    Users,
    CallAttempts,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Organizations,
        Table::Campaigns,
        Table::Leads,
        Table::Contacts,
        Table::Calls,
        Table::Users,
        Table::CallAttempts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organizations => "organizations",
            Self::Campaigns => "campaigns",
            Self::Leads => "leads",
            Self::Contacts => "contacts",
            Self::Calls => "calls",
            Self::Users => "users",
            Self::CallAttempts => "call_attempts",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidVariant {
                field: "table",
                value: s.to_owned(),
            })
    }
}

/// Validated column name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column(String);

impl Column {
    /// Create a column name, validating identifier format.
    ///
    /// # Example
    /// ```
    /// use callctl_core::models::Column;
    ///
    /// assert!(Column::new("vapi_call_id").is_ok());
    /// assert!(Column::new("Status").is_err());
    /// assert!(Column::new("id; drop table calls").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "column" });
        }

        if s.len() > MAX_COLUMN_LEN {
            return Err(ValidationError::TooLong {
                field: "column",
                max: MAX_COLUMN_LEN,
            });
        }

        if !IDENT_RE.is_match(s) {
            return Err(ValidationError::InvalidFormat {
                field: "column",
                reason: "must be lowercase letters, digits and underscores, not starting with a digit",
            });
        }

        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Column {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Column {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_round_trips_through_name() {
        for table in Table::ALL {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), table);
        }
    }

    #[test]
    fn unknown_table_rejected() {
        let err = "pg_authid".parse::<Table>().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidVariant { field: "table", .. }));
    }

    #[test]
    fn column_rules() {
        assert!(Column::new("status").is_ok());
        assert!(Column::new("_private").is_ok());
        assert!(Column::new("").is_err());
        assert!(Column::new("1st").is_err());
        assert!(Column::new("recording-url").is_err());
        assert!(Column::new(&"a".repeat(64)).is_err());
    }
}
