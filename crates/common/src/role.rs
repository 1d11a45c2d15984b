//! User roles. A role doubles as the price tier a customer buys at.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    /// Buys at the retail price column.
    #[default]
    Retail,
    /// Buys at the reseller price column.
    Reseller,
    /// Buys at the allied-store price column.
    AlliedStore,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Retail => "retail",
            Role::Reseller => "reseller",
            Role::AlliedStore => "allied_store",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "retail" => Ok(Role::Retail),
            "reseller" => Ok(Role::Reseller),
            "allied_store" => Ok(Role::AlliedStore),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}
