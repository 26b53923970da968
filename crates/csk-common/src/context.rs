//! Sweep context
//!
//! Identity and mode a sweep attempt runs under. The context is supplied at
//! construction and never changes for the lifetime of an attempt; a wallet
//! whose key configuration changes mid-attempt must start a fresh attempt
//! with a fresh context.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// New random account id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AccountId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server environment the co-signing service is reached in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production co-signer
    Production,
    /// Staging co-signer
    Staging,
    /// Local or CI co-signer
    Development,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Staging => write!(f, "staging"),
            Environment::Development => write!(f, "development"),
        }
    }
}

/// Why the wallet is being swept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    /// Funds are moved after account recovery or key rotation
    Recovery,
    /// Funds are moved as part of a wallet migration. On a migration with
    /// nothing to sweep the caller's success callback is invoked directly
    /// instead of surfacing a no-funds screen.
    Migration,
}

/// Context a sweep attempt runs under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepContext {
    /// Co-signer environment
    pub environment: Environment,
    /// Account the sweep belongs to
    pub account_id: AccountId,
    /// Recovery or migration
    pub mode: SweepMode,
}

impl SweepContext {
    /// Whether this attempt runs in a wallet-migration context
    pub fn is_migration(&self) -> bool {
        self.mode == SweepMode::Migration
    }
}
