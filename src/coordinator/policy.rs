//! Pairing policies: how long a session keeps a backend connection.

use serde::{Deserialize, Serialize};

use crate::error::PoolerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingPolicy {
    /// One connection for the whole session.
    Session,
    /// Bound lazily on the first request, released when the transaction ends.
    #[default]
    Transaction,
    /// Bound for a single request; transactions are not allowed.
    Statement,
}

impl PairingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairingPolicy::Session => "session",
            PairingPolicy::Transaction => "transaction",
            PairingPolicy::Statement => "statement",
        }
    }

    /// Whether a session under this policy should still hold its
    /// connection once it is outside a transaction.
    pub fn holds_between_transactions(&self) -> bool {
        matches!(self, PairingPolicy::Session)
    }
}

impl std::fmt::Display for PairingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PairingPolicy {
    type Err = PoolerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(PairingPolicy::Session),
            "transaction" => Ok(PairingPolicy::Transaction),
            "statement" => Ok(PairingPolicy::Statement),
            other => Err(PoolerError::Protocol(format!("unknown pairing policy '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Statement".parse::<PairingPolicy>().unwrap(), PairingPolicy::Statement);
        assert_eq!(" session ".parse::<PairingPolicy>().unwrap(), PairingPolicy::Session);
        assert!("pooled".parse::<PairingPolicy>().is_err());
    }

    #[test]
    fn only_session_pairing_holds_between_transactions() {
        assert!(PairingPolicy::Session.holds_between_transactions());
        assert!(!PairingPolicy::Transaction.holds_between_transactions());
        assert!(!PairingPolicy::Statement.holds_between_transactions());
    }
}
