//! Transaction state machine.
//!
//! ```text
//! None   --begin-->              Active
//! Active --commit | rollback-->  None
//! Active --backend error-->      Failed
//! Failed --rollback | commit-->  None
//! ```
//! A commit in `Failed` is answered by the server as a rollback, so both
//! end the transaction. Disconnecting in `Active` or `Failed` rolls back
//! before the connection is released.

use serde::Serialize;

use crate::protocol::RequestMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnState {
    #[default]
    None,
    Active,
    Failed,
}

impl TxnState {
    pub fn is_open(&self) -> bool {
        !matches!(self, TxnState::None)
    }

    /// State after a request with `marker` got a response.
    pub fn after(self, marker: RequestMarker, response_failed: bool) -> TxnState {
        match (self, marker) {
            (_, RequestMarker::Commit) | (_, RequestMarker::Rollback) if self.is_open() => TxnState::None,
            (TxnState::None, RequestMarker::Begin) if !response_failed => TxnState::Active,
            (TxnState::None, _) => TxnState::None,
            (TxnState::Active, _) if response_failed => TxnState::Failed,
            (state, _) => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestMarker::*;

    #[test]
    fn begin_commit_cycle() {
        let state = TxnState::None.after(Begin, false);
        assert_eq!(state, TxnState::Active);
        let state = state.after(Statement, false);
        assert_eq!(state, TxnState::Active);
        assert_eq!(state.after(Commit, false), TxnState::None);
        assert_eq!(state.after(Rollback, false), TxnState::None);
    }

    #[test]
    fn error_inside_transaction_fails_it() {
        let failed = TxnState::Active.after(Statement, true);
        assert_eq!(failed, TxnState::Failed);
        assert_eq!(failed.after(Statement, false), TxnState::Failed);
        assert_eq!(failed.after(Rollback, false), TxnState::None);
        assert_eq!(failed.after(Commit, true), TxnState::None);
    }

    #[test]
    fn failed_begin_or_stray_commit_outside_transaction() {
        assert_eq!(TxnState::None.after(Begin, true), TxnState::None);
        assert_eq!(TxnState::None.after(Commit, false), TxnState::None);
        assert_eq!(TxnState::None.after(Statement, true), TxnState::None);
    }
}
