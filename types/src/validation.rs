//! Outcome of checking one identity against the remote ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Identity;

/// Transfer activity reported alongside a balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub incoming_amount: u64,
    pub outgoing_amount: u64,
    pub incoming_transfers: u32,
    pub outgoing_transfers: u32,
}

impl Activity {
    #[must_use]
    pub fn has_activity(&self, balance: u64) -> bool {
        balance > 0
            || self.incoming_amount > 0
            || self.outgoing_amount > 0
            || self.incoming_transfers > 0
            || self.outgoing_transfers > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The request exceeded its deadline.
    Timeout,
    /// Connection or protocol failure before a response arrived.
    Transport,
    /// The ledger answered with a status that is neither success nor "not found".
    HttpStatus,
    /// The ledger answered 2xx but the body did not parse.
    MalformedResponse,
}

impl RemoteErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::HttpStatus => "http_status",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a check ended indeterminate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of a single identity check.
///
/// `exists == false` with `error == None` means confirmed absent. Any `error`
/// means the outcome is indeterminate and `exists` carries no information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub identity: Identity,
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_for_tick: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    #[serde(default)]
    pub attempts: u32,
}

impl ValidationResult {
    #[must_use]
    pub fn present(
        identity: Identity,
        balance: u64,
        valid_for_tick: u32,
        activity: Option<Activity>,
    ) -> Self {
        Self {
            identity,
            exists: true,
            balance: Some(balance),
            valid_for_tick: Some(valid_for_tick),
            activity,
            error: None,
            attempts: 1,
        }
    }

    #[must_use]
    pub fn absent(identity: Identity) -> Self {
        Self {
            identity,
            exists: false,
            balance: None,
            valid_for_tick: None,
            activity: None,
            error: None,
            attempts: 1,
        }
    }

    #[must_use]
    pub fn indeterminate(identity: Identity, error: RemoteError) -> Self {
        Self {
            identity,
            exists: false,
            balance: None,
            valid_for_tick: None,
            activity: None,
            error: Some(error),
            attempts: 1,
        }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub fn is_indeterminate(&self) -> bool {
        self.error.is_some()
    }

    /// Statistical label: `Some(exists)` for confirmed outcomes, `None` when indeterminate.
    #[must_use]
    pub fn label(&self) -> Option<bool> {
        if self.is_indeterminate() {
            None
        } else {
            Some(self.exists)
        }
    }
}
