//! Error types for locus-protocols.

use thiserror::Error;

/// Why a line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Reason {
    /// Token count does not match any message kind.
    #[error("unexpected token count {0}")]
    Arity(usize),

    /// Leading token is not a known command for this token count.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// Coordinate token is not two signed decimals in geographic range.
    #[error("invalid coordinates {0:?}")]
    Coordinates(String),

    /// Timestamp is not a decimal number.
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),

    /// Time diff is not a signed decimal number.
    #[error("invalid time diff {0:?}")]
    TimeDiff(String),

    /// Radius is not an integer in range.
    #[error("invalid radius {0:?}")]
    Radius(String),

    /// Bound is not an integer in range.
    #[error("invalid bound {0:?}")]
    Bound(String),

    /// WHATSAT named a client this node has never stored.
    #[error("unknown client {0:?}")]
    UnknownClient(String),

    /// Line bytes are not valid UTF-8.
    #[error("line is not valid UTF-8")]
    Encoding,
}

/// A rejected line, carrying the exact tokens that were received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed message ({reason}): {}", .tokens.join(" "))]
pub struct Malformed {
    pub tokens: Vec<String>,
    pub reason: Reason,
}

impl Malformed {
    /// Build from borrowed tokens.
    pub fn new(tokens: &[&str], reason: Reason) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            reason,
        }
    }

    /// Reject a line that is not valid UTF-8.
    ///
    /// Invalid sequences show up as U+FFFD in the echoed tokens.
    pub fn not_utf8(line: &[u8]) -> Self {
        let text = String::from_utf8_lossy(line);
        let tokens: Vec<&str> = text.split_whitespace().collect();
        Self::new(&tokens, Reason::Encoding)
    }

    /// Reply sent back for a rejected line: `?` then the tokens joined by
    /// single spaces.
    pub fn echo(&self) -> String {
        format!("? {}", self.tokens.join(" "))
    }
}
