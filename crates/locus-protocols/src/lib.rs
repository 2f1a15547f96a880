//! Locus Protocols - Wire Codec and Location Store
//!
//! This crate holds the two pieces of a Locus node that have no I/O:
//!
//! - [`codec`]: parses and validates the line-oriented wire messages
//!   (`IAMAT`, `WHATSAT`, `AT`) and renders outbound lines. Parsing is pure
//!   and returns an explicit [`Malformed`] value instead of unwinding.
//! - [`store`]: the per-node client location table with last-writer-wins
//!   merge. A merge is accepted only when the candidate's client timestamp
//!   is strictly greater than the stored one, and acceptance is the signal
//!   to flood the update onward.
//!
//! # Example
//!
//! ```rust
//! use locus_protocols::{parse_line, LocationRecord, LocationStore, Message};
//!
//! # tokio_test::block_on(async {
//! let store = LocationStore::new();
//! let Ok(Message::IAmAt(report)) =
//!     parse_line("IAMAT kiwi +34.068930-118.445127 1520023934.918963")
//! else {
//!     panic!("valid report");
//! };
//! let at = report.to_at("Hill", 1520023935.0);
//! assert!(store.merge(LocationRecord::from_at(&at)).await);
//! // Same timestamp again is a duplicate and is not re-accepted.
//! assert!(!store.merge(LocationRecord::from_at(&at)).await);
//! # });
//! ```

pub mod codec;
pub mod error;
pub mod store;

pub use codec::{
    parse_line, At, Coordinates, IAmAt, Message, Timestamp, TimeDiff, WhatsAt, MAX_BOUND,
    MAX_RADIUS,
};
pub use error::{Malformed, Reason};
pub use store::{LocationRecord, LocationStore};
