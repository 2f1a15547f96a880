//! Line codec for the Locus wire protocol.
//!
//! Every message is one line of whitespace-separated tokens:
//!
//! ```text
//! IAMAT   <client> <coords> <timestamp>
//! WHATSAT <client> <radius> <bound>
//! AT      <origin> <time_diff> <client> <coords> <timestamp>
//! ```
//!
//! Numeric tokens keep their original text so a stored AT line can be
//! replayed byte-for-byte.

use crate::error::{Malformed, Reason};
use std::fmt;

/// Largest accepted WHATSAT radius.
pub const MAX_RADIUS: u32 = 50;

/// Largest accepted WHATSAT result bound.
pub const MAX_BOUND: u32 = 20;

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client location report
    IAmAt(IAmAt),
    /// Client nearby-places query
    WhatsAt(WhatsAt),
    /// Peer flood of a location update
    At(At),
}

/// `IAMAT <client> <coords> <timestamp>`
#[derive(Debug, Clone, PartialEq)]
pub struct IAmAt {
    pub client_id: String,
    pub coordinates: Coordinates,
    pub timestamp: Timestamp,
}

/// `WHATSAT <client> <radius> <bound>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatsAt {
    pub client_id: String,
    pub radius: u32,
    pub bound: u32,
}

/// `AT <origin> <time_diff> <client> <coords> <timestamp>`
#[derive(Debug, Clone, PartialEq)]
pub struct At {
    pub origin: String,
    pub time_diff: TimeDiff,
    pub client_id: String,
    pub coordinates: Coordinates,
    pub timestamp: Timestamp,
}

/// Client-observed Unix time, with its original text.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamp {
    value: f64,
    text: String,
}

/// Signed delay between client report and server receipt.
///
/// Display only; it never takes part in ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDiff {
    seconds: f64,
    text: String,
}

/// Latitude/longitude pair parsed from a single `+lat-lon` token.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
    text: String,
    split: usize,
}

/// Parse one line into a message.
///
/// The line terminator and surrounding whitespace are ignored; tokens are
/// split on any run of whitespace.
pub fn parse_line(line: &str) -> Result<Message, Malformed> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let reject = |reason| Malformed::new(&tokens, reason);

    match tokens.as_slice() {
        ["IAMAT", client, coords, timestamp] => Ok(Message::IAmAt(IAmAt {
            client_id: client.to_string(),
            coordinates: Coordinates::parse(coords).map_err(reject)?,
            timestamp: Timestamp::parse(timestamp).map_err(reject)?,
        })),
        ["WHATSAT", client, radius, bound] => Ok(Message::WhatsAt(WhatsAt {
            client_id: client.to_string(),
            radius: parse_bounded(radius, MAX_RADIUS).ok_or_else(|| reject(Reason::Radius(radius.to_string())))?,
            bound: parse_bounded(bound, MAX_BOUND).ok_or_else(|| reject(Reason::Bound(bound.to_string())))?,
        })),
        ["AT", origin, time_diff, client, coords, timestamp] => Ok(Message::At(At {
            origin: origin.to_string(),
            time_diff: TimeDiff::parse(time_diff).map_err(reject)?,
            client_id: client.to_string(),
            coordinates: Coordinates::parse(coords).map_err(reject)?,
            timestamp: Timestamp::parse(timestamp).map_err(reject)?,
        })),
        [command, _, _, _] | [command, _, _, _, _, _] => {
            Err(reject(Reason::UnknownCommand(command.to_string())))
        }
        _ => Err(reject(Reason::Arity(tokens.len()))),
    }
}

impl IAmAt {
    /// Stamp this report with the receiving node and receipt time.
    ///
    /// The resulting AT line keeps the client's coordinates and timestamp
    /// text unchanged.
    pub fn to_at(&self, origin: &str, received_at: f64) -> At {
        At {
            origin: origin.to_string(),
            time_diff: TimeDiff::between(received_at, self.timestamp.value),
            client_id: self.client_id.clone(),
            coordinates: self.coordinates.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

impl fmt::Display for At {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AT {} {} {} {} {}",
            self.origin, self.time_diff, self.client_id, self.coordinates, self.timestamp
        )
    }
}

impl Timestamp {
    fn parse(token: &str) -> Result<Self, Reason> {
        parse_decimal(token)
            .map(|value| Self {
                value,
                text: token.to_string(),
            })
            .ok_or_else(|| Reason::Timestamp(token.to_string()))
    }

    /// Seconds since the Unix epoch.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The token as received.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TimeDiff {
    /// `received_at - client_timestamp`, rendered with an explicit `+` when
    /// the difference is zero or positive.
    pub fn between(received_at: f64, client_timestamp: f64) -> Self {
        let seconds = received_at - client_timestamp;
        let text = if seconds >= 0.0 {
            format!("+{}", seconds)
        } else {
            format!("{}", seconds)
        };
        Self { seconds, text }
    }

    fn parse(token: &str) -> Result<Self, Reason> {
        let signed = token.starts_with(['+', '-']);
        match parse_decimal(token) {
            Some(seconds) if signed => Ok(Self {
                seconds,
                text: token.to_string(),
            }),
            _ => Err(Reason::TimeDiff(token.to_string())),
        }
    }

    pub fn seconds(&self) -> f64 {
        self.seconds
    }
}

impl fmt::Display for TimeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Coordinates {
    /// Parse `+34.068930-118.445127` style tokens.
    ///
    /// The longitude starts at the last sign character that is not the first
    /// character of the token.
    pub fn parse(token: &str) -> Result<Self, Reason> {
        let invalid = || Reason::Coordinates(token.to_string());
        let split = token
            .char_indices()
            .skip(1)
            .filter(|(_, c)| matches!(c, '+' | '-'))
            .map(|(i, _)| i)
            .last()
            .ok_or_else(invalid)?;

        let latitude = parse_decimal(&token[..split]).ok_or_else(invalid)?;
        let longitude = parse_decimal(&token[split..]).ok_or_else(invalid)?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid());
        }

        Ok(Self {
            latitude,
            longitude,
            text: token.to_string(),
            split,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// `lat,lon` built from the original text of each component, as the
    /// places search expects it.
    pub fn query_param(&self) -> String {
        format!("{},{}", &self.text[..self.split], &self.text[self.split..])
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Optional sign, then digits with at most one decimal point.
///
/// Rejects exponents, `inf` and `nan`, which `f64::from_str` would accept,
/// and digit strings too long to be finite.
fn parse_decimal(token: &str) -> Option<f64> {
    let unsigned = token.strip_prefix(['+', '-']).unwrap_or(token);
    let mut digits = 0;
    let mut dots = 0;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return None,
        }
    }
    if digits == 0 || dots > 1 {
        return None;
    }
    token.parse().ok().filter(|v: &f64| v.is_finite())
}

/// Unsigned integer no larger than `max`.
fn parse_bounded(token: &str, max: u32) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok().filter(|v| *v <= max)
}
