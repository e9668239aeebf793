//! Identifiers carried in envelope headers.
//!
//! Every outbound envelope gets a fresh [`RequestId`], responses included. A
//! response refers back to the request it answers through `resId`, never by
//! reusing the request's own id.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// ULID-backed envelope identifier.
///
/// ULIDs sort by creation time, so ids in logs line up with the order in which
/// envelopes left an endpoint.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Debug)]
pub struct RequestId(pub ulid::Ulid);

impl RequestId {
    /// Generate a new identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Milliseconds since the Unix epoch at which this id was generated.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(RequestId)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<RequestId>()
            .map_err(|_| serde::de::Error::custom(format!("invalid request id '{s}'")))
    }
}

/// Identity of an endpoint on the transport.
///
/// The hub always answers to [`PeerId::HUB`]; spokes get ids allocated by the
/// transport when they connect.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl PeerId {
    /// Fixed identity of the hub endpoint.
    pub const HUB: PeerId = PeerId(0);

    /// Whether this id designates the hub.
    #[must_use]
    pub fn is_hub(&self) -> bool {
        *self == Self::HUB
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_hub() {
            write!(f, "hub")
        } else {
            write!(f, "spoke-{}", self.0)
        }
    }
}
