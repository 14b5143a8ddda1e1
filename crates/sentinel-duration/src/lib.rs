//! Human-readable duration parsing and serde codecs.
//!
//! Policy constants and configuration values accept either a
//! human-readable string (`"15m"`, `"2h"`) or a raw integer count of
//! minutes, and always serialize back out as minutes so persisted
//! documents stay diffable.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A duration expressed as whole minutes, with flexible parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Minutes(pub u64);

impl Minutes {
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0 * 60)
    }

    pub fn from_duration(d: Duration) -> Self {
        Self(d.as_secs() / 60)
    }
}

impl Serialize for Minutes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for Minutes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            String(String),
            U64(u64),
        }

        match Helper::deserialize(deserializer)? {
            Helper::U64(m) => Ok(Minutes(m)),
            Helper::String(s) => {
                let d = humantime::parse_duration(&s)
                    .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}")))?;
                Ok(Minutes(d.as_secs() / 60))
            }
        }
    }
}

/// Deserialize a [`std::time::Duration`] from either a human-readable
/// string or a raw count of seconds.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        String(String),
        Secs(u64),
    }

    match Helper::deserialize(deserializer)? {
        Helper::String(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
        Helper::Secs(secs) => Ok(Duration::from_secs(secs)),
    }
}

/// Serialize a [`std::time::Duration`] as whole seconds.
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

/// Parse a human-readable duration string (`"90s"`, `"15m"`, `"2h"`).
pub fn parse(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}
