//! Remaining lifetime of a key

use std::time::Duration;

/// Answer of `TTL` / `PTTL`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLifetime {
    /// The key does not exist
    Missing,
    /// The key exists and never expires
    Unlimited,
    /// The key expires after this long
    Limited(Duration),
}

impl KeyLifetime {
    /// Decode a `TTL` reply (seconds)
    pub fn from_seconds(raw: i64) -> Self {
        Self::from_raw(raw, Duration::from_secs)
    }

    /// Decode a `PTTL` reply (milliseconds)
    pub fn from_millis(raw: i64) -> Self {
        Self::from_raw(raw, Duration::from_millis)
    }

    fn from_raw(raw: i64, unit: fn(u64) -> Duration) -> Self {
        match raw {
            -2 => KeyLifetime::Missing,
            n if n < 0 => KeyLifetime::Unlimited,
            n => KeyLifetime::Limited(unit(n as u64)),
        }
    }

    /// Remaining time, if the key is set to expire
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            KeyLifetime::Limited(d) => Some(*d),
            _ => None,
        }
    }

    /// Whether the key exists
    pub fn exists(&self) -> bool {
        !matches!(self, KeyLifetime::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_seconds() {
        assert_eq!(KeyLifetime::from_seconds(-2), KeyLifetime::Missing);
        assert_eq!(KeyLifetime::from_seconds(-1), KeyLifetime::Unlimited);
        assert_eq!(
            KeyLifetime::from_seconds(30),
            KeyLifetime::Limited(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_from_millis() {
        let lifetime = KeyLifetime::from_millis(1500);
        assert_eq!(lifetime.remaining(), Some(Duration::from_millis(1500)));
        assert!(lifetime.exists());
        assert!(!KeyLifetime::from_millis(-2).exists());
        assert_eq!(KeyLifetime::from_millis(-1).remaining(), None);
    }
}
