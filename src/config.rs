//! Database configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::Endianness;

/// Tunables of an open [Database](crate::Database).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use flatdb::{DbConfig, Endianness};
///
/// let config = DbConfig::default().with_lock_timeout(Duration::from_millis(50));
/// assert_eq!(config.endianness, Endianness::Big);
/// assert_eq!(config.lock_timeout, Duration::from_millis(50));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Byte order of rows in a newly created database. An existing database
    /// keeps the byte order recorded in its metadata.
    /// Default: big-endian
    pub endianness: Endianness,

    /// How long a writer waits for a table lock, or a reader for a table to
    /// stop being written, before giving up with a busy error.
    /// Default: 5 s
    pub lock_timeout: Duration,

    /// Pause between two attempts at taking a table lock.
    /// Default: 10 ms
    pub lock_retry_interval: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endianness: Endianness::Big,
            lock_timeout: Duration::from_secs(5),
            lock_retry_interval: Duration::from_millis(10),
        }
    }
}

impl DbConfig {
    #[must_use]
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// Short lock waits so that busy-table tests fail fast.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            lock_timeout: Duration::from_millis(100),
            lock_retry_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }
}
