//! Record format and reserved-key constants.

use bytes::Bytes;
use chrono::{DateTime, NaiveTime, Utc};

/// Reserved key holding the store-wide version in its `version` field.
///
/// The record is co-located with user data so that store-level conflict
/// detection joins the same transaction as the user items. Its value is
/// always empty and it is never surfaced by listings.
pub const GLOBAL_VERSION_KEY: &str = "vss_global_version";

/// Stored version assigned on first insert (and after an unconditional
/// upsert).
pub const INITIAL_VERSION: i64 = 1;

/// A stored record. The owning `(user_token, store_id)` pair is carried
/// by the addressing, not the record itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    /// Opaque value bytes, possibly empty.
    pub value: Bytes,
    /// Server-maintained version, `>= 1` for any stored record.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// A `(key, version)` pair returned by listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVersion {
    pub key: String,
    pub version: i64,
}

/// Audit timestamp for the current write: today's UTC date at midnight.
pub fn utc_today() -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_utc_today_is_day_truncated() {
        let ts = utc_today();
        assert_eq!(ts.hour(), 0);
        assert_eq!(ts.minute(), 0);
        assert_eq!(ts.second(), 0);
    }
}
