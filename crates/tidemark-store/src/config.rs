//! Construction-time configuration for store backends.

use std::time::Duration;

/// Trusted configuration supplied when a store backend is constructed.
///
/// The table prefix is part of generated query text and must never be
/// derived from untrusted runtime input; supplying it only here keeps the
/// generated SQL injection-free without a literal escaping mechanism.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Prefix applied to every table name, e.g. `"mirror_"`. Empty for
    /// unprefixed tables.
    pub table_prefix: String,

    /// Time-to-live for access-handle entries. `None` keeps entries
    /// forever. When set, every handle write refreshes the expiry window
    /// and an expired entry is indistinguishable from one never written.
    pub handle_ttl: Option<Duration>,
}

impl StoreConfig {
    /// Config with a table prefix and no handle TTL.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            table_prefix: prefix.into(),
            ..Self::default()
        }
    }
}
