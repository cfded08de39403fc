//! Staleness policy.
//!
//! A pure predicate over the last sync timestamp and a max age. It never
//! performs I/O; callers decide whether to trigger a sync.

use chrono::{DateTime, Duration, Utc};

/// Whether a dataset needs a refresh.
///
/// True when it was never synced, or when `now - last_sync` exceeds
/// `max_age`.
#[must_use]
pub fn needs_refresh(
    last_sync: Option<DateTime<Utc>>,
    max_age: Duration,
    now: DateTime<Utc>,
) -> bool {
    match last_sync {
        None => true,
        Some(last) => now - last > max_age,
    }
}

/// Read-path status of a dataset. Not an error: stale data is still served,
/// the UI just shows an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    NeverSynced,
}

impl Freshness {
    #[must_use]
    pub fn classify(
        last_sync: Option<DateTime<Utc>>,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        match last_sync {
            None => Freshness::NeverSynced,
            Some(last) if now - last > max_age => Freshness::Stale,
            Some(_) => Freshness::Fresh,
        }
    }
}

impl std::fmt::Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::NeverSynced => "never-synced",
        };
        f.write_str(s)
    }
}
