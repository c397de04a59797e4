//! Per-URL cooldown limiter
//!
//! Admission is keyed on the exact URL string supplied by the caller. Keys
//! are never evicted.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

pub struct CooldownLimiter {
    cooldown: Duration,
    last_admitted: DashMap<String, Instant>,
}

impl CooldownLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_admitted: DashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Admits `key` if at least one cooldown has passed since its last admission.
    ///
    /// The entry's shard lock is held for the whole check-and-set, so two
    /// concurrent callers for the same key cannot both be admitted.
    pub fn try_admit(&self, key: &str, now: Instant) -> Admission {
        match self.last_admitted.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed < self.cooldown {
                    return Admission::Rejected {
                        retry_after: self.cooldown - elapsed,
                    };
                }
                entry.insert(now);
                Admission::Admitted
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Admission::Admitted
            }
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_admitted.len()
    }
}
