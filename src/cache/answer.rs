//! Capacity-bounded answer cache with per-entry expiry.
//!
//! Each worker owns one [`AnswerCache`] and calls it through `&mut self`, so
//! there is no locking anywhere on the lookup path. Time is always passed in
//! by the caller.
//!
//! Under capacity pressure the entry closest to its natural expiry is evicted
//! (ties go to the oldest insertion). Expired entries are removed lazily on
//! lookup and in bulk by [`AnswerCache::sweep`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::key::QueryKey;
use crate::error::CacheError;

/// Largest answer payload the cache accepts, matching the classic UDP DNS limit.
pub const MAX_PAYLOAD_SIZE: usize = 512;

/// Upper bound applied to every TTL, one week.
pub const MAX_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Position of an entry in the expiry index.
///
/// Field order gives the eviction order: soonest expiry first, then earliest
/// insertion, then insertion sequence for entries inserted at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ExpiryKey {
    expires_at: Instant,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct CacheEntry {
    payload: Vec<u8>,
    expiry: ExpiryKey,
}

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cache statistics:")?;
        writeln!(f, "  Entries:   {}/{}", self.entries, self.capacity)?;
        writeln!(f, "  Hits:      {}", self.hits)?;
        writeln!(f, "  Misses:    {}", self.misses)?;
        write!(f, "  Hit ratio: {:.2}%", self.hit_ratio * 100.0)
    }
}

/// The answer cache.
pub struct AnswerCache {
    entries: HashMap<QueryKey, CacheEntry>,
    by_expiry: BTreeMap<ExpiryKey, QueryKey>,
    capacity: NonZeroUsize,
    default_ttl: Duration,
    next_seq: u64,
    hits: u64,
    misses: u64,
}

impl AnswerCache {
    pub fn new(capacity: NonZeroUsize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.get()),
            by_expiry: BTreeMap::new(),
            capacity,
            default_ttl,
            next_seq: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up the answer for `key`.
    ///
    /// Returns the payload only while `now < expires_at`. An expired entry is
    /// removed on the spot. Every call counts exactly one hit or one miss.
    pub fn lookup(&mut self, key: &QueryKey, now: Instant) -> Option<&[u8]> {
        let expired = match self.entries.get(key) {
            Some(entry) => now >= entry.expiry.expires_at,
            None => {
                self.misses += 1;
                return None;
            }
        };

        if expired {
            trace!(%key, "expired on lookup");
            self.remove(key);
            self.misses += 1;
            return None;
        }

        self.hits += 1;
        self.entries.get(key).map(|entry| entry.payload.as_slice())
    }

    /// Store `payload` for `key`, replacing any previous answer.
    ///
    /// `ttl` falls back to the configured default and is capped at [`MAX_TTL`].
    /// Inserting a new key into a full cache evicts exactly one entry first.
    pub fn insert(
        &mut self,
        key: QueryKey,
        payload: Vec<u8>,
        ttl: Option<Duration>,
        now: Instant,
    ) -> Result<(), CacheError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CacheError::InvalidPayload {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let ttl = ttl.unwrap_or(self.default_ttl).min(MAX_TTL);
        if ttl.is_zero() {
            return Err(CacheError::ZeroTtl);
        }

        if let Some(previous) = self.entries.remove(&key) {
            self.by_expiry.remove(&previous.expiry);
        } else if self.entries.len() >= self.capacity.get() {
            self.evict_one();
        }

        let expiry = ExpiryKey {
            expires_at: now + ttl,
            inserted_at: now,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        self.by_expiry.insert(expiry, key.clone());
        self.entries.insert(key, CacheEntry { payload, expiry });
        Ok(())
    }

    /// Remove every entry with `expires_at <= now`. Returns how many went.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some(first) = self.by_expiry.first_entry() {
            if first.key().expires_at > now {
                break;
            }
            let key = first.remove();
            self.entries.remove(&key);
            removed += 1;
        }
        removed
    }

    /// Drop all entries and zero the hit/miss counters.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.by_expiry.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Release the cache. Nothing can use it afterwards.
    pub fn destroy(self) {
        debug!(entries = self.entries.len(), "answer cache released");
    }

    fn remove(&mut self, key: &QueryKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.by_expiry.remove(&entry.expiry);
        }
    }

    fn evict_one(&mut self) {
        if let Some((_, key)) = self.by_expiry.pop_first() {
            trace!(%key, "evicted under capacity pressure");
            self.entries.remove(&key);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub const fn hit_count(&self) -> u64 {
        self.hits
    }

    pub const fn miss_count(&self) -> u64 {
        self.misses
    }

    /// `hits / (hits + misses)`, or `0.0` before the first lookup.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity.get(),
            hits: self.hits,
            misses: self.misses,
            hit_ratio: self.hit_ratio(),
        }
    }
}

impl fmt::Debug for AnswerCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerCache")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("default_ttl", &self.default_ttl)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
