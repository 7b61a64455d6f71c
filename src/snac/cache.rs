//! Outstanding request cache
//!
//! Maps request ids to the SNAC that issued them so replies carrying only a
//! request id can be routed, and so handlers can recover data attached to
//! the original request.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;

/// Requests unanswered for this long are dropped from the cache.
pub const SNAC_CACHE_MAX_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSnac {
    pub family: u16,
    pub subtype: u16,
    pub flags: u16,
    pub request_id: u32,
    pub data: Option<Bytes>,
    pub issued: Instant,
}

#[derive(Debug, Default)]
pub struct SnacCache {
    entries: HashMap<u32, CachedSnac>,
    last_purge: Option<Instant>,
}

impl SnacCache {
    pub fn cache_request(
        &mut self,
        family: u16,
        subtype: u16,
        flags: u16,
        request_id: u32,
        data: Option<Bytes>,
    ) {
        self.cache_request_at(family, subtype, flags, request_id, data, Instant::now());
    }

    pub fn cache_request_at(
        &mut self,
        family: u16,
        subtype: u16,
        flags: u16,
        request_id: u32,
        data: Option<Bytes>,
        issued: Instant,
    ) {
        // stale sweep at most once per max age
        let due = self
            .last_purge
            .is_none_or(|at| issued.saturating_duration_since(at) >= SNAC_CACHE_MAX_AGE);
        if due {
            self.cleanup_before(SNAC_CACHE_MAX_AGE, issued);
            self.last_purge = Some(issued);
        }
        self.entries.insert(
            request_id,
            CachedSnac {
                family,
                subtype,
                flags,
                request_id,
                data,
                issued,
            },
        );
    }

    /// The (family, subtype) that issued `request_id`, leaving it cached.
    pub fn resolve_request(&self, request_id: u32) -> Option<(u16, u16)> {
        self.entries
            .get(&request_id)
            .map(|c| (c.family, c.subtype))
    }

    pub fn get(&self, request_id: u32) -> Option<&CachedSnac> {
        self.entries.get(&request_id)
    }

    /// Removes and returns the entry for a final reply.
    pub fn take(&mut self, request_id: u32) -> Option<CachedSnac> {
        self.entries.remove(&request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries issued more than `max_age` before `now`. Returns the count.
    pub fn cleanup_before(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, c| now.saturating_duration_since(c.issued) <= max_age);
        let purged = before - self.entries.len();
        if purged > 0 {
            tracing::debug!(
                "[snac] [cache] purged={purged} remaining={}",
                self.entries.len()
            );
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_and_take() {
        let mut cache = SnacCache::default();
        cache.cache_request(0x0001, 0x0006, 0, 7, None);
        assert_eq!(cache.resolve_request(7), Some((0x0001, 0x0006)));
        assert_eq!(cache.resolve_request(8), None);
        let taken = cache.take(7).unwrap();
        assert_eq!(taken.request_id, 7);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_attached_data_survives() {
        let mut cache = SnacCache::default();
        cache.cache_request(0x0002, 0x0005, 0, 3, Some(Bytes::from_static(b"buddy")));
        assert_eq!(cache.get(3).unwrap().data.as_deref(), Some(&b"buddy"[..]));
    }

    #[test]
    fn test_cleanup_drops_only_stale_entries() {
        let mut cache = SnacCache::default();
        let start = Instant::now();
        cache.cache_request_at(1, 1, 0, 1, None, start);
        cache.cache_request_at(1, 2, 0, 2, None, start + Duration::from_secs(50));
        let now = start + Duration::from_secs(70);
        assert_eq!(cache.cleanup_before(Duration::from_secs(60), now), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(2).is_some());
    }

    #[test]
    fn test_insert_sweeps_requests_older_than_max_age() {
        let mut cache = SnacCache::default();
        let start = Instant::now();
        cache.cache_request_at(0x0001, 0x0006, 0, 1, None, start);
        cache.cache_request_at(0x0001, 0x0017, 0, 2, None, start + Duration::from_secs(30));
        assert_eq!(cache.len(), 2);

        let later = start + SNAC_CACHE_MAX_AGE + Duration::from_secs(1);
        cache.cache_request_at(0x0017, 0x0006, 0, 3, None, later);
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
        assert!(cache.get(3).is_some());
        assert_eq!(cache.len(), 2);
    }
}
