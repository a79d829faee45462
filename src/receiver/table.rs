use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::rtp::{Rid, Ssrc};

use super::channel::InfoKey;

/// What is known about one SSRC.
#[derive(Debug, Clone)]
pub(crate) struct SsrcInfo {
    pub ssrc: Ssrc,
    pub rid: Option<Rid>,
    pub last_usage: Instant,
    /// The runtime channel this SSRC routes to.
    pub holder: Option<InfoKey>,
}

#[derive(Debug)]
struct SsrcEntry {
    info: SsrcInfo,
    /// Part of the recent activity cache, subject to timeout.
    cached: bool,
    /// Negotiated for this channel. Lives as long as the channel does.
    registered_to: Option<InfoKey>,
}

impl SsrcEntry {
    fn is_dead(&self) -> bool {
        !self.cached && self.registered_to.is_none()
    }
}

/// SSRC lookups, both the recent activity cache and the negotiated registrations.
///
/// Each SSRC is stored once. An entry stays as long as it is either cached or
/// registered to a channel.
#[derive(Debug, Default)]
pub(crate) struct SsrcTable {
    entries: HashMap<Ssrc, SsrcEntry>,
}

impl SsrcTable {
    /// Any entry, cached or registered.
    #[cfg(test)]
    pub fn get(&self, ssrc: Ssrc) -> Option<&SsrcInfo> {
        self.entries.get(&ssrc).map(|e| &e.info)
    }

    pub fn get_mut(&mut self, ssrc: Ssrc) -> Option<&mut SsrcInfo> {
        self.entries.get_mut(&ssrc).map(|e| &mut e.info)
    }

    /// Only entries in the recent activity cache.
    pub fn active(&self, ssrc: Ssrc) -> Option<&SsrcInfo> {
        self.entries
            .get(&ssrc)
            .filter(|e| e.cached)
            .map(|e| &e.info)
    }

    /// Insert a new entry into the cache, replacing any previous entry.
    pub fn insert(&mut self, info: SsrcInfo) {
        let registered_to = self.entries.get(&info.ssrc).and_then(|e| e.registered_to);
        self.entries.insert(
            info.ssrc,
            SsrcEntry {
                info,
                cached: true,
                registered_to,
            },
        );
    }

    /// Put an existing entry (back) into the cache.
    pub fn cache(&mut self, ssrc: Ssrc) {
        if let Some(e) = self.entries.get_mut(&ssrc) {
            e.cached = true;
        }
    }

    pub fn register(&mut self, ssrc: Ssrc, key: InfoKey) {
        if let Some(e) = self.entries.get_mut(&ssrc) {
            e.registered_to = Some(key);
        }
    }

    /// SSRCs registered to a channel.
    pub fn registered_to(&self, key: InfoKey) -> Vec<Ssrc> {
        self.entries
            .iter()
            .filter(|(_, e)| e.registered_to == Some(key))
            .map(|(s, _)| *s)
            .collect()
    }

    pub fn unregister(&mut self, ssrc: Ssrc, key: InfoKey) {
        let Some(e) = self.entries.get_mut(&ssrc) else {
            return;
        };
        if e.registered_to == Some(key) {
            e.registered_to = None;
        }
        if e.is_dead() {
            self.entries.remove(&ssrc);
        }
    }

    /// Remove an SSRC from the cache. A registration survives.
    pub fn remove_cached(&mut self, ssrc: Ssrc) -> bool {
        let Some(e) = self.entries.get_mut(&ssrc) else {
            return false;
        };
        let was_cached = e.cached;
        e.cached = false;
        if e.is_dead() {
            self.entries.remove(&ssrc);
        }
        was_cached
    }

    /// Drop cached entries not used within `timeout`. Returns the number dropped.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut count = 0;
        for e in self.entries.values_mut() {
            if e.cached && now.saturating_duration_since(e.info.last_usage) > timeout {
                trace!("Expire SSRC: {}", e.info.ssrc);
                e.cached = false;
                count += 1;
            }
        }
        self.entries.retain(|_, e| !e.is_dead());
        count
    }

    /// Drop every entry, cached or registered, for which `f` is true.
    pub fn remove_where(&mut self, mut f: impl FnMut(&SsrcInfo, Option<InfoKey>) -> bool) {
        self.entries.retain(|_, e| !f(&e.info, e.registered_to));
    }

    /// Empty the cache and unlink every entry from its runtime channel.
    pub fn clear_cached(&mut self) {
        for e in self.entries.values_mut() {
            e.cached = false;
            e.info.holder = None;
        }
        self.entries.retain(|_, e| !e.is_dead());
    }

    /// Runtime channels referenced by any entry.
    pub fn holders(&self) -> impl Iterator<Item = InfoKey> + '_ {
        self.entries.values().filter_map(|e| e.info.holder)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn cached_len(&self) -> usize {
        self.entries.values().filter(|e| e.cached).count()
    }
}

/// RID lookups.
#[derive(Debug, Default)]
pub(crate) struct RidTable {
    entries: HashMap<Rid, InfoKey>,
}

impl RidTable {
    pub fn get(&self, rid: Rid) -> Option<InfoKey> {
        self.entries.get(&rid).copied()
    }

    pub fn set(&mut self, rid: Rid, key: InfoKey) {
        if let Some(prev) = self.entries.insert(rid, key) {
            if prev != key {
                debug!("Rebind RID {} from {:?} to {:?}", rid, prev, key);
            }
        }
    }

    pub fn remove(&mut self, rid: Rid) {
        self.entries.remove(&rid);
    }

    pub fn remove_where(&mut self, mut f: impl FnMut(InfoKey) -> bool) {
        self.entries.retain(|_, k| !f(*k));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
