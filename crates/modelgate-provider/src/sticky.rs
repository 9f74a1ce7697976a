//! Session-id → provider-id affinity with TTL. In-memory only; the map is
//! empty after a restart. Expired entries are evicted lazily on access.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::provider::ProviderId;

#[derive(Debug, Clone, Copy)]
struct StickyEntry {
    provider_id: ProviderId,
    expires_at_unix: i64,
}

#[derive(Debug)]
pub struct StickySessions {
    ttl_secs: i64,
    entries: RwLock<HashMap<String, StickyEntry>>,
}

impl StickySessions {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, session_id: &str, now_unix: i64) -> Option<ProviderId> {
        {
            let entries = self.entries.read().expect("sticky map lock");
            match entries.get(session_id) {
                Some(entry) if entry.expires_at_unix > now_unix => {
                    return Some(entry.provider_id);
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired; drop it.
        let mut entries = self.entries.write().expect("sticky map lock");
        if let Some(entry) = entries.get(session_id)
            && entry.expires_at_unix <= now_unix
        {
            entries.remove(session_id);
        }
        None
    }

    /// Bind (or refresh) the session's provider affinity.
    pub fn bind(&self, session_id: &str, provider_id: ProviderId, now_unix: i64) {
        let mut entries = self.entries.write().expect("sticky map lock");
        entries.retain(|_, entry| entry.expires_at_unix > now_unix);
        entries.insert(
            session_id.to_string(),
            StickyEntry {
                provider_id,
                expires_at_unix: now_unix + self.ttl_secs,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("sticky map lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_get_within_ttl() {
        let sticky = StickySessions::new(60);
        sticky.bind("s1", 7, 1_000);
        assert_eq!(sticky.get("s1", 1_030), Some(7));
    }

    #[test]
    fn expired_entries_evict_on_read() {
        let sticky = StickySessions::new(60);
        sticky.bind("s1", 7, 1_000);
        assert_eq!(sticky.get("s1", 1_061), None);
        assert!(sticky.is_empty());
    }

    #[test]
    fn rebind_refreshes_ttl_and_provider() {
        let sticky = StickySessions::new(60);
        sticky.bind("s1", 7, 1_000);
        sticky.bind("s1", 9, 1_050);
        assert_eq!(sticky.get("s1", 1_100), Some(9));
    }
}
