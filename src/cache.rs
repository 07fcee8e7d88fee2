mod entry;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{FutureExt, select_biased};
use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::proto::Fqdn;

pub use self::entry::CacheEntry;

/// A cost-bounded response cache keyed by query name.
///
/// Entries are stored in their serialized form (see [`CacheEntry::encode`]). The cost of an
/// entry is the length of its name plus the length of its serialized value. When inserting
/// an entry would exceed the configured capacity, the least recently used entries are
/// evicted until it fits.
///
/// Expired entries are never returned. They are removed lazily by [`get`] and eagerly by
/// the [`cleanup`] task.
///
/// [`get`]: Self::get
/// [`cleanup`]: Self::cleanup
#[derive(Debug)]
pub struct Cache {
    inner: Mutex<Inner>,
    max_cost: usize,
    default_ttl: Duration,
    wakeup: Notify,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Fqdn, Slot>,
    /// Keyed by `(expires, id)`; the id makes keys unique.
    expirations: BTreeMap<(Instant, u64), Fqdn>,
    /// Keyed by the tick of the last access, oldest first.
    recency: BTreeMap<u64, Fqdn>,
    clock: u64,
    cost: usize,
    evictions: u64,
}

#[derive(Debug)]
struct Slot {
    value: Bytes,
    expires: Instant,
    id: u64,
    last_access: u64,
    cost: usize,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, name: &Fqdn) -> Option<Slot> {
        let slot = self.entries.remove(name)?;
        self.expirations.remove(&(slot.expires, slot.id));
        self.recency.remove(&slot.last_access);
        self.cost -= slot.cost;
        Some(slot)
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, name)) = self.recency.pop_first() else {
            return false;
        };

        self.remove(&name);
        self.evictions += 1;
        true
    }
}

impl Cache {
    pub fn new(max_cost: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::default(),
            max_cost,
            default_ttl,
            wakeup: Notify::new(),
        }
    }

    pub fn get(&self, name: &Fqdn) -> Option<CacheEntry> {
        self.get_at(name, Instant::now())
    }

    /// Returns the entry for `name` if it is still valid at `now`.
    pub fn get_at(&self, name: &Fqdn, now: Instant) -> Option<CacheEntry> {
        let value = {
            let mut inner = self.inner.lock();

            let (expires, last_access) = inner
                .entries
                .get(name)
                .map(|slot| (slot.expires, slot.last_access))?;

            if expires <= now {
                inner.remove(name);
                return None;
            }

            let tick = inner.tick();
            inner.recency.remove(&last_access);
            inner.recency.insert(tick, name.clone());

            let slot = inner.entries.get_mut(name)?;
            slot.last_access = tick;
            slot.value.clone()
        };

        match CacheEntry::decode(&value) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("dropping unreadable cache entry for {}: {}", name, err);

                let mut inner = self.inner.lock();
                if inner.entries.get(name).is_some_and(|slot| slot.value == value) {
                    inner.remove(name);
                }

                None
            }
        }
    }

    /// Inserts or replaces the entry for `name`.
    ///
    /// A `ttl` of `0` uses the default retention of the cache; any other value expires the
    /// entry after exactly `ttl` seconds.
    pub fn set(&self, name: Fqdn, entry: &CacheEntry, ttl: u32) {
        self.set_at(name, entry, ttl, Instant::now());
    }

    pub fn set_at(&self, name: Fqdn, entry: &CacheEntry, ttl: u32, now: Instant) {
        let ttl = match ttl {
            0 => self.default_ttl,
            ttl => Duration::from_secs(ttl.into()),
        };

        self.insert_value(name, entry.encode(), now + ttl);
    }

    fn insert_value(&self, name: Fqdn, value: Bytes, expires: Instant) {
        let cost = name.as_bytes().len() + value.len();

        let mut inner = self.inner.lock();
        inner.remove(&name);

        if cost > self.max_cost {
            tracing::debug!(
                "not caching {}: entry cost {} exceeds capacity {}",
                name,
                cost,
                self.max_cost
            );
            return;
        }

        while inner.cost + cost > self.max_cost {
            if !inner.evict_lru() {
                break;
            }
        }

        let id = inner.tick();
        inner.expirations.insert((expires, id), name.clone());
        inner.recency.insert(id, name.clone());
        inner.cost += cost;
        inner.entries.insert(
            name,
            Slot {
                value,
                expires,
                id,
                last_access: id,
                cost,
            },
        );

        drop(inner);
        self.wakeup.notify_one();
    }

    /// Removes all entries that expired at or before `now`. Returns the number of entries
    /// removed.
    pub fn remove_expired(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();

        let mut removed = 0;
        while let Some((&(expires, _), name)) = inner.expirations.first_key_value() {
            if expires > now {
                break;
            }

            let name = name.clone();
            inner.remove(&name);
            removed += 1;
        }

        removed
    }

    pub fn next_expiration(&self) -> Option<Instant> {
        let inner = self.inner.lock();
        inner.expirations.first_key_value().map(|((v, _), _)| *v)
    }

    /// Purges entries as they expire. Never returns.
    pub async fn cleanup(&self) -> ! {
        loop {
            let Some(instant) = self.next_expiration() else {
                self.wakeup.notified().await;
                continue;
            };

            // While sleeping it is possible that a new entry with
            // a shorter TTL gets inserted. In this case we must
            // interrupt the current sleep to ensure we always sleep
            // on the next expiration time.
            select_biased! {
                _ = self.wakeup.notified().fuse() => continue,
                _ = tokio::time::sleep_until(instant.into()).fuse() => (),
            }

            let removed = self.remove_expired(Instant::now());
            tracing::trace!("purged {} expired cache entries", removed);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn cost(&self) -> usize {
        self.inner.lock().cost
    }

    pub fn max_cost(&self) -> usize {
        self.max_cost
    }

    pub fn evictions(&self) -> u64 {
        self.inner.lock().evictions
    }
}
