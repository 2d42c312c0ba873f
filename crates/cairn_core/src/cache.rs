//! Bounded segment cache with per-id load collapsing.

use crate::error::{CoreError, CoreResult};
use crate::segment::Segment;
use crate::types::SegmentId;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A bounded, least-recently-used cache of decoded segments.
///
/// The cache guarantees at most one in-flight load per missing id: when
/// several threads request the same absent segment, one runs the loader
/// and the rest block on a per-id slot until the result (or failure) is
/// published. Failures are propagated to every waiter and never cached.
///
/// Eviction drops only the decoded in-memory form; the backing archive
/// entry stays durable, so eviction never performs I/O.
pub struct SegmentCache {
    max_entries: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    slots: HashMap<SegmentId, Slot>,
    /// Ready ids in recency order, least recently used at the front.
    /// Loading slots are not listed and cannot be evicted.
    recency: VecDeque<SegmentId>,
}

#[derive(Clone)]
enum Slot {
    Ready(Arc<Segment>),
    Loading(Arc<LoadSlot>),
}

struct LoadSlot {
    state: Mutex<LoadState>,
    done: Condvar,
}

enum LoadState {
    Pending,
    Loaded(Arc<Segment>),
    Failed(Arc<CoreError>),
}

impl LoadSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(LoadState::Pending),
            done: Condvar::new(),
        }
    }

    fn publish(&self, state: LoadState) {
        *self.state.lock() = state;
        self.done.notify_all();
    }

    fn wait(&self) -> CoreResult<Arc<Segment>> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                LoadState::Pending => self.done.wait(&mut state),
                LoadState::Loaded(segment) => return Ok(Arc::clone(segment)),
                LoadState::Failed(error) => return Err(CoreError::Shared(Arc::clone(error))),
            }
        }
    }
}

impl SegmentCache {
    /// Creates a cache bounded to `max_entries` decoded segments.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(CacheInner {
                slots: HashMap::new(),
                recency: VecDeque::new(),
            }),
        }
    }

    /// Returns the cached segment for `id`, or runs `loader` to produce it.
    ///
    /// The loader is invoked at most once per missing id even under
    /// concurrent requests; concurrent callers receive the single result.
    /// If the load fails, the failure reaches every waiter (wrapped in
    /// [`CoreError::Shared`]) and nothing is cached, so a later request
    /// retries from scratch.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, or [`CoreError::Shared`] when the
    /// failure came from a concurrent load of the same id.
    pub fn get_or_load<F>(&self, id: SegmentId, loader: F) -> CoreResult<Arc<Segment>>
    where
        F: FnOnce() -> CoreResult<Segment>,
    {
        let slot = {
            let mut inner = self.inner.lock();
            match inner.slots.get(&id).cloned() {
                Some(Slot::Ready(segment)) => {
                    inner.touch(id);
                    return Ok(segment);
                }
                Some(Slot::Loading(slot)) => {
                    drop(inner);
                    return slot.wait();
                }
                None => {
                    let slot = Arc::new(LoadSlot::new());
                    inner.slots.insert(id, Slot::Loading(Arc::clone(&slot)));
                    slot
                }
            }
        };

        match loader() {
            Ok(segment) => {
                let segment = Arc::new(segment);
                let published = {
                    let mut inner = self.inner.lock();
                    match inner.slots.get(&id).cloned() {
                        // Normal case: our load slot is still registered.
                        Some(Slot::Loading(current)) if Arc::ptr_eq(&current, &slot) => {
                            inner.slots.insert(id, Slot::Ready(Arc::clone(&segment)));
                            inner.touch(id);
                            inner.evict_over(self.max_entries);
                            Arc::clone(&segment)
                        }
                        // A write-path put overtook the load; the in-memory
                        // segment it stored is authoritative.
                        Some(Slot::Ready(current)) => current,
                        // The cache was invalidated mid-load; hand the
                        // segment out without caching it.
                        _ => Arc::clone(&segment),
                    }
                };
                slot.publish(LoadState::Loaded(Arc::clone(&published)));
                Ok(published)
            }
            Err(error) => {
                let waited_on = {
                    let mut inner = self.inner.lock();
                    let ours = matches!(
                        inner.slots.get(&id),
                        Some(Slot::Loading(current)) if Arc::ptr_eq(current, &slot)
                    );
                    if ours {
                        inner.slots.remove(&id);
                    }
                    // After removal no new waiter can attach; any live
                    // reference beyond ours belongs to a waiting thread.
                    Arc::strong_count(&slot) > 1
                };
                if waited_on {
                    let shared = Arc::new(error);
                    slot.publish(LoadState::Failed(Arc::clone(&shared)));
                    Err(CoreError::Shared(shared))
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Unconditionally inserts or replaces the entry for `id`.
    ///
    /// Used on the write path, where the freshly created in-memory segment
    /// (auxiliary tables included) is authoritative over any later disk
    /// read.
    pub fn put(&self, id: SegmentId, segment: Arc<Segment>) {
        let mut inner = self.inner.lock();
        inner.slots.insert(id, Slot::Ready(segment));
        inner.touch(id);
        inner.evict_over(self.max_entries);
    }

    /// Returns the cached segment for `id` without loading.
    #[must_use]
    pub fn get(&self, id: SegmentId) -> Option<Arc<Segment>> {
        let mut inner = self.inner.lock();
        match inner.slots.get(&id).cloned() {
            Some(Slot::Ready(segment)) => {
                inner.touch(id);
                Some(segment)
            }
            _ => None,
        }
    }

    /// Drops every cached segment. In-flight loads still publish to their
    /// waiters but are not retained.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.recency.clear();
    }

    /// Returns the number of ready (decoded) segments currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().recency.len()
    }

    /// Returns whether the cache holds no ready segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheInner {
    /// Moves `id` to the most recently used position.
    fn touch(&mut self, id: SegmentId) {
        self.recency.retain(|other| *other != id);
        self.recency.push_back(id);
    }

    /// Evicts least recently used entries until at most `max` remain.
    fn evict_over(&mut self, max: usize) {
        while self.recency.len() > max {
            if let Some(evicted) = self.recency.pop_front() {
                self.slots.remove(&evicted);
            }
        }
    }
}

impl std::fmt::Debug for SegmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentCache")
            .field("max_entries", &self.max_entries)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::AuxTables;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn sample_id(byte: u8) -> SegmentId {
        SegmentId::from_bytes([byte; 16])
    }

    fn sample_segment(id: SegmentId) -> Segment {
        Segment::new(id, vec![1, 2, 3], Vec::new(), AuxTables::new())
    }

    #[test]
    fn miss_loads_and_caches() {
        let cache = SegmentCache::new(10);
        let id = sample_id(1);
        let loads = AtomicUsize::new(0);

        let first = cache
            .get_or_load(id, || {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(sample_segment(id))
            })
            .unwrap();

        let second = cache
            .get_or_load(id, || panic!("loader must not run on a hit"))
            .unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = SegmentCache::new(10);
        let id = sample_id(1);

        let error = cache
            .get_or_load(id, || Err(CoreError::SegmentNotFound { id }))
            .unwrap_err();
        assert!(matches!(error, CoreError::SegmentNotFound { .. }));

        // The next request runs a fresh loader.
        let segment = cache.get_or_load(id, || Ok(sample_segment(id))).unwrap();
        assert_eq!(segment.id(), id);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_requests_share_one_load() {
        let cache = Arc::new(SegmentCache::new(10));
        let id = sample_id(1);
        let loads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    cache
                        .get_or_load(id, || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            // Hold the load open long enough for the other
                            // threads to pile up as waiters.
                            thread::sleep(Duration::from_millis(50));
                            Ok(sample_segment(id))
                        })
                        .unwrap()
                })
            })
            .collect();

        let segments: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        for segment in &segments[1..] {
            assert!(Arc::ptr_eq(&segments[0], segment));
        }
    }

    #[test]
    fn concurrent_failure_reaches_every_waiter() {
        let cache = Arc::new(SegmentCache::new(10));
        let id = sample_id(1);
        let loads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    cache.get_or_load(id, || {
                        loads.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Err(CoreError::SegmentNotFound { id })
                    })
                })
            })
            .collect();

        for handle in handles {
            let error = handle.join().unwrap().unwrap_err();
            assert!(matches!(error.root(), CoreError::SegmentNotFound { .. }));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn put_wins_over_later_lookup() {
        let cache = SegmentCache::new(10);
        let id = sample_id(1);
        let authoritative = Arc::new(sample_segment(id));

        cache.put(id, Arc::clone(&authoritative));

        let fetched = cache
            .get_or_load(id, || panic!("loader must not run after put"))
            .unwrap();
        assert!(Arc::ptr_eq(&authoritative, &fetched));
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = SegmentCache::new(2);
        let (a, b, c) = (sample_id(1), sample_id(2), sample_id(3));

        cache.put(a, Arc::new(sample_segment(a)));
        cache.put(b, Arc::new(sample_segment(b)));

        // Touch `a` so that `b` is the eviction candidate.
        assert!(cache.get(a).is_some());
        cache.put(c, Arc::new(sample_segment(c)));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(a).is_some());
        assert!(cache.get(b).is_none());
        assert!(cache.get(c).is_some());
    }

    #[test]
    fn invalidate_all_clears() {
        let cache = SegmentCache::new(10);
        for byte in 1..=3 {
            let id = sample_id(byte);
            cache.put(id, Arc::new(sample_segment(id)));
        }
        assert_eq!(cache.len(), 3);

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert!(cache.get(sample_id(1)).is_none());
    }
}
