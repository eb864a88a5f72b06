//! Lazily populated child collections.
//!
//! Every parent-to-children relationship of the tree is a
//! [`LazyCollection`]: a cache that is either *unloaded* (the backend has
//! never been asked) or *loaded* (possibly with zero children). The two must
//! never be conflated: an empty loaded collection does not trigger another
//! backend query.
//!
//! The cache lock is held while the loader runs, so concurrent first access
//! from several threads issues exactly one query. Loaders must not touch the
//! collection they are populating.
//!
//! Children only hold weak references to their parent, so the collection is
//! what keeps a parent alive for its descendants. Instances handed out by a
//! targeted lookup on an unloaded collection are retained next to the
//! cache. A collection [`identified_by`](LazyCollection::identified_by) an
//! identity function reuses those instances, and the previously loaded ones,
//! for every child a load or refresh reports again.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::error::{CopickError, CopickResult};

enum CacheState<T> {
    Unloaded,
    Loaded(Vec<Arc<T>>),
}

/// An ordered, lazily loaded collection of shared child entities.
pub struct LazyCollection<T> {
    state: Mutex<CacheState<T>>,
    retained: Mutex<Vec<Arc<T>>>,
    same: Option<fn(&T, &T) -> bool>,
}

impl<T> LazyCollection<T> {
    /// A collection that has not been loaded yet.
    pub fn new() -> Self {
        Self::with_state(CacheState::Unloaded)
    }

    /// A collection populated up front (e.g. from a static index).
    pub fn loaded_with(items: Vec<Arc<T>>) -> Self {
        Self::with_state(CacheState::Loaded(items))
    }

    fn with_state(state: CacheState<T>) -> Self {
        Self {
            state: Mutex::new(state),
            retained: Mutex::new(Vec::new()),
            same: None,
        }
    }

    /// Keep the existing instance of a child across loads when `same`
    /// reports it as the same entity.
    pub fn identified_by(mut self, same: fn(&T, &T) -> bool) -> Self {
        self.same = Some(same);
        self
    }

    fn lock(&self) -> CopickResult<MutexGuard<'_, CacheState<T>>> {
        self.state.lock().map_err(CopickError::poisoned)
    }

    /// Return the children, invoking `load` only if the collection has never
    /// been populated. A failed load leaves the collection unloaded.
    pub fn get<F>(&self, load: F) -> CopickResult<Vec<Arc<T>>>
    where
        F: FnOnce() -> CopickResult<Vec<Arc<T>>>,
    {
        let mut state = self.lock()?;
        self.ensure_loaded(&mut state, load)
    }

    /// Unconditionally re-run `load` and replace the cached children.
    ///
    /// Children that were only appended in memory are discarded. A failed
    /// load keeps the previous state.
    pub fn refresh<F>(&self, load: F) -> CopickResult<Vec<Arc<T>>>
    where
        F: FnOnce() -> CopickResult<Vec<Arc<T>>>,
    {
        let mut state = self.lock()?;
        let loaded = load()?;
        let items = match &*state {
            CacheState::Loaded(previous) => self.reconcile(previous, loaded)?,
            CacheState::Unloaded => self.reconcile(&[], loaded)?,
        };
        *state = CacheState::Loaded(items.clone());
        Ok(items)
    }

    /// Append a freshly created child. An unloaded collection becomes a
    /// loaded collection holding just this child; no query is issued.
    pub fn append_on_create(&self, item: Arc<T>) -> CopickResult<()> {
        let mut state = self.lock()?;
        Self::push(&mut state, item);
        Ok(())
    }

    /// Run a check-then-insert critical section against the loaded
    /// children, loading them first if needed. When `create` returns a child
    /// it is appended before the lock is released; on error nothing changes.
    pub fn create_with<F, G>(&self, load: F, create: G) -> CopickResult<Arc<T>>
    where
        F: FnOnce() -> CopickResult<Vec<Arc<T>>>,
        G: FnOnce(&[Arc<T>]) -> CopickResult<Arc<T>>,
    {
        let mut state = self.lock()?;
        let items = self.ensure_loaded(&mut state, load)?;
        let item = create(items.as_slice())?;
        Self::push(&mut state, Arc::clone(&item));
        Ok(item)
    }

    /// Keep a child found by a targeted lookup alive without loading the
    /// collection. Returns the instance retained earlier for the same
    /// entity, if any, so repeated lookups share one instance.
    pub fn retain(&self, item: Arc<T>) -> CopickResult<Arc<T>> {
        let mut retained = self.retained.lock().map_err(CopickError::poisoned)?;
        if let Some(same) = self.same {
            if let Some(existing) = retained.iter().find(|r| same(r, &item)) {
                return Ok(Arc::clone(existing));
            }
        }
        retained.push(Arc::clone(&item));
        Ok(item)
    }

    /// The children if loaded, without triggering a load.
    pub fn loaded(&self) -> CopickResult<Option<Vec<Arc<T>>>> {
        Ok(match &*self.lock()? {
            CacheState::Unloaded => None,
            CacheState::Loaded(items) => Some(items.clone()),
        })
    }

    pub fn is_loaded(&self) -> CopickResult<bool> {
        Ok(matches!(&*self.lock()?, CacheState::Loaded(_)))
    }

    /// Number of cached children, `None` while unloaded.
    pub fn len_if_loaded(&self) -> CopickResult<Option<usize>> {
        Ok(match &*self.lock()? {
            CacheState::Unloaded => None,
            CacheState::Loaded(items) => Some(items.len()),
        })
    }

    fn ensure_loaded<F>(&self, state: &mut CacheState<T>, load: F) -> CopickResult<Vec<Arc<T>>>
    where
        F: FnOnce() -> CopickResult<Vec<Arc<T>>>,
    {
        match state {
            CacheState::Loaded(items) => Ok(items.clone()),
            CacheState::Unloaded => {
                let items = self.reconcile(&[], load()?)?;
                *state = CacheState::Loaded(items.clone());
                Ok(items)
            }
        }
    }

    /// Swap every freshly loaded child for the known instance of the same
    /// entity. Retained lookups are released once a load has run.
    fn reconcile(&self, previous: &[Arc<T>], loaded: Vec<Arc<T>>) -> CopickResult<Vec<Arc<T>>> {
        let mut retained = self.retained.lock().map_err(CopickError::poisoned)?;
        let items: Vec<Arc<T>> = match self.same {
            Some(same) => loaded
                .into_iter()
                .map(|item| {
                    previous
                        .iter()
                        .chain(retained.iter())
                        .find(|known| same(known, &item))
                        .map(Arc::clone)
                        .unwrap_or(item)
                })
                .collect(),
            None => loaded,
        };
        retained.clear();
        Ok(items)
    }

    fn push(state: &mut CacheState<T>, item: Arc<T>) {
        match state {
            CacheState::Loaded(items) => items.push(item),
            CacheState::Unloaded => *state = CacheState::Loaded(vec![item]),
        }
    }
}

impl<T> Default for LazyCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LazyCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // try_lock: formatting must not block on an in-flight load.
        match self.state.try_lock() {
            Ok(state) => match &*state {
                CacheState::Unloaded => f.write_str("LazyCollection(unloaded)"),
                CacheState::Loaded(items) => write!(f, "LazyCollection(loaded, {})", items.len()),
            },
            Err(TryLockError::WouldBlock) => f.write_str("LazyCollection(busy)"),
            Err(TryLockError::Poisoned(_)) => f.write_str("LazyCollection(poisoned)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn counted(counter: &AtomicUsize, items: &[u32]) -> CopickResult<Vec<Arc<u32>>> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(items.iter().copied().map(Arc::new).collect())
    }

    #[test]
    fn first_get_loads_once() {
        let calls = AtomicUsize::new(0);
        let c: LazyCollection<u32> = LazyCollection::new();
        assert!(!c.is_loaded().unwrap());

        let first = c.get(|| counted(&calls, &[1, 2])).unwrap();
        let second = c.get(|| counted(&calls, &[9])).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_result_counts_as_loaded() {
        let calls = AtomicUsize::new(0);
        let c: LazyCollection<u32> = LazyCollection::new();

        assert!(c.get(|| counted(&calls, &[])).unwrap().is_empty());
        assert!(c.is_loaded().unwrap());
        assert!(c.get(|| counted(&calls, &[1])).unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_stays_unloaded() {
        let c: LazyCollection<u32> = LazyCollection::new();
        let err = c
            .get(|| Err(CopickError::NotImplemented { operation: "query" }))
            .unwrap_err();
        assert!(err.is_not_implemented());
        assert!(!c.is_loaded().unwrap());
        assert_eq!(c.get(|| Ok(vec![Arc::new(7)])).unwrap().len(), 1);
    }

    #[test]
    fn refresh_always_reloads() {
        let calls = AtomicUsize::new(0);
        let c: LazyCollection<u32> = LazyCollection::new();
        c.get(|| counted(&calls, &[1])).unwrap();
        c.append_on_create(Arc::new(2)).unwrap();

        let refreshed = c.refresh(|| counted(&calls, &[3, 4, 5])).unwrap();
        assert_eq!(refreshed.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(c.len_if_loaded().unwrap(), Some(3));
    }

    #[test]
    fn failed_refresh_keeps_previous_children() {
        let c = LazyCollection::loaded_with(vec![Arc::new(1u32)]);
        assert!(c
            .refresh(|| Err(CopickError::Backend("offline".into())))
            .is_err());
        assert_eq!(c.len_if_loaded().unwrap(), Some(1));
    }

    #[test]
    fn append_on_unloaded_does_not_query() {
        let c: LazyCollection<u32> = LazyCollection::new();
        c.append_on_create(Arc::new(1)).unwrap();
        let items = c
            .get(|| panic!("append must not leave the collection unloaded"))
            .unwrap();
        assert_eq!(items.iter().map(|i| **i).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn create_with_is_all_or_nothing() {
        let c = LazyCollection::loaded_with(vec![Arc::new(1u32)]);

        let err = c
            .create_with(
                || unreachable!(),
                |items| {
                    if items.iter().any(|i| **i == 1) {
                        Err(CopickError::conflict("number", 1))
                    } else {
                        Ok(Arc::new(1))
                    }
                },
            )
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(c.len_if_loaded().unwrap(), Some(1));

        let created = c.create_with(|| unreachable!(), |_| Ok(Arc::new(2))).unwrap();
        assert_eq!(*created, 2);
        assert_eq!(c.len_if_loaded().unwrap(), Some(2));
    }

    #[test]
    fn retained_lookups_are_shared_and_reused_by_the_first_load() {
        let c = LazyCollection::<u32>::new().identified_by(|a, b| a == b);
        let found = c.retain(Arc::new(7)).unwrap();
        let again = c.retain(Arc::new(7)).unwrap();
        assert!(Arc::ptr_eq(&found, &again));
        assert!(!c.is_loaded().unwrap());

        let items = c.get(|| Ok(vec![Arc::new(3), Arc::new(7)])).unwrap();
        assert!(Arc::ptr_eq(&items[1], &found));
        assert!(!Arc::ptr_eq(&items[0], &found));
    }

    #[test]
    fn refresh_keeps_instances_of_children_still_reported() {
        let c = LazyCollection::loaded_with(vec![Arc::new(1u32), Arc::new(2)])
            .identified_by(|a, b| a == b);
        let before = c.loaded().unwrap().unwrap();

        let after = c.refresh(|| Ok(vec![Arc::new(2), Arc::new(5)])).unwrap();
        assert_eq!(after.len(), 2);
        assert!(Arc::ptr_eq(&after[0], &before[1]));
        assert_eq!(*after[1], 5);
    }

    #[test]
    fn without_identity_refresh_takes_fresh_instances() {
        let c = LazyCollection::loaded_with(vec![Arc::new(1u32)]);
        let before = c.loaded().unwrap().unwrap();
        let after = c.refresh(|| Ok(vec![Arc::new(1)])).unwrap();
        assert!(!Arc::ptr_eq(&after[0], &before[0]));
    }

    #[test]
    fn concurrent_first_access_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c: Arc<LazyCollection<u32>> = Arc::new(LazyCollection::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    c.get(|| counted(&calls, &[1, 2, 3])).unwrap().len()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), 3);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
