//! Per-Request Arena Allocator
//!
//! A thread-local [`Bump`] holds request-scoped data: context state, staged
//! response headers and any scratch allocations a handler makes through
//! [`RequestContext::arena`](crate::RequestContext::arena). Everything is
//! reclaimed at once when the request finishes.
//!
//! Each worker thread owns its arena, so allocation never synchronizes.
//!
//! ## Usage
//!
//! ```rust
//! use girder_core::arena;
//!
//! let len = arena::scope(|bump| {
//!     let s = bump.alloc_str("hello");
//!     s.len()
//! });
//! // Arena is reset here - all allocations freed
//! assert_eq!(len, 5);
//! ```

use bumpalo::Bump;
use std::borrow::Borrow;
use std::cell::RefCell;
use std::fmt;

/// Default arena size (64 KB - fits most requests)
const DEFAULT_ARENA_SIZE: usize = 64 * 1024;

/// Maximum arena size before it is recreated (1 MB)
const MAX_ARENA_SIZE: usize = 1024 * 1024;

thread_local! {
    /// Reused across requests to avoid repeated arena creation.
    static ARENA: RefCell<Bump> = RefCell::new(Bump::with_capacity(DEFAULT_ARENA_SIZE));
}

/// Run `f` with the thread-local arena without resetting it afterwards.
#[inline]
pub fn with_arena<F, R>(f: F) -> R
where
    F: FnOnce(&Bump) -> R,
{
    ARENA.with(|arena| {
        let arena = arena.borrow();
        f(&arena)
    })
}

/// Run one request cycle: `f` gets the arena, which is reset when `f` returns
/// or unwinds.
///
/// Nested scopes share the outer arena; only the outermost one resets it.
#[inline]
pub fn scope<F, R>(f: F) -> R
where
    F: FnOnce(&Bump) -> R,
{
    let _scope = RequestScope::new();
    with_arena(f)
}

/// Reset the thread-local arena, freeing all allocations.
///
/// Does nothing while the arena is still borrowed. If the arena has grown
/// past 1 MB it is replaced by a fresh default-sized one.
#[inline]
pub fn reset_arena() {
    ARENA.with(|arena| {
        let Ok(mut arena) = arena.try_borrow_mut() else {
            return;
        };

        if arena.allocated_bytes() > MAX_ARENA_SIZE {
            *arena = Bump::with_capacity(DEFAULT_ARENA_SIZE);
        } else {
            arena.reset();
        }
    });
}

/// Get the current arena allocation size (for diagnostics).
#[inline]
pub fn arena_allocated_bytes() -> usize {
    ARENA.with(|arena| arena.borrow().allocated_bytes())
}

/// Resets the thread-local arena when dropped.
pub struct RequestScope {
    _private: (),
}

impl RequestScope {
    /// Create a new request scope.
    #[inline]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestScope {
    #[inline]
    fn drop(&mut self) {
        reset_arena();
    }
}

// ============================================================================
// Arena-Backed Collections
// ============================================================================

/// Arena-backed vector.
pub type ArenaVec<'a, T> = bumpalo::collections::Vec<'a, T>;

/// A small arena-backed map, stored as a vector of pairs.
///
/// Lookups are linear, which beats hashing for the handful of entries a
/// request carries.
pub struct ArenaMap<'a, K, V> {
    entries: ArenaVec<'a, (K, V)>,
}

impl<'a, K: PartialEq, V> ArenaMap<'a, K, V> {
    /// Create a new empty arena map.
    #[inline]
    pub fn new_in(arena: &'a Bump) -> Self {
        Self {
            entries: ArenaVec::new_in(arena),
        }
    }

    /// Insert a key-value pair.
    ///
    /// If the key exists, the value is updated and the old value returned.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        for entry in self.entries.iter_mut() {
            if entry.0 == key {
                return Some(std::mem::replace(&mut entry.1, value));
            }
        }
        self.entries.push((key, value));
        None
    }

    /// Get a reference to a value by key.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        self.entries
            .iter()
            .find(|(k, _)| <K as Borrow<Q>>::borrow(k) == key)
            .map(|(_, v)| v)
    }

    /// Remove an entry, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        let index = self.entries.iter().position(|(k, _)| <K as Borrow<Q>>::borrow(k) == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Check if a key exists.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        self.entries.iter().any(|(k, _)| <K as Borrow<Q>>::borrow(k) == key)
    }

    /// Get the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in insertion order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &(K, V)> {
        self.entries.iter()
    }
}

impl<K: PartialEq + fmt::Debug, V: fmt::Debug> fmt::Debug for ArenaMap<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}
