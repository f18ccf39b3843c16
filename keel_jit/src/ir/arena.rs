//! Index-based storage for graph nodes and schedule blocks.
//!
//! Nodes and blocks never own each other. They refer to their neighbours by
//! typed 32-bit ids handed out by an [`Arena`], and per-pass side tables are
//! dense vectors indexed by the same ids ([`IdMap`], [`IdSet`]). A side table
//! is sized from the arena's high-water mark, so it stays valid as long as no
//! new items are allocated while the pass runs.

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

// =============================================================================
// Typed ID
// =============================================================================

/// A typed index into an [`Arena`].
///
/// The parameter only tags the id; it is not stored. Traits are implemented
/// by hand so that `Id<T>` is `Copy`/`Eq`/`Hash` for every `T`.
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> std::hash::Hash for Id<T> {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Id<T> {
    /// The null id. Used for severed input slots and absent blocks.
    pub const INVALID: Self = Id {
        index: u32::MAX,
        _marker: PhantomData,
    };

    #[inline]
    pub const fn new(index: u32) -> Self {
        Id {
            index,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.index != u32::MAX
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#null")
        }
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Append-only storage. Items are never freed individually; a dead node
/// stays allocated (and keeps its id) until the whole graph is dropped.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Arena<T> {
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Allocate `item` under the next monotonic id.
    #[inline]
    pub fn alloc(&mut self, item: T) -> Id<T> {
        let index = u32::try_from(self.items.len()).expect("arena exceeds u32::MAX items");
        self.items.push(item);
        Id::new(index)
    }

    #[inline]
    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.items.get(id.as_usize())
    }

    #[inline]
    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        self.items.get_mut(id.as_usize())
    }

    /// Number of ids ever handed out (the high-water mark).
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Id::new(i as u32), item))
    }

    pub fn ids(&self) -> impl Iterator<Item = Id<T>> {
        (0..self.items.len() as u32).map(Id::new)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena { items: Vec::new() }
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &Self::Output {
        &self.items[id.as_usize()]
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut Self::Output {
        &mut self.items[id.as_usize()]
    }
}

// =============================================================================
// Dense side table
// =============================================================================

/// A dense map from ids to values, pre-filled with a default.
///
/// Reads past the end return the fill value, so a table built before a pass
/// tolerates nodes allocated during that pass.
#[derive(Debug, Clone)]
pub struct IdMap<K, V> {
    values: Vec<V>,
    fill: V,
    _marker: PhantomData<fn() -> K>,
}

impl<K, V: Clone> IdMap<K, V> {
    /// A table with `len` slots, all set to `fill`.
    pub fn filled(len: usize, fill: V) -> Self {
        IdMap {
            values: vec![fill.clone(); len],
            fill,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn get(&self, id: Id<K>) -> &V {
        self.values.get(id.as_usize()).unwrap_or(&self.fill)
    }

    /// Mutable access; grows the table when `id` is past the end.
    #[inline]
    pub fn get_mut(&mut self, id: Id<K>) -> &mut V {
        let idx = id.as_usize();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, self.fill.clone());
        }
        &mut self.values[idx]
    }

    #[inline]
    pub fn set(&mut self, id: Id<K>, value: V) {
        *self.get_mut(id) = value;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id<K>, &V)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (Id::new(i as u32), v))
    }
}

impl<K, V: Clone + Default> IdMap<K, V> {
    pub fn with_len(len: usize) -> Self {
        Self::filled(len, V::default())
    }
}

impl<K, V: Clone> Index<Id<K>> for IdMap<K, V> {
    type Output = V;

    fn index(&self, id: Id<K>) -> &Self::Output {
        self.get(id)
    }
}

impl<K, V: Clone> IndexMut<Id<K>> for IdMap<K, V> {
    fn index_mut(&mut self, id: Id<K>) -> &mut Self::Output {
        self.get_mut(id)
    }
}

// =============================================================================
// Dense id set
// =============================================================================

/// A growable bit set of ids.
#[derive(Clone, PartialEq, Eq)]
pub struct IdSet<K> {
    words: Vec<u64>,
    _marker: PhantomData<fn() -> K>,
}

impl<K> IdSet<K> {
    pub fn with_capacity(bits: usize) -> Self {
        IdSet {
            words: vec![0; bits.div_ceil(64)],
            _marker: PhantomData,
        }
    }

    /// Insert `id`; returns `true` if it was not already present.
    #[inline]
    pub fn insert(&mut self, id: Id<K>) -> bool {
        let (word, mask) = Self::locate(id);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    #[inline]
    pub fn remove(&mut self, id: Id<K>) {
        let (word, mask) = Self::locate(id);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !mask;
        }
    }

    #[inline]
    pub fn contains(&self, id: Id<K>) -> bool {
        let (word, mask) = Self::locate(id);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Id<K>> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            (0..64u32)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| Id::new(wi as u32 * 64 + bit))
        })
    }

    #[inline]
    fn locate(id: Id<K>) -> (usize, u64) {
        let idx = id.as_usize();
        (idx / 64, 1u64 << (idx % 64))
    }
}

impl<K> Default for IdSet<K> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<K> std::fmt::Debug for IdSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
