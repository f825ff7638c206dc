//! Cached mapping table

// Imports
use {
	crate::flash::Lpn,
	std::collections::{BTreeMap, HashMap},
};

/// Cache entry
#[derive(Clone, Copy, Debug)]
struct Entry {
	/// Whether the entry differs from its translation page on flash
	dirty: bool,

	/// Last access tick
	tick: u64,
}

/// Evicted entry
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Evicted {
	pub lpn:   Lpn,
	pub dirty: bool,
}

/// Cached mapping table.
///
/// Keeps at most `capacity` entries, evicting the least recently used one.
/// Only the dirty state is kept here, the mappings themselves live in the
/// translation layer's table.
#[derive(Clone, Debug)]
pub struct Cmt {
	/// Capacity
	capacity: usize,

	/// Entries
	entries: HashMap<Lpn, Entry>,

	/// Entries by last access tick
	lru: BTreeMap<u64, Lpn>,

	/// Next tick
	next_tick: u64,
}

impl Cmt {
	/// Creates an empty cache
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			entries: HashMap::with_capacity(capacity),
			lru: BTreeMap::new(),
			next_tick: 0,
		}
	}

	/// Returns the capacity
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Returns the number of cached entries
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns if the cache is empty
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Returns if `lpn` is cached
	pub fn contains(&self, lpn: Lpn) -> bool {
		self.entries.contains_key(&lpn)
	}

	/// Returns if `lpn` is cached and dirty
	pub fn is_dirty(&self, lpn: Lpn) -> bool {
		self.entries.get(&lpn).is_some_and(|entry| entry.dirty)
	}

	/// Accesses `lpn`, marking it as most recently used.
	///
	/// If `dirty`, the entry is also marked dirty.
	/// Returns if `lpn` was cached.
	pub fn access(&mut self, lpn: Lpn, dirty: bool) -> bool {
		let tick = self.tick();
		let Some(entry) = self.entries.get_mut(&lpn) else {
			return false;
		};

		self.lru.remove(&entry.tick);
		self.lru.insert(tick, lpn);
		entry.tick = tick;
		entry.dirty |= dirty;

		true
	}

	/// Marks a cached entry dirty without accessing it.
	///
	/// Returns if `lpn` was cached.
	pub fn mark_dirty(&mut self, lpn: Lpn) -> bool {
		match self.entries.get_mut(&lpn) {
			Some(entry) => {
				entry.dirty = true;
				true
			},
			None => false,
		}
	}

	/// Evicts the least recently used entry, if the cache is full
	pub fn make_room(&mut self) -> Option<Evicted> {
		if self.entries.len() < self.capacity {
			return None;
		}

		let (_, lpn) = self.lru.pop_first()?;
		let entry = self.entries.remove(&lpn);
		Some(Evicted {
			lpn,
			dirty: entry.is_some_and(|entry| entry.dirty),
		})
	}

	/// Inserts an uncached entry, returning the entry evicted to make room for it.
	///
	/// # Panics
	/// Panics if `lpn` is already cached.
	pub fn insert(&mut self, lpn: Lpn, dirty: bool) -> Option<Evicted> {
		assert!(!self.contains(lpn), "Entry {lpn} is already cached");
		let evicted = self.make_room();

		let tick = self.tick();
		self.entries.insert(lpn, Entry { dirty, tick });
		self.lru.insert(tick, lpn);

		evicted
	}

	/// Marks every cached entry matching `pred` as clean
	pub fn clean(&mut self, mut pred: impl FnMut(Lpn) -> bool) {
		for (&lpn, entry) in &mut self.entries {
			if pred(lpn) {
				entry.dirty = false;
			}
		}
	}

	/// Returns the dirty entries matching `pred`
	pub fn dirty_entries(&self, mut pred: impl FnMut(Lpn) -> bool) -> Vec<Lpn> {
		self.entries
			.iter()
			.filter(|&(&lpn, entry)| entry.dirty && pred(lpn))
			.map(|(&lpn, _)| lpn)
			.collect()
	}

	fn tick(&mut self) -> u64 {
		let tick = self.next_tick;
		self.next_tick += 1;
		tick
	}
}
