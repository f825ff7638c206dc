//! Demand-based page-mapped translation layer
//!
//! Every logical page maps to any physical page. The full mapping table lives
//! on flash, in translation pages, located by the global translation directory,
//! and only a bounded number of entries are cached in memory.

// Modules
pub mod cmt;

// Exports
pub use self::cmt::Cmt;

// Imports
use {
	super::Location,
	crate::{
		config::GcConfig,
		error::FtlError,
		flash::{Geometry, Lpn, Ppa, Tvpn},
		gc::{self, Relocator, VictimPolicy},
		oob::PageOwner,
		ssd::{ReadKind, Ssd, WriteKind},
	},
	std::{collections::BTreeSet, fmt, mem},
};

/// Size of a mapping entry in a translation page, in bytes
pub const ENTRY_SIZE: u64 = 8;

/// Demand-based page-mapped translation layer
#[derive(Debug)]
pub struct Dftl {
	/// Mapping
	mapping: Mapping,

	/// Garbage collection config
	gc: GcConfig,

	/// Victim policy
	victim_policy: Box<dyn VictimPolicy>,
}

impl Dftl {
	/// Creates a new, empty, translation layer
	#[must_use]
	pub fn new(geometry: Geometry, logical_pages: u64, cache_entries: usize, gc: GcConfig) -> Self {
		let entries_per_page = geometry.page_size / ENTRY_SIZE;
		let translation_pages = logical_pages.div_ceil(entries_per_page);

		Self {
			mapping: Mapping {
				table: vec![None; logical_pages as usize],
				gtd: vec![None; translation_pages as usize],
				cmt: Cmt::new(cache_entries),
				entries_per_page,
				stale: BTreeSet::new(),
			},
			victim_policy: gc.victim_policy.build(),
			gc,
		}
	}

	/// Replaces the victim policy
	pub fn set_victim_policy(&mut self, policy: Box<dyn VictimPolicy>) {
		self.victim_policy = policy;
	}

	/// Returns the current mapping of `lpn`
	#[must_use]
	pub fn mapping(&self, lpn: Lpn) -> Option<Ppa> {
		self.mapping.table.get(lpn.to_usize()).copied().flatten()
	}

	/// Returns where translation page `tvpn` is stored
	#[must_use]
	pub fn translation_page(&self, tvpn: Tvpn) -> Option<Ppa> {
		self.mapping.gtd.get(tvpn.to_usize()).copied().flatten()
	}

	/// Returns the translation page holding the entry for `lpn`
	#[must_use]
	pub fn tvpn_of(&self, lpn: Lpn) -> Tvpn {
		self.mapping.tvpn_of(lpn)
	}

	/// Returns the cached mapping table
	#[must_use]
	pub fn cmt(&self) -> &Cmt {
		&self.mapping.cmt
	}

	/// Translates `lpn`, loading its entry into the cache on a miss
	pub fn translate(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<Location, FtlError> {
		ssd.check_lpn(lpn)?;

		match self.mapping.cmt.access(lpn, false) {
			true => ssd.metrics.counters.cache_hits += 1,
			false => {
				ssd.metrics.counters.cache_misses += 1;
				if let Some(ppa) = self.mapping.gtd[self.mapping.tvpn_of(lpn).to_usize()] {
					ssd.read(ppa, ReadKind::Translation)?;
				}

				// Note: Unmapped entries aren't worth caching.
				if self.mapping.table[lpn.to_usize()].is_some() {
					self.ensure_space(ssd, time)?;
					self.mapping.cache(ssd, lpn, false, time)?;
				}
			},
		}

		self.mapping.table[lpn.to_usize()]
			.map(Location::Page)
			.ok_or(FtlError::UnmappedRead { lpn })
	}

	/// Writes `lpn` to a new page at the write frontier
	pub fn remap(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<Location, FtlError> {
		ssd.check_lpn(lpn)?;
		self.ensure_space(ssd, time)?;

		let ppa = ssd.program(PageOwner::Data(lpn), WriteKind::Host, time)?;

		// Note: Garbage collection may have moved the previous page, so it's only
		//       looked up now.
		if let Some(old_ppa) = self.mapping.table[lpn.to_usize()].replace(ppa) {
			ssd.invalidate(old_ppa)?;
		}

		match self.mapping.cmt.access(lpn, true) {
			true => ssd.metrics.counters.cache_hits += 1,
			false => {
				ssd.metrics.counters.cache_misses += 1;
				self.mapping.cache(ssd, lpn, true, time)?;
			},
		}

		Ok(Location::Page(ppa))
	}

	/// Discards `lpn`, if mapped
	pub fn discard(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<(), FtlError> {
		ssd.check_lpn(lpn)?;
		let Some(ppa) = self.mapping.table[lpn.to_usize()].take() else {
			return Ok(());
		};
		ssd.invalidate(ppa)?;

		// The removal must still reach the translation page
		if !self.mapping.cmt.access(lpn, true) {
			self.ensure_space(ssd, time)?;
			self.mapping.cache(ssd, lpn, true, time)?;
		}

		Ok(())
	}

	/// Collects garbage, if below the low watermark
	fn ensure_space(&mut self, ssd: &mut Ssd, time: u64) -> Result<(), FtlError> {
		gc::collect(ssd, &self.gc, &*self.victim_policy, &mut self.mapping, time)?;
		Ok(())
	}

	/// Formats debug output to `f`
	pub fn fmt_debug(&self, ssd: &Ssd, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
		let counters = &ssd.metrics.counters;
		let lookups = counters.cache_hits + counters.cache_misses;
		let hit_ratio = match lookups {
			0 => 0.0,
			_ => 100.0 * counters.cache_hits as f64 / lookups as f64,
		};

		write!(
			f,
			"cache: {}/{} ({hit_ratio:.2}% hits), translation pages: {} read / {} written",
			self.mapping.cmt.len(),
			self.mapping.cmt.capacity(),
			counters.translation_pages_read,
			counters.translation_pages_written,
		)
	}
}

/// Mapping state
#[derive(Debug)]
struct Mapping {
	/// Authoritative mapping table, by logical page
	table: Vec<Option<Ppa>>,

	/// Global translation directory, by translation page
	gtd: Vec<Option<Ppa>>,

	/// Cached entries
	cmt: Cmt,

	/// Mapping entries per translation page
	entries_per_page: u64,

	/// Translation pages with relocated, uncached, entries that weren't yet written back
	stale: BTreeSet<Tvpn>,
}

impl Mapping {
	fn tvpn_of(&self, lpn: Lpn) -> Tvpn {
		Tvpn(lpn.to_u64() / self.entries_per_page)
	}

	/// Caches the entry for `lpn`, writing back the evicted entry's
	/// translation page if dirty.
	fn cache(&mut self, ssd: &mut Ssd, lpn: Lpn, dirty: bool, time: u64) -> Result<(), FtlError> {
		if let Some(evicted) = self.cmt.make_room() {
			ssd.metrics.counters.cache_evictions += 1;
			if evicted.dirty {
				ssd.metrics.counters.dirty_evictions += 1;
				self.write_back(ssd, self.tvpn_of(evicted.lpn), time)?;
			}
		}

		self.cmt.insert(lpn, dirty);
		Ok(())
	}

	/// Writes translation page `tvpn` with the current entries.
	///
	/// Every cached entry of the page becomes clean.
	fn write_back(&mut self, ssd: &mut Ssd, tvpn: Tvpn, time: u64) -> Result<(), FtlError> {
		let ppa = ssd.program(PageOwner::Translation(tvpn), WriteKind::Translation, time)?;
		if let Some(old_ppa) = self.gtd[tvpn.to_usize()].replace(ppa) {
			ssd.invalidate(old_ppa)?;
		}

		let entries_per_page = self.entries_per_page;
		self.cmt.clean(|lpn| lpn.to_u64() / entries_per_page == tvpn.to_u64());
		self.stale.remove(&tvpn);
		tracing::trace!(?tvpn, ?ppa, "Wrote back translation page");

		Ok(())
	}
}

impl Relocator for Mapping {
	fn relocate(&mut self, owner: PageOwner, old: Ppa, new: Ppa) {
		match owner {
			PageOwner::Data(lpn) => {
				let entry = &mut self.table[lpn.to_usize()];
				debug_assert_eq!(*entry, Some(old), "Relocated page wasn't mapped");
				*entry = Some(new);

				if !self.cmt.mark_dirty(lpn) {
					self.stale.insert(self.tvpn_of(lpn));
				}
			},
			PageOwner::Translation(tvpn) => {
				let entry = &mut self.gtd[tvpn.to_usize()];
				debug_assert_eq!(*entry, Some(old), "Relocated translation page wasn't current");
				*entry = Some(new);
			},
		}
	}

	fn finish(&mut self, ssd: &mut Ssd, time: u64) -> Result<(), FtlError> {
		for tvpn in mem::take(&mut self.stale) {
			self.write_back(ssd, tvpn, time)?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::{
			config::VictimPolicyKind,
			flash::{pool::Fifo, BlockId, Flash},
		},
	};

	fn setup(block_count: u64, logical_pages: u64, cache_entries: usize, watermark: usize) -> (Ssd, Dftl) {
		let geometry = Geometry {
			page_size: 4096,
			pages_per_block: 4,
			block_count,
		};
		let gc = GcConfig {
			low_watermark:  watermark,
			high_watermark: watermark,
			victim_policy:  VictimPolicyKind::Greedy,
		};

		let ssd = Ssd::new(Flash::new(geometry, Box::new(Fifo)), logical_pages);
		let dftl = Dftl::new(geometry, logical_pages, cache_entries, gc);
		(ssd, dftl)
	}

	#[test]
	fn dirty_evictions_write_translation_pages() {
		let (mut ssd, mut dftl) = setup(4, 12, 2, 1);
		for lpn in 0..8 {
			dftl.remap(&mut ssd, Lpn(lpn), lpn).expect("Unable to write");
		}

		let counters = ssd.metrics.counters;
		assert_eq!(counters.host_pages_written, 8);
		assert_eq!(counters.cache_evictions, 6);
		assert_eq!(counters.dirty_evictions, 3);
		assert_eq!(counters.translation_pages_written, 3);
		assert_eq!(counters.gc_runs, 0);
		assert_eq!(ssd.flash.free_blocks(), 1);

		// Only the latest translation page is valid
		let tppa = dftl.translation_page(Tvpn(0)).expect("Translation page wasn't written");
		assert_eq!(tppa, ssd.flash.geometry().ppa(BlockId(2), 1));
		assert_eq!(
			ssd.flash.oob().reverse_lookup(tppa),
			Some(PageOwner::Translation(Tvpn(0)))
		);

		// Reading an evicted entry needs to read its translation page
		let before = ssd.metrics.counters;
		let location = dftl.translate(&mut ssd, Lpn(0), 8).expect("Unable to translate");
		assert_eq!(location, Location::Page(Ppa(0)));
		let delta = ssd.metrics.counters.since(&before);
		assert_eq!(delta.cache_misses, 1);
		assert_eq!(delta.translation_pages_read, 1);
		assert!(dftl.cmt().contains(Lpn(0)));

		// And now it's a hit
		let before = ssd.metrics.counters;
		dftl.translate(&mut ssd, Lpn(0), 9).expect("Unable to translate");
		let delta = ssd.metrics.counters.since(&before);
		assert_eq!(delta.cache_hits, 1);
		assert_eq!(delta.translation_pages_read, 0);

		ssd.flash.check_invariants().expect("Invariants broken");
	}

	#[test]
	fn discard_is_idempotent() {
		let (mut ssd, mut dftl) = setup(4, 12, 4, 1);
		let Location::Page(ppa) = dftl.remap(&mut ssd, Lpn(3), 0).expect("Unable to write") else {
			panic!("Page mapped layer should map to pages");
		};

		dftl.discard(&mut ssd, Lpn(3), 1).expect("Unable to discard");
		assert_eq!(dftl.mapping(Lpn(3)), None);
		assert_eq!(ssd.flash.oob().reverse_lookup(ppa), None);
		assert!(dftl.cmt().is_dirty(Lpn(3)));

		let before = ssd.metrics.counters;
		dftl.discard(&mut ssd, Lpn(3), 2).expect("Unable to discard");
		assert_eq!(ssd.metrics.counters, before);

		assert_eq!(
			dftl.translate(&mut ssd, Lpn(3), 3),
			Err(FtlError::UnmappedRead { lpn: Lpn(3) })
		);
	}

	#[test]
	fn out_of_range_pages_are_rejected() {
		let (mut ssd, mut dftl) = setup(4, 12, 4, 1);
		assert_eq!(
			dftl.remap(&mut ssd, Lpn(12), 0),
			Err(FtlError::LpnOutOfRange {
				lpn:           Lpn(12),
				logical_pages: 12,
			})
		);
	}

	#[test]
	fn gc_keeps_mappings_valid() {
		let (mut ssd, mut dftl) = setup(8, 16, 2, 2);
		for idx in 0..200 {
			let lpn = Lpn((idx * 7) % 16);
			dftl.remap(&mut ssd, lpn, idx).expect("Unable to write");
		}

		let counters = ssd.metrics.counters;
		assert!(counters.gc_runs > 0);
		assert!(counters.erases > 0);
		assert!(counters.pages_moved > 0);

		for lpn in (0..16).map(Lpn) {
			let ppa = dftl.mapping(lpn).expect("Written page should be mapped");
			assert_eq!(ssd.flash.oob().reverse_lookup(ppa), Some(PageOwner::Data(lpn)));
		}

		let tppa = dftl.translation_page(Tvpn(0)).expect("Translation page wasn't written");
		assert_eq!(
			ssd.flash.oob().reverse_lookup(tppa),
			Some(PageOwner::Translation(Tvpn(0)))
		);
		ssd.flash.check_invariants().expect("Invariants broken");
	}
}
