//! Hybrid log-block translation layer
//!
//! Logical blocks map to data blocks, with each logical page at a fixed offset.
//! Writes are appended to a small set of log blocks, page-mapped, which are
//! merged back into data blocks once exhausted.

// Imports
use {
	super::Location,
	crate::{
		error::FtlError,
		flash::{BlockId, Geometry, Lpn, Ppa},
		oob::{PageOwner, PageState},
		ssd::{ReadKind, Ssd, WriteKind},
	},
	std::{
		cmp::Reverse,
		collections::{BTreeMap, HashMap},
		fmt,
	},
};

/// Merge policy.
///
/// Selects the logical block to merge when log blocks run out.
pub trait MergePolicy: fmt::Debug + Send {
	/// Selects a logical block among those with log entries.
	///
	/// `log_entries` maps each logical block to its number of valid log pages.
	fn select(&self, log_entries: &BTreeMap<u64, u64>) -> Option<u64>;
}

/// Merges the logical block with the most log entries, breaking ties by the lowest block
#[derive(Clone, Copy, Debug, Default)]
pub struct MostLogEntries;

impl MergePolicy for MostLogEntries {
	fn select(&self, log_entries: &BTreeMap<u64, u64>) -> Option<u64> {
		log_entries
			.iter()
			.max_by_key(|&(&lbn, &count)| (count, Reverse(lbn)))
			.map(|(&lbn, _)| lbn)
	}
}

/// Hybrid log-block translation layer
#[derive(Debug)]
pub struct Hybrid {
	/// Geometry
	geometry: Geometry,

	/// Data block, by logical block
	data_blocks: Vec<Option<BlockId>>,

	/// Log-mapped pages
	log_map: HashMap<Lpn, Ppa>,

	/// Log blocks, oldest first.
	///
	/// Only the last one receives writes.
	log_blocks: Vec<BlockId>,

	/// Maximum number of log blocks
	max_log_blocks: usize,

	/// Valid log pages, by logical block
	log_entries: BTreeMap<u64, u64>,

	/// Merge policy
	merge_policy: Box<dyn MergePolicy>,
}

impl Hybrid {
	/// Creates a new, empty, translation layer
	#[must_use]
	pub fn new(geometry: Geometry, logical_pages: u64, max_log_blocks: usize) -> Self {
		let logical_blocks = logical_pages.div_ceil(geometry.pages_per_block);
		Self {
			geometry,
			data_blocks: vec![None; logical_blocks as usize],
			log_map: HashMap::new(),
			log_blocks: Vec::with_capacity(max_log_blocks),
			max_log_blocks,
			log_entries: BTreeMap::new(),
			merge_policy: Box::new(MostLogEntries),
		}
	}

	/// Replaces the merge policy
	pub fn set_merge_policy(&mut self, policy: Box<dyn MergePolicy>) {
		self.merge_policy = policy;
	}

	/// Returns the data block of a logical block
	#[must_use]
	pub fn data_block(&self, lbn: u64) -> Option<BlockId> {
		self.data_blocks.get(lbn as usize).copied().flatten()
	}

	/// Returns the log blocks, oldest first
	#[must_use]
	pub fn log_blocks(&self) -> &[BlockId] {
		&self.log_blocks
	}

	/// Returns the log page `lpn` is mapped to, if any
	#[must_use]
	pub fn log_page(&self, lpn: Lpn) -> Option<Ppa> {
		self.log_map.get(&lpn).copied()
	}

	/// Translates `lpn`
	pub fn translate(&self, ssd: &Ssd, lpn: Lpn) -> Result<Location, FtlError> {
		ssd.check_lpn(lpn)?;
		self.lookup(ssd, lpn)
			.map(Location::Page)
			.ok_or(FtlError::UnmappedRead { lpn })
	}

	/// Writes `lpn` to the current log block
	pub fn remap(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<Location, FtlError> {
		ssd.check_lpn(lpn)?;
		let ppa = self.append_log(ssd, lpn, time)?;

		// Note: A merge may have moved the previous page, so it's only looked up now.
		self.remove(ssd, lpn, time)?;

		let lbn = self.lbn_of(lpn);
		self.log_map.insert(lpn, ppa);
		*self.log_entries.entry(lbn).or_default() += 1;

		Ok(Location::Page(ppa))
	}

	/// Discards `lpn`, if mapped
	pub fn discard(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<(), FtlError> {
		ssd.check_lpn(lpn)?;
		self.remove(ssd, lpn, time)
	}

	fn lbn_of(&self, lpn: Lpn) -> u64 {
		lpn.to_u64() / self.geometry.pages_per_block
	}

	fn lpn_at(&self, lbn: u64, offset: u64) -> Lpn {
		Lpn(lbn * self.geometry.pages_per_block + offset)
	}

	/// Returns the data block page of `lpn`, if valid
	fn data_page(&self, ssd: &Ssd, lpn: Lpn) -> Option<Ppa> {
		let block = self.data_block(self.lbn_of(lpn))?;
		let ppa = self
			.geometry
			.ppa(block, lpn.to_u64() % self.geometry.pages_per_block);

		(ssd.flash.oob().page(ppa).state == PageState::Valid).then_some(ppa)
	}

	/// Returns the current page of `lpn`, if any
	fn lookup(&self, ssd: &Ssd, lpn: Lpn) -> Option<Ppa> {
		self.log_page(lpn).or_else(|| self.data_page(ssd, lpn))
	}

	/// Invalidates the current page of `lpn`, if any.
	///
	/// Data blocks left without valid pages are erased.
	fn remove(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<(), FtlError> {
		let lbn = self.lbn_of(lpn);
		if let Some(ppa) = self.log_map.remove(&lpn) {
			ssd.invalidate(ppa)?;
			self.remove_log_entry(lbn);
			return Ok(());
		}

		if let Some(ppa) = self.data_page(ssd, lpn) {
			ssd.invalidate(ppa)?;

			let block = ssd.flash.geometry().block_of(ppa);
			if ssd.flash.oob().counts(block).valid == 0 {
				ssd.erase(block, time)?;
				self.data_blocks[lbn as usize] = None;
			}
		}

		Ok(())
	}

	fn remove_log_entry(&mut self, lbn: u64) {
		if let Some(count) = self.log_entries.get_mut(&lbn) {
			*count -= 1;
			if *count == 0 {
				self.log_entries.remove(&lbn);
			}
		}
	}

	/// Appends `lpn` to the current log block, merging if all log blocks are exhausted
	fn append_log(&mut self, ssd: &mut Ssd, lpn: Lpn, time: u64) -> Result<Ppa, FtlError> {
		let pages_per_block = self.geometry.pages_per_block;
		let current = self.log_blocks.last().copied().filter(|&block| {
			ssd.flash
				.block(block)
				.is_some_and(|block| block.cursor() < pages_per_block)
		});

		let block = match current {
			Some(block) => block,
			None => {
				while self.log_blocks.len() >= self.max_log_blocks {
					self.merge(ssd, time)?;
				}

				let block = ssd.allocate_block()?;
				self.log_blocks.push(block);
				block
			},
		};

		let ppa = ssd.program_in(block, PageOwner::Data(lpn), WriteKind::Host, time)?;
		Ok(ppa)
	}

	/// Merges a logical block selected by the merge policy, then reclaims all
	/// log blocks left without valid pages.
	fn merge(&mut self, ssd: &mut Ssd, time: u64) -> Result<(), FtlError> {
		let selected = self.merge_policy.select(&self.log_entries);
		if let Some(lbn) = selected {
			match self.switchable_log_block(lbn) {
				Some(log_block) => self.switch_merge(ssd, lbn, log_block, time)?,
				None => self.full_merge(ssd, lbn, time)?,
			}
		}

		let reclaimed = self.reclaim_log_blocks(ssd, time)?;
		if selected.is_none() && reclaimed == 0 {
			return Err(FtlError::GcDeadlock {
				free_blocks: ssd.flash.free_blocks(),
				reason:      "no log block can be merged or reclaimed",
			});
		}

		Ok(())
	}

	/// Returns the log block holding every page of `lbn`, in order, if any
	fn switchable_log_block(&self, lbn: u64) -> Option<BlockId> {
		let pages_per_block = self.geometry.pages_per_block;
		let first = self.log_page(self.lpn_at(lbn, 0))?;
		if self.geometry.offset_of(first) != 0 {
			return None;
		}

		let block = self.geometry.block_of(first);
		(1..pages_per_block)
			.all(|offset| self.log_page(self.lpn_at(lbn, offset)) == Some(self.geometry.ppa(block, offset)))
			.then_some(block)
	}

	/// Turns `log_block` into the data block of `lbn`
	fn switch_merge(&mut self, ssd: &mut Ssd, lbn: u64, log_block: BlockId, time: u64) -> Result<(), FtlError> {
		for offset in 0..self.geometry.pages_per_block {
			let lpn = self.lpn_at(lbn, offset);
			self.log_map.remove(&lpn);
		}
		self.log_entries.remove(&lbn);
		self.log_blocks.retain(|&block| block != log_block);

		// Note: Every page of the old data block was superseded by the log block
		if let Some(old_block) = self.data_blocks[lbn as usize].replace(log_block) {
			ssd.erase(old_block, time)?;
		}

		ssd.metrics.counters.switch_merges += 1;
		tracing::trace!(lbn, ?log_block, "Switch merge");

		Ok(())
	}

	/// Copies the current page of every logical page of `lbn` into a new data block
	fn full_merge(&mut self, ssd: &mut Ssd, lbn: u64, time: u64) -> Result<(), FtlError> {
		let new_block = ssd.allocate_block()?;
		let mut moved = 0;
		for offset in 0..self.geometry.pages_per_block {
			let lpn = self.lpn_at(lbn, offset);
			let Some(ppa) = self.lookup(ssd, lpn) else {
				continue;
			};

			ssd.read(ppa, ReadKind::Migration)?;
			ssd.program_at(new_block, offset, PageOwner::Data(lpn), WriteKind::Migration, time)?;
			ssd.invalidate(ppa)?;
			self.log_map.remove(&lpn);
			moved += 1;
		}
		self.log_entries.remove(&lbn);

		if let Some(old_block) = self.data_blocks[lbn as usize].replace(new_block) {
			ssd.erase(old_block, time)?;
		}

		ssd.metrics.counters.full_merges += 1;
		tracing::trace!(lbn, ?new_block, moved, "Full merge");

		Ok(())
	}

	/// Erases every written log block without valid pages
	fn reclaim_log_blocks(&mut self, ssd: &mut Ssd, time: u64) -> Result<usize, FtlError> {
		let dead = self
			.log_blocks
			.iter()
			.copied()
			.filter(|&block| {
				let written = ssd.flash.block(block).is_some_and(|block| block.cursor() > 0);
				written && ssd.flash.oob().counts(block).valid == 0
			})
			.collect::<Vec<_>>();

		for &block in &dead {
			ssd.erase(block, time)?;
		}
		self.log_blocks.retain(|block| !dead.contains(block));

		Ok(dead.len())
	}

	/// Formats debug output to `f`
	pub fn fmt_debug(&self, ssd: &Ssd, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
		let counters = &ssd.metrics.counters;
		write!(
			f,
			"log blocks: {}/{}, log pages: {}, merges: {} full / {} switch",
			self.log_blocks.len(),
			self.max_log_blocks,
			self.log_map.len(),
			counters.full_merges,
			counters.switch_merges,
		)
	}
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::flash::{pool::Fifo, Flash},
	};

	fn setup(block_count: u64, logical_pages: u64, log_blocks: usize) -> (Ssd, Hybrid) {
		let geometry = Geometry {
			page_size: 4096,
			pages_per_block: 4,
			block_count,
		};

		let ssd = Ssd::new(Flash::new(geometry, Box::new(Fifo)), logical_pages);
		let hybrid = Hybrid::new(geometry, logical_pages, log_blocks);
		(ssd, hybrid)
	}

	#[test]
	fn most_log_entries_breaks_ties_by_lowest_block() {
		let entries = BTreeMap::from([(3, 2), (1, 4), (2, 4)]);
		assert_eq!(MostLogEntries.select(&entries), Some(1));
		assert_eq!(MostLogEntries.select(&BTreeMap::new()), None);
	}

	#[test]
	fn repeated_writes_full_merge() {
		let (mut ssd, mut hybrid) = setup(8, 16, 2);
		for time in 0..8 {
			hybrid.remap(&mut ssd, Lpn(5), time).expect("Unable to write");
		}
		assert_eq!(hybrid.log_blocks(), [BlockId(0), BlockId(1)]);
		assert_eq!(ssd.metrics.counters.full_merges, 0);

		// Both log blocks are full, so the next write merges
		let location = hybrid.remap(&mut ssd, Lpn(5), 8).expect("Unable to write");
		let counters = ssd.metrics.counters;
		assert_eq!(counters.full_merges, 1);
		assert_eq!(counters.switch_merges, 0);
		assert_eq!(counters.pages_moved, 1);

		for block in [BlockId(0), BlockId(1)] {
			let record = ssd.flash.block(block).expect("Missing block");
			assert_eq!(record.erase_count(), 1);
			assert_eq!(ssd.flash.oob().counts(block).erased, 4);
		}
		assert_eq!(hybrid.log_blocks(), [BlockId(3)]);
		assert_eq!(location, Location::Page(ssd.flash.geometry().ppa(BlockId(3), 0)));
		assert_eq!(hybrid.translate(&ssd, Lpn(5)), Ok(location));
		ssd.flash.check_invariants().expect("Invariants broken");
	}

	#[test]
	fn sequential_writes_switch_merge() {
		let (mut ssd, mut hybrid) = setup(8, 16, 1);
		for lpn in 0..4 {
			hybrid.remap(&mut ssd, Lpn(lpn), lpn).expect("Unable to write");
		}

		// The log block holds a whole logical block in order, so it's switched
		hybrid.remap(&mut ssd, Lpn(4), 4).expect("Unable to write");
		let counters = ssd.metrics.counters;
		assert_eq!(counters.switch_merges, 1);
		assert_eq!(counters.full_merges, 0);
		assert_eq!(counters.pages_moved, 0);
		assert_eq!(hybrid.data_block(0), Some(BlockId(0)));

		for lpn in 0..4 {
			assert_eq!(
				hybrid.translate(&ssd, Lpn(lpn)),
				Ok(Location::Page(ssd.flash.geometry().ppa(BlockId(0), lpn)))
			);
		}
		ssd.flash.check_invariants().expect("Invariants broken");
	}

	#[test]
	fn discard_and_unmapped_reads() {
		let (mut ssd, mut hybrid) = setup(8, 16, 2);
		assert_eq!(
			hybrid.translate(&ssd, Lpn(2)),
			Err(FtlError::UnmappedRead { lpn: Lpn(2) })
		);

		hybrid.remap(&mut ssd, Lpn(2), 0).expect("Unable to write");
		hybrid.discard(&mut ssd, Lpn(2), 1).expect("Unable to discard");
		hybrid.discard(&mut ssd, Lpn(2), 2).expect("Unable to discard");
		assert_eq!(
			hybrid.translate(&ssd, Lpn(2)),
			Err(FtlError::UnmappedRead { lpn: Lpn(2) })
		);
		assert_eq!(hybrid.log_page(Lpn(2)), None);
	}
}
