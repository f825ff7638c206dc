//! Garbage collection
//!
//! Reclaims blocks for the page-mapped layer by migrating the valid pages of
//! a victim block to the write frontier and erasing it.

// Imports
use {
	crate::{
		config::GcConfig,
		error::FtlError,
		flash::{BlockId, Flash, Ppa},
		oob::{PageCounts, PageOwner},
		ssd::{ReadKind, Ssd, WriteKind},
	},
	std::fmt,
};

/// Victim candidate
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Candidate {
	/// Block
	pub block: BlockId,

	/// Page counts
	pub counts: PageCounts,

	/// Last time the block was erased
	pub last_erase_time: u64,

	/// Latest write time of any page in the block
	pub last_write_time: u64,
}

impl Candidate {
	/// Returns all blocks eligible for collection.
	///
	/// Free blocks, the write frontier and blocks without any invalid pages
	/// are never eligible.
	pub fn all(flash: &Flash) -> Vec<Self> {
		let geometry = flash.geometry();
		flash
			.blocks()
			.iter()
			.filter(|block| !block.is_free() && Some(block.id()) != flash.frontier())
			.filter_map(|block| {
				let counts = flash.oob().counts(block.id());
				if counts.invalid == 0 {
					return None;
				}

				let last_write_time = geometry
					.pages_of(block.id())
					.map(|ppa| flash.oob().page(ppa).write_time)
					.max()
					.unwrap_or(0);
				Some(Self {
					block: block.id(),
					counts,
					last_erase_time: block.last_erase_time(),
					last_write_time,
				})
			})
			.collect()
	}

	/// Returns the fraction of the block's pages that are valid
	#[must_use]
	pub fn utilization(&self) -> f64 {
		self.counts.valid as f64 / self.counts.total() as f64
	}
}

/// Victim selection policy
pub trait VictimPolicy: fmt::Debug + Send {
	/// Selects a victim among `candidates` at time `now`
	fn select(&self, candidates: &[Candidate], now: u64) -> Option<BlockId>;
}

/// Greedy policy.
///
/// Picks the block with the fewest valid pages, breaking ties by the oldest
/// erase and then the lowest id.
#[derive(Clone, Copy, Debug, Default)]
pub struct Greedy;

impl VictimPolicy for Greedy {
	fn select(&self, candidates: &[Candidate], _now: u64) -> Option<BlockId> {
		candidates
			.iter()
			.min_by_key(|candidate| (candidate.counts.valid, candidate.last_erase_time, candidate.block))
			.map(|candidate| candidate.block)
	}
}

/// Cost-benefit policy.
///
/// Scores each block by `(1 - u) * age / 2u`, where `u` is its utilization
/// and `age` the time since it was last written, and picks the highest score.
#[derive(Clone, Copy, Debug, Default)]
pub struct CostBenefit;

impl CostBenefit {
	fn score(candidate: &Candidate, now: u64) -> f64 {
		let utilization = candidate.utilization();
		if utilization == 0.0 {
			return f64::INFINITY;
		}

		// Note: Blocks written at `now` still get some age, so that
		//       utilization alone breaks the tie between them.
		let age = now.saturating_sub(candidate.last_write_time) as f64 + 1.0;
		(1.0 - utilization) * age / (2.0 * utilization)
	}
}

impl VictimPolicy for CostBenefit {
	fn select(&self, candidates: &[Candidate], now: u64) -> Option<BlockId> {
		candidates
			.iter()
			.map(|candidate| (Self::score(candidate, now), candidate.block))
			.max_by(|(lhs_score, lhs_block), (rhs_score, rhs_block)| {
				lhs_score.total_cmp(rhs_score).then_with(|| rhs_block.cmp(lhs_block))
			})
			.map(|(_, block)| block)
	}
}

/// Mapping updates for migrated pages
pub trait Relocator {
	/// Called after the valid page `old` was copied to `new`
	fn relocate(&mut self, owner: PageOwner, old: Ppa, new: Ppa);

	/// Called once a collection pass is over.
	///
	/// Relocations that need flash writes to persist may be batched until here.
	fn finish(&mut self, _ssd: &mut Ssd, _time: u64) -> Result<(), FtlError> {
		Ok(())
	}
}

/// Collection outcome
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct Collection {
	/// Blocks reclaimed
	pub reclaimed: usize,

	/// Pages migrated
	pub moved: u64,
}

/// Runs a collection pass if fewer than the low watermark of blocks are free.
///
/// Reclaims victims until the high watermark of free blocks is reached, or
/// no more eligible victims exist.
///
/// # Errors
/// Returns [`FtlError::GcDeadlock`] if collection is needed but no block
/// could be reclaimed and the free pool is empty.
pub fn collect<R: Relocator>(
	ssd: &mut Ssd,
	config: &GcConfig,
	policy: &dyn VictimPolicy,
	relocator: &mut R,
	time: u64,
) -> Result<Collection, FtlError> {
	if ssd.flash.free_blocks() >= config.low_watermark {
		return Ok(Collection::default());
	}

	ssd.metrics.counters.gc_runs += 1;
	let mut collection = Collection::default();
	let mut stuck_reason = None;
	while ssd.flash.free_blocks() < config.high_watermark {
		let candidates = Candidate::all(&ssd.flash);
		let Some(victim) = policy.select(&candidates, time) else {
			stuck_reason = Some("no block has invalid pages");
			break;
		};

		let valid = ssd.flash.oob().counts(victim).valid;
		let room = ssd.flash.frontier_free_pages() +
			ssd.flash.free_blocks() as u64 * ssd.flash.geometry().pages_per_block;
		if valid > room {
			stuck_reason = Some("victim's valid pages don't fit in the remaining space");
			break;
		}

		collection.moved += self::migrate(ssd, victim, relocator, time)?;
		ssd.erase(victim, time)?;
		collection.reclaimed += 1;
	}
	relocator.finish(ssd, time)?;

	let free_blocks = ssd.flash.free_blocks();
	if let Some(reason) = stuck_reason {
		if collection.reclaimed == 0 && free_blocks == 0 {
			return Err(FtlError::GcDeadlock { free_blocks, reason });
		}
		tracing::debug!(free_blocks, reason, "Collection stopped below the high watermark");
	}

	tracing::debug!(
		reclaimed = collection.reclaimed,
		moved = collection.moved,
		free_blocks,
		"Collected garbage"
	);
	Ok(collection)
}

/// Migrates all valid pages of `victim` to the write frontier
fn migrate<R: Relocator>(ssd: &mut Ssd, victim: BlockId, relocator: &mut R, time: u64) -> Result<u64, FtlError> {
	let pages = ssd.flash.oob().valid_pages(victim).collect::<Vec<_>>();
	for &(old, owner) in &pages {
		ssd.read(old, ReadKind::Migration)?;
		let new = ssd.program(owner, WriteKind::Migration, time)?;
		relocator.relocate(owner, old, new);
		ssd.invalidate(old)?;
	}
	tracing::trace!(?victim, moved = pages.len(), "Migrated victim");

	Ok(pages.len() as u64)
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::flash::{pool::Fifo, Geometry, Lpn},
		std::collections::HashMap,
	};

	fn candidate(block: u64, valid: u64, invalid: u64, last_erase_time: u64, last_write_time: u64) -> Candidate {
		Candidate {
			block: BlockId(block),
			counts: PageCounts {
				valid,
				invalid,
				erased: 4 - valid - invalid,
			},
			last_erase_time,
			last_write_time,
		}
	}

	#[test]
	fn greedy_picks_fewest_valid() {
		let candidates = [
			candidate(0, 3, 1, 0, 0),
			candidate(1, 1, 3, 5, 0),
			candidate(2, 1, 3, 2, 0),
			candidate(3, 1, 3, 2, 0),
		];
		assert_eq!(Greedy.select(&candidates, 10), Some(BlockId(2)));
		assert_eq!(Greedy.select(&[], 10), None);
	}

	#[test]
	fn cost_benefit_prefers_old_blocks() {
		// Same utilization, block 1 was written longer ago
		let candidates = [candidate(0, 2, 2, 0, 90), candidate(1, 2, 2, 0, 10)];
		assert_eq!(CostBenefit.select(&candidates, 100), Some(BlockId(1)));

		// A block with no valid pages always wins
		let candidates = [candidate(0, 1, 3, 0, 0), candidate(1, 0, 4, 0, 99)];
		assert_eq!(CostBenefit.select(&candidates, 100), Some(BlockId(1)));
	}

	/// Relocator over a plain map
	#[derive(Default)]
	struct MapRelocator {
		map: HashMap<Lpn, Ppa>,
	}

	impl Relocator for MapRelocator {
		fn relocate(&mut self, owner: PageOwner, old: Ppa, new: Ppa) {
			if let PageOwner::Data(lpn) = owner {
				assert_eq!(self.map.insert(lpn, new), Some(old));
			}
		}
	}

	fn ssd() -> Ssd {
		let geometry = Geometry {
			page_size:       4096,
			pages_per_block: 4,
			block_count:     4,
		};
		Ssd::new(Flash::new(geometry, Box::new(Fifo)), 8)
	}

	fn write(ssd: &mut Ssd, relocator: &mut MapRelocator, lpn: u64) {
		let ppa = ssd
			.program(PageOwner::Data(Lpn(lpn)), WriteKind::Host, 0)
			.expect("Unable to write");
		if let Some(old) = relocator.map.insert(Lpn(lpn), ppa) {
			ssd.invalidate(old).expect("Unable to invalidate");
		}
	}

	#[test]
	fn collect_reclaims_victims() {
		let mut ssd = ssd();
		let mut relocator = MapRelocator::default();

		// Fill 3 blocks, overwriting most of the first one
		for lpn in [0, 1, 2, 3, 0, 1, 2, 4, 5, 6, 7, 0] {
			write(&mut ssd, &mut relocator, lpn);
		}
		assert_eq!(ssd.flash.free_blocks(), 1);

		let config = GcConfig {
			low_watermark: 2,
			high_watermark: 2,
			..GcConfig::default()
		};
		let collection =
			self::collect(&mut ssd, &config, &Greedy, &mut relocator, 1).expect("Unable to collect");
		// Note: Migrating the first victim opens the last free block, so
		//       a second victim is needed to reach the high watermark.
		assert_eq!(collection, Collection { reclaimed: 2, moved: 4 });
		assert_eq!(ssd.flash.free_blocks(), 2);
		assert_eq!(ssd.metrics.counters.gc_runs, 1);
		assert_eq!(ssd.metrics.counters.pages_moved, 4);
		assert_eq!(ssd.metrics.counters.erases, 2);

		// Every live page is still mapped to a valid page it owns
		for (&lpn, &ppa) in &relocator.map {
			assert_eq!(ssd.flash.oob().reverse_lookup(ppa), Some(PageOwner::Data(lpn)));
		}
		ssd.flash.check_invariants().expect("Invariants broken");
	}

	#[test]
	fn collect_deadlocks_without_victims() {
		let mut ssd = ssd();
		let mut relocator = MapRelocator::default();
		for lpn in 0..16 {
			write(&mut ssd, &mut relocator, lpn);
		}

		let config = GcConfig {
			low_watermark: 1,
			high_watermark: 1,
			..GcConfig::default()
		};
		assert!(matches!(
			self::collect(&mut ssd, &config, &Greedy, &mut relocator, 1),
			Err(FtlError::GcDeadlock { free_blocks: 0, .. })
		));
	}
}
