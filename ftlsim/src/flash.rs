//! Flash geometry & state model

// Modules
pub mod block;
pub mod geometry;
pub mod pool;

// Exports
pub use self::{
	block::Block,
	geometry::{BlockId, Geometry, Lpn, Ppa, Tvpn},
	pool::{FreeBlockPolicy, FreePool},
};

// Imports
use crate::{
	error::FlashError,
	oob::{Oob, PageOwner, PageRecord, PageState},
};

/// Flash array.
///
/// Owns every block and page record, the free pool and the write frontier.
#[derive(Debug)]
pub struct Flash {
	/// Geometry
	geometry: Geometry,

	/// All blocks, by id
	blocks: Vec<Block>,

	/// Out-of-band metadata
	oob: Oob,

	/// Free pool
	pool: FreePool,

	/// Block currently receiving appended pages
	frontier: Option<BlockId>,
}

impl Flash {
	/// Creates a fully erased flash array
	pub fn new(geometry: Geometry, free_block_policy: Box<dyn FreeBlockPolicy>) -> Self {
		Self {
			geometry,
			blocks: geometry.blocks().map(Block::new).collect(),
			oob: Oob::new(geometry),
			pool: FreePool::new(geometry.blocks(), free_block_policy),
			frontier: None,
		}
	}

	/// Returns the geometry
	pub fn geometry(&self) -> &Geometry {
		&self.geometry
	}

	/// Returns the out-of-band store
	pub fn oob(&self) -> &Oob {
		&self.oob
	}

	/// Returns a block
	pub fn block(&self, block: BlockId) -> Option<&Block> {
		self.blocks.get(block.to_usize())
	}

	/// Returns all blocks
	pub fn blocks(&self) -> &[Block] {
		&self.blocks
	}

	/// Returns a page record
	pub fn page(&self, ppa: Ppa) -> Option<&PageRecord> {
		(ppa.to_u64() < self.geometry.total_pages()).then(|| self.oob.page(ppa))
	}

	/// Returns the number of free blocks
	pub fn free_blocks(&self) -> usize {
		self.pool.len()
	}

	/// Returns the free pool
	pub fn free_pool(&self) -> &FreePool {
		&self.pool
	}

	/// Replaces the free block selection policy
	pub fn set_free_block_policy(&mut self, policy: Box<dyn FreeBlockPolicy>) {
		self.pool.set_policy(policy);
	}

	/// Returns the block currently receiving appended pages
	pub fn frontier(&self) -> Option<BlockId> {
		self.frontier
	}

	/// Returns the number of pages that may still be appended without
	/// allocating a new block.
	pub fn frontier_free_pages(&self) -> u64 {
		self.frontier.map_or(0, |block| {
			self.geometry.pages_per_block - self.blocks[block.to_usize()].cursor()
		})
	}

	/// Takes a block from the free pool
	pub fn allocate_free_block(&mut self) -> Result<BlockId, FlashError> {
		let block = self.pool.take(&self.blocks).ok_or(FlashError::OutOfSpace)?;
		self.blocks[block.to_usize()].set_free(false);
		tracing::trace!(?block, free_blocks = self.pool.len(), "Allocated block");

		Ok(block)
	}

	/// Programs the page at the cursor of `block`
	pub fn write_page(&mut self, block: BlockId, owner: PageOwner, time: u64) -> Result<Ppa, FlashError> {
		let cursor = self.checked_block(block)?.cursor();
		self.write_page_at(block, cursor, owner, time)
	}

	/// Programs page `offset` of `block`.
	///
	/// Any pages between the cursor and `offset` are skipped and stay erased
	/// until the block is erased.
	pub fn write_page_at(
		&mut self,
		block: BlockId,
		offset: u64,
		owner: PageOwner,
		time: u64,
	) -> Result<Ppa, FlashError> {
		let cursor = self.checked_block(block)?.cursor();
		if offset >= self.geometry.pages_per_block {
			return Err(FlashError::BlockFull { block });
		}
		if offset < cursor {
			return Err(FlashError::OutOfOrder { block, offset, cursor });
		}

		let ppa = self.geometry.ppa(block, offset);
		self.oob.record_write(ppa, owner, time)?;
		self.blocks[block.to_usize()].program(offset);
		tracing::trace!(?ppa, ?owner, "Programmed page");

		Ok(ppa)
	}

	/// Appends a page at the write frontier, opening a new block from the
	/// free pool if the current one is full.
	pub fn append(&mut self, owner: PageOwner, time: u64) -> Result<Ppa, FlashError> {
		let open = self
			.frontier
			.filter(|block| self.blocks[block.to_usize()].cursor() < self.geometry.pages_per_block);
		let block = match open {
			Some(block) => block,
			None => {
				let block = self.allocate_free_block()?;
				self.frontier = Some(block);
				block
			},
		};

		self.write_page(block, owner, time)
	}

	/// Reads a valid page
	pub fn read_page(&self, ppa: Ppa) -> Result<&PageRecord, FlashError> {
		match self.page(ppa) {
			Some(page) if page.state == PageState::Valid => Ok(page),
			_ => Err(FlashError::NotValid { ppa }),
		}
	}

	/// Invalidates a valid page
	pub fn invalidate(&mut self, ppa: Ppa) -> Result<(), FlashError> {
		self.oob.invalidate(ppa)
	}

	/// Erases a block and returns it to the free pool
	pub fn erase_block(&mut self, block: BlockId, time: u64) -> Result<(), FlashError> {
		self.checked_block(block)?;
		self.oob.erase(block)?;

		let record = &mut self.blocks[block.to_usize()];
		record.erase(time);
		if self.frontier == Some(block) {
			self.frontier = None;
		}
		if !record.is_free() {
			record.set_free(true);
			self.pool.push(block);
		}
		tracing::trace!(?block, erase_count = record.erase_count(), "Erased block");

		Ok(())
	}

	/// Checks the page accounting invariants of every block.
	///
	/// Returns a description of the first violation found.
	pub fn check_invariants(&self) -> Result<(), String> {
		for block in &self.blocks {
			let id = block.id();
			let counts = self.oob.counts(id);
			if counts.total() != self.geometry.pages_per_block {
				return Err(format!("{id}: page counts {counts:?} don't add up"));
			}

			let (mut valid, mut invalid, mut erased) = (0, 0, 0);
			for ppa in self.geometry.pages_of(id) {
				let page = self.oob.page(ppa);
				match page.state {
					PageState::Valid => valid += 1,
					PageState::Invalid => invalid += 1,
					PageState::Erased => erased += 1,
				}

				let offset = self.geometry.offset_of(ppa);
				if page.state != PageState::Erased && offset >= block.cursor() {
					return Err(format!("{id}: programmed page {ppa} beyond cursor {}", block.cursor()));
				}
			}
			if (valid, invalid, erased) != (counts.valid, counts.invalid, counts.erased) {
				return Err(format!("{id}: page counts {counts:?} don't match page states"));
			}
			if block.is_free() && counts.erased != self.geometry.pages_per_block {
				return Err(format!("{id}: free block isn't erased"));
			}
		}

		Ok(())
	}

	/// Returns a block record, or an error if it doesn't exist
	fn checked_block(&self, block: BlockId) -> Result<&Block, FlashError> {
		self.blocks.get(block.to_usize()).ok_or(FlashError::OutOfBounds { block })
	}
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::{flash::pool::Fifo, oob::PageCounts},
	};

	fn flash() -> Flash {
		Flash::new(
			Geometry {
				page_size:       4096,
				pages_per_block: 4,
				block_count:     3,
			},
			Box::new(Fifo),
		)
	}

	#[test]
	fn write_until_full() {
		let mut flash = flash();
		let block = flash.allocate_free_block().expect("Unable to allocate");
		for lpn in 0..4 {
			let ppa = flash.write_page(block, PageOwner::Data(Lpn(lpn)), lpn).expect("Unable to write");
			assert_eq!(ppa, flash.geometry().ppa(block, lpn));
		}
		assert_eq!(
			flash.write_page(block, PageOwner::Data(Lpn(4)), 4),
			Err(FlashError::BlockFull { block })
		);
		flash.check_invariants().expect("Invariants broken");
	}

	#[test]
	fn erase_requires_no_valid_pages() {
		let mut flash = flash();
		let block = flash.allocate_free_block().expect("Unable to allocate");
		let ppa = flash.write_page(block, PageOwner::Data(Lpn(0)), 0).expect("Unable to write");
		assert_eq!(
			flash.erase_block(block, 1),
			Err(FlashError::NotReclaimable { block, valid: 1 })
		);

		flash.invalidate(ppa).expect("Unable to invalidate");
		flash.erase_block(block, 1).expect("Unable to erase");
		let record = flash.block(block).expect("Missing block");
		assert_eq!(record.cursor(), 0);
		assert_eq!(record.erase_count(), 1);
		assert!(record.is_free());
		assert_eq!(flash.free_blocks(), 3);
		flash.check_invariants().expect("Invariants broken");
	}

	#[test]
	fn skipped_pages_stay_erased() {
		let mut flash = flash();
		let block = flash.allocate_free_block().expect("Unable to allocate");
		flash
			.write_page_at(block, 2, PageOwner::Data(Lpn(2)), 0)
			.expect("Unable to write");
		assert_eq!(
			flash.write_page_at(block, 1, PageOwner::Data(Lpn(1)), 0),
			Err(FlashError::OutOfOrder {
				block,
				offset: 1,
				cursor: 3,
			})
		);
		assert_eq!(flash.oob().counts(block), PageCounts {
			valid:   1,
			invalid: 0,
			erased:  3,
		});
		flash.check_invariants().expect("Invariants broken");
	}

	#[test]
	fn append_opens_blocks() {
		let mut flash = flash();
		for lpn in 0..9 {
			flash.append(PageOwner::Data(Lpn(lpn)), lpn).expect("Unable to append");
		}
		assert_eq!(flash.frontier(), Some(BlockId(2)));
		assert_eq!(flash.frontier_free_pages(), 3);
		assert_eq!(flash.free_blocks(), 0);

		for lpn in 9..12 {
			flash.append(PageOwner::Data(Lpn(lpn)), lpn).expect("Unable to append");
		}
		assert_eq!(flash.append(PageOwner::Data(Lpn(12)), 12), Err(FlashError::OutOfSpace));
	}

	#[test]
	fn read_requires_valid_page() {
		let mut flash = flash();
		let ppa = flash.append(PageOwner::Data(Lpn(3)), 0).expect("Unable to append");
		assert_eq!(
			flash.read_page(ppa).expect("Unable to read").owner,
			Some(PageOwner::Data(Lpn(3)))
		);
		assert!(matches!(
			flash.read_page(Ppa(1)),
			Err(FlashError::NotValid { ppa: Ppa(1) })
		));
	}
}
