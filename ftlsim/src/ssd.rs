//! Simulation context
//!
//! Every flash mutation performed by the translation layers and the garbage
//! collector goes through [`Ssd`], which keeps the metrics in sync with it.

// Imports
use crate::{
	error::{FlashError, FtlError},
	flash::{BlockId, Flash, Lpn, Ppa},
	ftl::Location,
	metrics::Metrics,
	oob::PageOwner,
};

/// Reason a page is written
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum WriteKind {
	/// Host data
	Host,

	/// Translation table page
	Translation,

	/// Copy made by garbage collection or a merge
	Migration,
}

/// Reason a page is read
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ReadKind {
	Host,
	Translation,
	Migration,
}

/// Simulation context.
///
/// Owns the flash state and the metrics of a single simulated drive.
#[derive(Debug)]
pub struct Ssd {
	/// Flash
	pub flash: Flash,

	/// Metrics
	pub metrics: Metrics,

	/// Logical pages exported to the host
	logical_pages: u64,
}

impl Ssd {
	/// Creates a new context
	pub fn new(flash: Flash, logical_pages: u64) -> Self {
		Self {
			flash,
			metrics: Metrics::new(),
			logical_pages,
		}
	}

	/// Returns the number of logical pages exported to the host
	pub fn logical_pages(&self) -> u64 {
		self.logical_pages
	}

	/// Checks that `lpn` is within the exported capacity
	pub fn check_lpn(&self, lpn: Lpn) -> Result<(), FtlError> {
		match lpn.to_u64() < self.logical_pages {
			true => Ok(()),
			false => Err(FtlError::LpnOutOfRange {
				lpn,
				logical_pages: self.logical_pages,
			}),
		}
	}

	/// Appends a page at the write frontier
	pub fn program(&mut self, owner: PageOwner, kind: WriteKind, time: u64) -> Result<Ppa, FlashError> {
		let ppa = self.flash.append(owner, time)?;
		self.count_write(kind);
		Ok(ppa)
	}

	/// Programs the page at the cursor of `block`
	pub fn program_in(
		&mut self,
		block: BlockId,
		owner: PageOwner,
		kind: WriteKind,
		time: u64,
	) -> Result<Ppa, FlashError> {
		let ppa = self.flash.write_page(block, owner, time)?;
		self.count_write(kind);
		Ok(ppa)
	}

	/// Programs page `offset` of `block`
	pub fn program_at(
		&mut self,
		block: BlockId,
		offset: u64,
		owner: PageOwner,
		kind: WriteKind,
		time: u64,
	) -> Result<Ppa, FlashError> {
		let ppa = self.flash.write_page_at(block, offset, owner, time)?;
		self.count_write(kind);
		Ok(ppa)
	}

	/// Reads a valid page
	pub fn read(&mut self, ppa: Ppa, kind: ReadKind) -> Result<PageOwner, FlashError> {
		let owner = self.flash.read_page(ppa)?.owner.ok_or(FlashError::NotValid { ppa })?;

		let counters = &mut self.metrics.counters;
		counters.physical_pages_read += 1;
		if kind == ReadKind::Translation {
			counters.translation_pages_read += 1;
		}

		Ok(owner)
	}

	/// Reads the data at `location` for the host
	pub fn read_location(&mut self, lpn: Lpn, location: Location) -> Result<(), FlashError> {
		match location {
			Location::Page(ppa) => match self.read(ppa, ReadKind::Host)? {
				PageOwner::Data(owner) if owner == lpn => Ok(()),
				_ => Err(FlashError::NotValid { ppa }),
			},
			Location::Unmodeled => {
				self.metrics.counters.physical_pages_read += 1;
				Ok(())
			},
		}
	}

	/// Invalidates a valid page
	pub fn invalidate(&mut self, ppa: Ppa) -> Result<(), FlashError> {
		self.flash.invalidate(ppa)
	}

	/// Takes a block from the free pool
	pub fn allocate_block(&mut self) -> Result<BlockId, FlashError> {
		self.flash.allocate_free_block()
	}

	/// Erases a block, returning it to the free pool
	pub fn erase(&mut self, block: BlockId, time: u64) -> Result<(), FlashError> {
		self.flash.erase_block(block, time)?;
		self.metrics.counters.erases += 1;
		Ok(())
	}

	fn count_write(&mut self, kind: WriteKind) {
		let counters = &mut self.metrics.counters;
		match kind {
			WriteKind::Host => counters.host_pages_written += 1,
			WriteKind::Translation => counters.translation_pages_written += 1,
			WriteKind::Migration => counters.pages_moved += 1,
		}
	}
}
