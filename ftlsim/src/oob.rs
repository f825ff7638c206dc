//! Out-of-band metadata store
//!
//! Holds, for every physical page, its state, its owner and when it was
//! written, as well as the per-block page counts used by victim selection.

// Imports
use crate::{
	error::FlashError,
	flash::{BlockId, Geometry, Lpn, Ppa, Tvpn},
};

/// Page state
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum PageState {
	Erased,
	Valid,
	Invalid,
}

/// Page owner
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum PageOwner {
	/// Host data for a logical page
	Data(Lpn),

	/// Translation table page
	Translation(Tvpn),
}

/// Page record
#[derive(Clone, Copy, Debug)]
pub struct PageRecord {
	/// State
	pub state: PageState,

	/// Owner.
	///
	/// Kept after the page is invalidated, cleared on erase.
	pub owner: Option<PageOwner>,

	/// Write time
	pub write_time: u64,
}

impl PageRecord {
	/// An erased page
	pub const ERASED: Self = Self {
		state:      PageState::Erased,
		owner:      None,
		write_time: 0,
	};
}

/// Page counts of a block
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PageCounts {
	pub valid:   u64,
	pub invalid: u64,
	pub erased:  u64,
}

impl PageCounts {
	/// Returns the total number of pages
	#[must_use]
	pub const fn total(&self) -> u64 {
		self.valid + self.invalid + self.erased
	}
}

/// Out-of-band metadata store
#[derive(Debug)]
pub struct Oob {
	/// Geometry
	geometry: Geometry,

	/// All pages, by address
	pages: Vec<PageRecord>,

	/// Page counts, by block
	counts: Vec<PageCounts>,
}

impl Oob {
	/// Creates a store with every page erased
	pub fn new(geometry: Geometry) -> Self {
		let erased = PageCounts {
			valid:   0,
			invalid: 0,
			erased:  geometry.pages_per_block,
		};

		Self {
			geometry,
			pages: vec![PageRecord::ERASED; geometry.total_pages() as usize],
			counts: vec![erased; geometry.block_count as usize],
		}
	}

	/// Marks an erased page as valid and owned by `owner`
	pub fn record_write(&mut self, ppa: Ppa, owner: PageOwner, time: u64) -> Result<(), FlashError> {
		let page = &mut self.pages[ppa.to_usize()];
		if page.state != PageState::Erased {
			return Err(FlashError::NotErased { ppa });
		}

		*page = PageRecord {
			state: PageState::Valid,
			owner: Some(owner),
			write_time: time,
		};

		let counts = &mut self.counts[self.geometry.block_of(ppa).to_usize()];
		counts.erased -= 1;
		counts.valid += 1;

		Ok(())
	}

	/// Marks a valid page as invalid
	pub fn invalidate(&mut self, ppa: Ppa) -> Result<(), FlashError> {
		let page = &mut self.pages[ppa.to_usize()];
		if page.state != PageState::Valid {
			return Err(FlashError::NotValid { ppa });
		}
		page.state = PageState::Invalid;

		let counts = &mut self.counts[self.geometry.block_of(ppa).to_usize()];
		counts.valid -= 1;
		counts.invalid += 1;

		Ok(())
	}

	/// Returns the owner of a valid page
	#[must_use]
	pub fn reverse_lookup(&self, ppa: Ppa) -> Option<PageOwner> {
		let page = &self.pages[ppa.to_usize()];
		match page.state {
			PageState::Valid => page.owner,
			PageState::Erased | PageState::Invalid => None,
		}
	}

	/// Returns a page record
	#[must_use]
	pub fn page(&self, ppa: Ppa) -> &PageRecord {
		&self.pages[ppa.to_usize()]
	}

	/// Returns the page counts of a block
	#[must_use]
	pub fn counts(&self, block: BlockId) -> PageCounts {
		self.counts[block.to_usize()]
	}

	/// Returns the valid pages of a block, in offset order
	pub fn valid_pages(&self, block: BlockId) -> impl Iterator<Item = (Ppa, PageOwner)> + '_ {
		self.geometry
			.pages_of(block)
			.filter_map(|ppa| self.reverse_lookup(ppa).map(|owner| (ppa, owner)))
	}

	/// Erases all pages of a block.
	///
	/// # Errors
	/// Returns an error if the block still has valid pages.
	pub fn erase(&mut self, block: BlockId) -> Result<(), FlashError> {
		let counts = &mut self.counts[block.to_usize()];
		if counts.valid != 0 {
			return Err(FlashError::NotReclaimable {
				block,
				valid: counts.valid,
			});
		}
		*counts = PageCounts {
			valid:   0,
			invalid: 0,
			erased:  self.geometry.pages_per_block,
		};

		let start = self.geometry.ppa(block, 0).to_usize();
		let end = start + self.geometry.pages_per_block as usize;
		self.pages[start..end].fill(PageRecord::ERASED);

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn oob() -> Oob {
		Oob::new(Geometry {
			page_size:       4096,
			pages_per_block: 4,
			block_count:     2,
		})
	}

	#[test]
	fn write_invalidate_erase() {
		let mut oob = oob();
		oob.record_write(Ppa(0), PageOwner::Data(Lpn(7)), 10).expect("Unable to write");
		oob.record_write(Ppa(1), PageOwner::Data(Lpn(8)), 11).expect("Unable to write");
		assert_eq!(oob.reverse_lookup(Ppa(0)), Some(PageOwner::Data(Lpn(7))));
		assert_eq!(oob.counts(BlockId(0)), PageCounts {
			valid:   2,
			invalid: 0,
			erased:  2,
		});

		oob.invalidate(Ppa(0)).expect("Unable to invalidate");
		assert_eq!(oob.reverse_lookup(Ppa(0)), None);
		assert_eq!(oob.page(Ppa(0)).state, PageState::Invalid);
		assert_eq!(oob.counts(BlockId(0)).invalid, 1);
		assert_eq!(oob.valid_pages(BlockId(0)).collect::<Vec<_>>(), [(
			Ppa(1),
			PageOwner::Data(Lpn(8))
		)]);

		assert_eq!(
			oob.erase(BlockId(0)),
			Err(FlashError::NotReclaimable {
				block: BlockId(0),
				valid: 1,
			})
		);
		oob.invalidate(Ppa(1)).expect("Unable to invalidate");
		oob.erase(BlockId(0)).expect("Unable to erase");
		assert_eq!(oob.counts(BlockId(0)).erased, 4);
		assert_eq!(oob.page(Ppa(1)).state, PageState::Erased);
	}

	#[test]
	fn double_write_and_invalidate_are_rejected() {
		let mut oob = oob();
		oob.record_write(Ppa(5), PageOwner::Translation(Tvpn(0)), 0).expect("Unable to write");
		assert_eq!(
			oob.record_write(Ppa(5), PageOwner::Data(Lpn(1)), 0),
			Err(FlashError::NotErased { ppa: Ppa(5) })
		);

		oob.invalidate(Ppa(5)).expect("Unable to invalidate");
		assert_eq!(oob.invalidate(Ppa(5)), Err(FlashError::NotValid { ppa: Ppa(5) }));
		assert_eq!(oob.counts(BlockId(1)).total(), 4);
	}
}
