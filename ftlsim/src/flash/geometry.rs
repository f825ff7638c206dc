//! Flash geometry and addresses

// Imports
use std::fmt;

/// Flash geometry
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Geometry {
	/// Page size, in bytes
	pub page_size: u64,

	/// Pages per block
	pub pages_per_block: u64,

	/// Total number of blocks
	pub block_count: u64,
}

impl Geometry {
	/// Returns the total number of physical pages
	#[must_use]
	pub const fn total_pages(&self) -> u64 {
		self.pages_per_block * self.block_count
	}

	/// Returns the size of a block, in bytes
	#[must_use]
	pub const fn block_size(&self) -> u64 {
		self.page_size * self.pages_per_block
	}

	/// Returns the address of page `offset` of `block`
	#[must_use]
	pub const fn ppa(&self, block: BlockId, offset: u64) -> Ppa {
		Ppa(block.0 * self.pages_per_block + offset)
	}

	/// Returns the block a page belongs to
	#[must_use]
	pub const fn block_of(&self, ppa: Ppa) -> BlockId {
		BlockId(ppa.0 / self.pages_per_block)
	}

	/// Returns the offset of a page within its block
	#[must_use]
	pub const fn offset_of(&self, ppa: Ppa) -> u64 {
		ppa.0 % self.pages_per_block
	}

	/// Returns all pages of `block`
	pub fn pages_of(&self, block: BlockId) -> impl Iterator<Item = Ppa> + '_ {
		(0..self.pages_per_block).map(move |offset| self.ppa(block, offset))
	}

	/// Returns all block ids
	pub fn blocks(&self) -> impl Iterator<Item = BlockId> {
		(0..self.block_count).map(BlockId)
	}
}

/// Declares an index newtype over `u64`
macro_rules! index_newtype {
	($(#[$meta:meta])* $name:ident, $fmt:literal) => {
		$(#[$meta])*
		#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
		#[derive(serde::Serialize, serde::Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub u64);

		impl $name {
			/// Returns this index as a `u64`
			#[must_use]
			pub const fn to_u64(self) -> u64 {
				self.0
			}

			/// Returns this index as a `usize`
			#[must_use]
			pub const fn to_usize(self) -> usize {
				self.0 as usize
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, $fmt, self.0)
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				fmt::Debug::fmt(self, f)
			}
		}
	};
}

index_newtype!(
	/// Logical page number
	Lpn,
	"L{}"
);

index_newtype!(
	/// Physical page address.
	///
	/// Composed of `block * pages_per_block + offset`.
	Ppa,
	"P{}"
);

index_newtype!(
	/// Block id
	BlockId,
	"B{}"
);

index_newtype!(
	/// Translation page number.
	///
	/// Identifies a page of the on-flash translation table.
	Tvpn,
	"T{}"
);

#[cfg(test)]
mod tests {
	use super::*;

	const GEOMETRY: Geometry = Geometry {
		page_size:       4096,
		pages_per_block: 4,
		block_count:     8,
	};

	#[test]
	fn address_arithmetic() {
		let ppa = GEOMETRY.ppa(BlockId(3), 2);
		assert_eq!(ppa, Ppa(14));
		assert_eq!(GEOMETRY.block_of(ppa), BlockId(3));
		assert_eq!(GEOMETRY.offset_of(ppa), 2);
		assert_eq!(GEOMETRY.total_pages(), 32);
		assert_eq!(GEOMETRY.block_size(), 16384);
	}

	#[test]
	fn pages_of_block() {
		let pages = GEOMETRY.pages_of(BlockId(1)).collect::<Vec<_>>();
		assert_eq!(pages, [Ppa(4), Ppa(5), Ppa(6), Ppa(7)]);
	}

	#[test]
	fn debug_format() {
		assert_eq!(format!("{:?}", Lpn(7)), "L7");
		assert_eq!(format!("{}", BlockId(2)), "B2");
	}
}
