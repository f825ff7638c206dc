//! Block records

// Imports
use super::BlockId;

/// Block record
#[derive(Clone, Debug)]
pub struct Block {
	/// Id
	id: BlockId,

	/// Next page offset to program
	cursor: u64,

	/// Number of times this block was erased
	erase_count: u64,

	/// Time of the last erase, `0` if never erased
	last_erase_time: u64,

	/// Whether this block is in the free pool
	free: bool,
}

impl Block {
	/// Creates a new, free, block
	pub fn new(id: BlockId) -> Self {
		Self {
			id,
			cursor: 0,
			erase_count: 0,
			last_erase_time: 0,
			free: true,
		}
	}

	/// Returns this block's id
	pub fn id(&self) -> BlockId {
		self.id
	}

	/// Returns the free-page cursor
	pub fn cursor(&self) -> u64 {
		self.cursor
	}

	/// Returns the erase count
	pub fn erase_count(&self) -> u64 {
		self.erase_count
	}

	/// Returns the time of the last erase
	pub fn last_erase_time(&self) -> u64 {
		self.last_erase_time
	}

	/// Returns if this block is in the free pool
	pub fn is_free(&self) -> bool {
		self.free
	}

	/// Marks this block as taken from / returned to the free pool
	pub(super) fn set_free(&mut self, free: bool) {
		self.free = free;
	}

	/// Advances the cursor past `offset`
	pub(super) fn program(&mut self, offset: u64) {
		debug_assert!(offset >= self.cursor, "Programmed page behind the cursor");
		self.cursor = offset + 1;
	}

	/// Resets this block after an erase
	pub(super) fn erase(&mut self, time: u64) {
		self.cursor = 0;
		self.erase_count += 1;
		self.last_erase_time = time;
	}
}
