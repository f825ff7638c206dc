//! Free block pool

// Imports
use {
	super::{Block, BlockId},
	std::{collections::VecDeque, fmt},
};

/// Free block selection policy
pub trait FreeBlockPolicy: fmt::Debug + Send {
	/// Selects the index, within `free`, of the next block to allocate.
	///
	/// `free` is never empty and is ordered by the time each block was freed.
	fn select(&self, free: &VecDeque<BlockId>, blocks: &[Block]) -> usize;
}

/// Allocates blocks in the order they were freed
#[derive(Clone, Copy, Debug, Default)]
pub struct Fifo;

impl FreeBlockPolicy for Fifo {
	fn select(&self, _free: &VecDeque<BlockId>, _blocks: &[Block]) -> usize {
		0
	}
}

/// Allocates the least erased block first, approximating dynamic wear-leveling
#[derive(Clone, Copy, Debug, Default)]
pub struct LeastErased;

impl FreeBlockPolicy for LeastErased {
	fn select(&self, free: &VecDeque<BlockId>, blocks: &[Block]) -> usize {
		free.iter()
			.enumerate()
			.min_by_key(|(_, block)| blocks[block.to_usize()].erase_count())
			.map_or(0, |(idx, _)| idx)
	}
}

/// Free block pool
#[derive(Debug)]
pub struct FreePool {
	/// Free blocks, in the order they were freed
	blocks: VecDeque<BlockId>,

	/// Selection policy
	policy: Box<dyn FreeBlockPolicy>,
}

impl FreePool {
	/// Creates a pool with all of `blocks`
	pub fn new(blocks: impl IntoIterator<Item = BlockId>, policy: Box<dyn FreeBlockPolicy>) -> Self {
		Self {
			blocks: blocks.into_iter().collect(),
			policy,
		}
	}

	/// Returns the number of free blocks
	pub fn len(&self) -> usize {
		self.blocks.len()
	}

	/// Returns if the pool is empty
	pub fn is_empty(&self) -> bool {
		self.blocks.is_empty()
	}

	/// Iterates over all free blocks
	pub fn iter(&self) -> impl Iterator<Item = BlockId> + '_ {
		self.blocks.iter().copied()
	}

	/// Takes a block, according to the policy
	pub fn take(&mut self, blocks: &[Block]) -> Option<BlockId> {
		if self.blocks.is_empty() {
			return None;
		}

		let idx = self.policy.select(&self.blocks, blocks);
		self.blocks.remove(idx)
	}

	/// Returns a block to the pool
	pub fn push(&mut self, block: BlockId) {
		self.blocks.push_back(block);
	}

	/// Replaces the selection policy
	pub fn set_policy(&mut self, policy: Box<dyn FreeBlockPolicy>) {
		self.policy = policy;
	}
}
