//! Errors

// Imports
use crate::{
	flash::{BlockId, Lpn, Ppa},
	request::Request,
	sim::Diagnostics,
};

/// Flash error.
///
/// Apart from [`FlashError::OutOfSpace`], these all indicate a broken
/// invariant in the translation or garbage collection logic.
#[derive(PartialEq, Eq, Clone, Debug)]
#[derive(thiserror::Error)]
pub enum FlashError {
	/// No free block was available
	#[error("No free blocks available")]
	OutOfSpace,

	/// Block had no more free pages
	#[error("Block {block} is full")]
	BlockFull { block: BlockId },

	/// Block still had valid pages when erased
	#[error("Block {block} still has {valid} valid pages")]
	NotReclaimable { block: BlockId, valid: u64 },

	/// Page was programmed before the block's cursor
	#[error("Page offset {offset} of block {block} is behind the cursor {cursor}")]
	OutOfOrder { block: BlockId, offset: u64, cursor: u64 },

	/// Page wasn't erased when programmed
	#[error("Page {ppa} isn't erased")]
	NotErased { ppa: Ppa },

	/// Page wasn't valid when read or invalidated
	#[error("Page {ppa} isn't valid")]
	NotValid { ppa: Ppa },

	/// Block doesn't exist
	#[error("Block {block} is out of bounds")]
	OutOfBounds { block: BlockId },
}

/// Translation layer error
#[derive(PartialEq, Eq, Clone, Debug)]
#[derive(thiserror::Error)]
pub enum FtlError {
	/// Flash error
	#[error("Flash error")]
	Flash(#[from] FlashError),

	/// Read of a logical page without a live mapping
	#[error("Logical page {lpn} is unmapped")]
	UnmappedRead { lpn: Lpn },

	/// Garbage collection could not reclaim any space
	#[error("Garbage collection deadlocked with {free_blocks} free blocks ({reason})")]
	GcDeadlock { free_blocks: usize, reason: &'static str },

	/// Logical page beyond the exported capacity
	#[error("Logical page {lpn} is out of range (capacity: {logical_pages} pages)")]
	LpnOutOfRange { lpn: Lpn, logical_pages: u64 },
}

impl FtlError {
	/// Returns if this error aborts the simulation run.
	///
	/// Only [`FtlError::UnmappedRead`] may be continued from.
	#[must_use]
	pub fn is_fatal(&self) -> bool {
		!matches!(self, Self::UnmappedRead { .. })
	}
}

/// Configuration error
#[derive(PartialEq, Clone, Debug)]
#[derive(thiserror::Error)]
pub enum ConfigError {
	/// A field had a zero value
	#[error("`{field}` must be non-zero")]
	Zero { field: &'static str },

	/// Over-provisioning was outside of `0.0..1.0`
	#[error("Over-provisioning must be within `0.0..1.0`, found {value}")]
	OverProvisioning { value: f64 },

	/// Watermarks were inconsistent
	#[error("GC watermarks must satisfy `1 <= low ({low}) <= high ({high}) < block count ({block_count})`")]
	Watermarks { low: usize, high: usize, block_count: u64 },

	/// Debug output period wasn't a valid duration
	#[error("Debug output period must be a non-negative number of seconds, found {value}")]
	DebugOutputPeriod { value: f64 },

	/// Geometry was too small for the requested layout
	#[error("Geometry is too small: {reason}")]
	TooSmall { reason: String },
}

/// Simulation run error
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum RunError {
	/// The event source failed
	#[error("Unable to read request #{idx}")]
	Source {
		idx:    u64,
		#[source]
		source: anyhow::Error,
	},

	/// A request failed fatally
	#[error("Request #{idx} ({request:?}) failed")]
	Fatal {
		idx:         u64,
		request:     Request,
		#[source]
		source:      FtlError,
		diagnostics: Box<Diagnostics>,
	},
}
